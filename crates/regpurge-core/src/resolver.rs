//! Manifest digest resolution.
//!
//! Registries delete manifests, not tags, and several tags may point at the
//! same manifest. The resolver looks up every tag's digest and groups tags
//! that share one.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::GatewayError;
use crate::gateway::{with_timeout, RegistryGateway};
use crate::tag::Tag;

/// Default number of concurrent registry calls per repository.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Tags of one repository that currently resolve to the same digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestGroup {
    /// Manifest digest (opaque).
    pub digest: String,

    /// Tags pointing at the manifest.
    pub tags: BTreeSet<Tag>,
}

/// A tag whose digest could not be looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionFailure {
    /// The tag.
    pub tag: Tag,

    /// Why the lookup failed.
    pub reason: String,
}

/// Outcome of resolving every tag of a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Repository name.
    pub repository: String,

    /// Digest groups, ordered by digest.
    pub groups: Vec<DigestGroup>,

    /// Tags that could not be resolved, ordered by tag.
    pub failures: Vec<ResolutionFailure>,
}

impl Resolution {
    /// Aggregates per-tag lookup results.
    ///
    /// Lookups may arrive in any order; the result is the same.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error (authentication) encountered.
    pub fn from_lookups<I>(repository: &str, lookups: I) -> Result<Self, GatewayError>
    where
        I: IntoIterator<Item = (String, Result<String, GatewayError>)>,
    {
        let mut groups: BTreeMap<String, BTreeSet<Tag>> = BTreeMap::new();
        let mut failures = Vec::new();

        for (name, lookup) in lookups {
            let tag = Tag::new(repository, name);
            match lookup {
                Ok(digest) => {
                    groups.entry(digest).or_default().insert(tag);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => failures.push(ResolutionFailure {
                    tag,
                    reason: err.to_string(),
                }),
            }
        }

        failures.sort_by(|a, b| a.tag.cmp(&b.tag));

        Ok(Self {
            repository: repository.to_string(),
            groups: groups
                .into_iter()
                .map(|(digest, tags)| DigestGroup { digest, tags })
                .collect(),
            failures,
        })
    }

    /// Number of tags that resolved to a digest.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.groups.iter().map(|g| g.tags.len()).sum()
    }
}

/// Resolves tags to digests with bounded concurrency.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    concurrency: usize,
    call_timeout: Option<Duration>,
}

impl Default for ManifestResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl ManifestResolver {
    /// Creates a resolver issuing at most `concurrency` lookups at once.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            call_timeout: None,
        }
    }

    /// Bounds every lookup by `timeout`.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Resolves every tag of `repository`.
    ///
    /// Tags listed more than once are looked up once. A tag whose lookup
    /// fails is reported in [`Resolution::failures`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry rejects the credentials.
    pub async fn resolve<G>(
        &self,
        gateway: &G,
        repository: &str,
        tags: &[String],
    ) -> Result<Resolution, GatewayError>
    where
        G: RegistryGateway + ?Sized,
    {
        let unique: BTreeSet<&str> = tags.iter().map(String::as_str).collect();
        tracing::debug!(repository, tags = unique.len(), "resolving tag digests");

        let lookups: Vec<(String, Result<String, GatewayError>)> = stream::iter(unique)
            .map(|tag| async move {
                let lookup = with_timeout(
                    self.call_timeout,
                    || format!("digest lookup for {repository}:{tag}"),
                    gateway.get_digest(repository, tag),
                )
                .await;

                if let Err(ref err) = lookup {
                    tracing::warn!(repository, tag, error = %err, "digest lookup failed");
                }

                (tag.to_string(), lookup)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        Resolution::from_lookups(repository, lookups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Gateway with fixed digests that tracks peak concurrency.
    #[derive(Default)]
    struct FixedDigests {
        digests: HashMap<String, String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        deny: bool,
    }

    impl FixedDigests {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                digests: entries
                    .iter()
                    .map(|(t, d)| ((*t).to_string(), (*d).to_string()))
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl RegistryGateway for FixedDigests {
        async fn list_repositories(&self) -> Result<Vec<String>, GatewayError> {
            Ok(vec!["repo".to_string()])
        }

        async fn list_tags(&self, _repository: &str) -> Result<Vec<String>, GatewayError> {
            Ok(self.digests.keys().cloned().collect())
        }

        async fn get_digest(&self, repository: &str, tag: &str) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.deny {
                return Err(GatewayError::Authentication {
                    message: "denied".to_string(),
                });
            }

            self.digests
                .get(tag)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound {
                    repository: repository.to_string(),
                    reference: tag.to_string(),
                })
        }

        async fn delete_manifest(&self, _repository: &str, _digest: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[tokio::test]
    async fn test_groups_tags_sharing_a_digest() {
        let gateway = FixedDigests::new(&[
            ("v1.0.0", "sha256:d"),
            ("20200101000000", "sha256:d"),
            ("latest", "sha256:e"),
        ]);

        let resolution = ManifestResolver::default()
            .resolve(&gateway, "repo", &names(&["v1.0.0", "20200101000000", "latest"]))
            .await
            .unwrap();

        assert_eq!(resolution.groups.len(), 2);
        assert_eq!(resolution.groups[0].digest, "sha256:d");
        assert_eq!(
            resolution.groups[0].tags,
            BTreeSet::from([Tag::new("repo", "v1.0.0"), Tag::new("repo", "20200101000000")])
        );
        assert_eq!(resolution.groups[1].digest, "sha256:e");
        assert!(resolution.failures.is_empty());
        assert_eq!(resolution.resolved_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_tag_is_reported() {
        let gateway = FixedDigests::new(&[("v1.0.0", "sha256:a")]);

        let resolution = ManifestResolver::default()
            .resolve(&gateway, "repo", &names(&["v1.0.0", "vanished"]))
            .await
            .unwrap();

        assert_eq!(resolution.resolved_count(), 1);
        assert_eq!(resolution.failures.len(), 1);
        assert_eq!(resolution.failures[0].tag, Tag::new("repo", "vanished"));
        assert!(resolution.failures[0].reason.contains("Not found"));
    }

    #[tokio::test]
    async fn test_duplicate_tags_looked_up_once() {
        let gateway = FixedDigests::new(&[("v1.0.0", "sha256:a")]);

        let resolution = ManifestResolver::default()
            .resolve(&gateway, "repo", &names(&["v1.0.0", "v1.0.0"]))
            .await
            .unwrap();

        assert_eq!(resolution.resolved_count(), 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let gateway = FixedDigests {
            digests: (0..20)
                .map(|i| (format!("tag-{i}"), format!("sha256:{i}")))
                .collect(),
            ..FixedDigests::default()
        };
        let tags: Vec<String> = (0..20).map(|i| format!("tag-{i}")).collect();

        let resolution = ManifestResolver::new(3)
            .resolve(&gateway, "repo", &tags)
            .await
            .unwrap();

        assert_eq!(resolution.groups.len(), 20);
        let peak = gateway.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_authentication_failure_aborts() {
        let gateway = FixedDigests {
            deny: true,
            ..FixedDigests::new(&[("v1.0.0", "sha256:a")])
        };

        let result = ManifestResolver::default()
            .resolve(&gateway, "repo", &names(&["v1.0.0"]))
            .await;

        assert!(matches!(result, Err(GatewayError::Authentication { .. })));
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out_locally() {
        let gateway = FixedDigests::new(&[("v1.0.0", "sha256:a")]);

        let resolution = ManifestResolver::default()
            .with_call_timeout(Duration::from_millis(1))
            .resolve(&gateway, "repo", &names(&["v1.0.0"]))
            .await
            .unwrap();

        assert!(resolution.groups.is_empty());
        assert_eq!(resolution.failures.len(), 1);
        assert!(resolution.failures[0].reason.contains("Timed out"));
    }

    #[test]
    fn test_from_lookups_is_order_independent() {
        let forward = vec![
            ("b".to_string(), Ok("sha256:1".to_string())),
            ("a".to_string(), Ok("sha256:1".to_string())),
            (
                "c".to_string(),
                Err(GatewayError::Transport {
                    message: "reset".to_string(),
                }),
            ),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(
            Resolution::from_lookups("repo", forward).unwrap(),
            Resolution::from_lookups("repo", reversed).unwrap()
        );
    }
}
