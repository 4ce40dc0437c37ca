//! In-memory registry gateway.
//!
//! [`InMemoryRegistry`] behaves like a registry that deletes by digest:
//! deleting a manifest removes every tag pointing at it. Failures can be
//! injected per tag, digest or repository.
//!
//! # Examples
//!
//! ```rust
//! use regpurge_test::InMemoryRegistry;
//!
//! let registry = InMemoryRegistry::new()
//!     .with_tag("team/api", "v1.0.0", "sha256:a")
//!     .with_tag("team/api", "1.1.0-rc.1", "sha256:b")
//!     .with_refused_delete("sha256:b");
//!
//! assert_eq!(registry.tags("team/api"), vec!["1.1.0-rc.1", "v1.0.0"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use regpurge_core::{GatewayError, RegistryGateway};

#[derive(Debug, Default)]
struct State {
    /// repository -> tag -> digest
    repositories: BTreeMap<String, BTreeMap<String, String>>,
    /// Tags listed but not resolvable.
    unresolvable: BTreeSet<(String, String)>,
    refused: BTreeSet<String>,
    unlistable: BTreeSet<String>,
    deny: bool,
    /// Repositories where every call is rejected as unauthenticated.
    denied_repositories: BTreeSet<String>,
    /// Repositories where deletions are rejected as unauthenticated.
    denied_deletes: BTreeSet<String>,
    deleted: Vec<(String, String)>,
    delete_attempts: usize,
}

/// Registry gateway backed by in-process maps.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag pointing at `digest`.
    #[must_use]
    pub fn with_tag(self, repository: &str, tag: &str, digest: &str) -> Self {
        self.lock()
            .repositories
            .entry(repository.to_string())
            .or_default()
            .insert(tag.to_string(), digest.to_string());
        self
    }

    /// Adds a tag that is listed but whose digest lookup reports not found,
    /// as when a tag is deleted between listing and lookup.
    #[must_use]
    pub fn with_unresolvable_tag(self, repository: &str, tag: &str) -> Self {
        {
            let mut state = self.lock();
            state
                .repositories
                .entry(repository.to_string())
                .or_default();
            state
                .unresolvable
                .insert((repository.to_string(), tag.to_string()));
        }
        self
    }

    /// Makes deletion of `digest` fail.
    #[must_use]
    pub fn with_refused_delete(self, digest: &str) -> Self {
        self.lock().refused.insert(digest.to_string());
        self
    }

    /// Adds a repository whose tags cannot be listed.
    #[must_use]
    pub fn with_unlistable_repository(self, repository: &str) -> Self {
        self.lock().unlistable.insert(repository.to_string());
        self
    }

    /// Rejects every call as unauthenticated.
    #[must_use]
    pub fn with_denied_credentials(self) -> Self {
        self.lock().deny = true;
        self
    }

    /// Rejects every call on `repository` as unauthenticated, as when a
    /// token lacks access to it.
    #[must_use]
    pub fn with_denied_repository(self, repository: &str) -> Self {
        self.lock().denied_repositories.insert(repository.to_string());
        self
    }

    /// Rejects deletions in `repository` as unauthenticated, as when a
    /// token may read but not delete.
    #[must_use]
    pub fn with_denied_deletes(self, repository: &str) -> Self {
        self.lock().denied_deletes.insert(repository.to_string());
        self
    }

    /// Current tags of a repository, sorted.
    #[must_use]
    pub fn tags(&self, repository: &str) -> Vec<String> {
        self.lock()
            .repositories
            .get(repository)
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Digests deleted from a repository, in deletion order.
    #[must_use]
    pub fn deleted_digests(&self, repository: &str) -> Vec<String> {
        self.lock()
            .deleted
            .iter()
            .filter(|(r, _)| r == repository)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// Number of deletion calls received, successful or not.
    #[must_use]
    pub fn delete_attempts(&self) -> usize {
        self.lock().delete_attempts
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_credentials(state: &State) -> Result<(), GatewayError> {
        if state.deny {
            return Err(Self::unauthorized());
        }
        Ok(())
    }

    fn check_repository(state: &State, repository: &str) -> Result<(), GatewayError> {
        Self::check_credentials(state)?;
        if state.denied_repositories.contains(repository) {
            return Err(Self::unauthorized());
        }
        Ok(())
    }

    fn unauthorized() -> GatewayError {
        GatewayError::Authentication {
            message: "UNAUTHORIZED: authentication required".to_string(),
        }
    }
}

#[async_trait]
impl RegistryGateway for InMemoryRegistry {
    async fn list_repositories(&self) -> Result<Vec<String>, GatewayError> {
        let state = self.lock();
        Self::check_credentials(&state)?;

        let repositories: BTreeSet<String> = state
            .repositories
            .keys()
            .chain(&state.unlistable)
            .cloned()
            .collect();
        Ok(repositories.into_iter().collect())
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, GatewayError> {
        let state = self.lock();
        Self::check_repository(&state, repository)?;

        if state.unlistable.contains(repository) {
            return Err(GatewayError::Transport {
                message: "HTTP error from registry: 500 - internal error".to_string(),
            });
        }

        let tags = state
            .repositories
            .get(repository)
            .ok_or_else(|| GatewayError::Transport {
                message: format!("Repository not found: {repository}"),
            })?;

        Ok(tags
            .keys()
            .cloned()
            .chain(
                state
                    .unresolvable
                    .iter()
                    .filter(|(r, _)| r == repository)
                    .map(|(_, t)| t.clone()),
            )
            .collect())
    }

    async fn get_digest(&self, repository: &str, tag: &str) -> Result<String, GatewayError> {
        let state = self.lock();
        Self::check_repository(&state, repository)?;

        state
            .repositories
            .get(repository)
            .and_then(|tags| tags.get(tag))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                repository: repository.to_string(),
                reference: tag.to_string(),
            })
    }

    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.delete_attempts += 1;
        Self::check_repository(&state, repository)?;
        if state.denied_deletes.contains(repository) {
            return Err(Self::unauthorized());
        }

        if state.refused.contains(digest) {
            return Err(GatewayError::Delete {
                repository: repository.to_string(),
                digest: digest.to_string(),
                message: "Deletion is disabled on the registry (HTTP 405)".to_string(),
            });
        }

        let tags = state
            .repositories
            .get_mut(repository)
            .ok_or_else(|| GatewayError::NotFound {
                repository: repository.to_string(),
                reference: digest.to_string(),
            })?;

        let before = tags.len();
        tags.retain(|_, d| d.as_str() != digest);
        if tags.len() == before {
            return Err(GatewayError::NotFound {
                repository: repository.to_string(),
                reference: digest.to_string(),
            });
        }

        tracing::debug!(repository, digest, "deleted manifest");
        state
            .deleted
            .push((repository.to_string(), digest.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_removes_every_tag_of_digest() {
        let registry = InMemoryRegistry::new()
            .with_tag("repo", "a", "sha256:1")
            .with_tag("repo", "b", "sha256:1")
            .with_tag("repo", "c", "sha256:2");

        registry.delete_manifest("repo", "sha256:1").await.unwrap();

        assert_eq!(registry.tags("repo"), vec!["c"]);
        assert_eq!(registry.deleted_digests("repo"), vec!["sha256:1"]);

        let again = registry.delete_manifest("repo", "sha256:1").await;
        assert!(again.unwrap_err().is_not_found());
        assert_eq!(registry.delete_attempts(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_tag_is_listed() {
        let registry = InMemoryRegistry::new()
            .with_tag("repo", "v1.0.0", "sha256:1")
            .with_unresolvable_tag("repo", "ghost");

        let mut tags = registry.list_tags("repo").await.unwrap();
        tags.sort();
        assert_eq!(tags, vec!["ghost", "v1.0.0"]);
        assert!(registry
            .get_digest("repo", "ghost")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_denied_credentials() {
        let registry = InMemoryRegistry::new()
            .with_tag("repo", "v1.0.0", "sha256:1")
            .with_denied_credentials();

        assert!(registry.list_repositories().await.unwrap_err().is_fatal());
        assert!(registry.list_tags("repo").await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_denied_deletes_are_scoped_to_repository() {
        let registry = InMemoryRegistry::new()
            .with_tag("open", "v1.0.0", "sha256:1")
            .with_tag("locked", "v1.0.0", "sha256:2")
            .with_denied_deletes("locked");

        assert_eq!(registry.get_digest("locked", "v1.0.0").await.unwrap(), "sha256:2");
        assert!(registry
            .delete_manifest("locked", "sha256:2")
            .await
            .unwrap_err()
            .is_fatal());
        registry.delete_manifest("open", "sha256:1").await.unwrap();
        assert_eq!(registry.tags("locked"), vec!["v1.0.0"]);
    }
}
