//! Purge planning.
//!
//! The planner decides per tag, then reconciles per digest: a digest is
//! deleted only if every tag pointing at it is marked for deletion. Deleting
//! a digest unlinks all of its tags, so one retained tag protects the whole
//! manifest.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::{classify_with, Classification};
use crate::keep_list::KeepList;
use crate::policy::{RetentionDecision, RetentionPolicy, RetentionReason};
use crate::resolver::{Resolution, ResolutionFailure};
use crate::tag::Tag;

/// Classification and decision for one resolved tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagEvaluation {
    /// The tag.
    pub tag: Tag,

    /// Digest the tag resolved to.
    pub digest: String,

    /// How the tag name was classified.
    pub classification: Classification,

    /// Decision for the tag on its own.
    pub decision: RetentionDecision,

    /// Why.
    pub reason: RetentionReason,
}

/// A digest that had deletable tags but is kept because of other tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectedDigest {
    /// Manifest digest.
    pub digest: String,

    /// Tags that would have been deleted on their own.
    pub deletable: BTreeSet<Tag>,

    /// Tags whose retention protects the digest.
    pub retained_by: BTreeSet<Tag>,
}

/// Deletion plan for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgePlan {
    /// Repository name.
    pub repository: String,

    /// Digests to delete.
    pub digests_to_delete: BTreeSet<String>,

    /// Tags that survive the plan, including unresolved tags.
    pub tags_retained: BTreeSet<Tag>,

    /// Tags unlinked by deleting [`PurgePlan::digests_to_delete`].
    pub tags_to_delete: BTreeSet<Tag>,

    /// Digests kept although some of their tags were marked for deletion.
    pub protected_digests: Vec<ProtectedDigest>,

    /// Tags retained because their digest could not be resolved.
    pub resolution_failures: Vec<ResolutionFailure>,

    /// Per-tag evaluations, ordered by digest then tag.
    pub evaluations: Vec<TagEvaluation>,
}

impl PurgePlan {
    /// Returns true if the plan deletes nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.digests_to_delete.is_empty()
    }

    /// Tags pointing at `digest` according to this plan.
    pub fn tags_for_digest<'a>(&'a self, digest: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.evaluations
            .iter()
            .filter(move |e| e.digest == digest)
            .map(|e| &e.tag)
    }
}

/// Builds a plan from a resolution using caller-supplied rules.
///
/// `classify` maps a tag name to its classification; `decide` returns the
/// retention reason for a tag, given the digest it resolved to, and the
/// decision follows from the reason. Pure: the same inputs always yield
/// the same plan.
pub fn plan<C, D>(repository: &str, resolution: &Resolution, classify: C, decide: D) -> PurgePlan
where
    C: Fn(&str) -> Classification,
    D: Fn(&Tag, &str, &Classification) -> RetentionReason,
{
    let mut digests_to_delete = BTreeSet::new();
    let mut tags_retained = BTreeSet::new();
    let mut tags_to_delete = BTreeSet::new();
    let mut protected_digests = Vec::new();
    let mut evaluations = Vec::with_capacity(resolution.resolved_count());

    for group in &resolution.groups {
        let mut deletable = BTreeSet::new();
        let mut retained = BTreeSet::new();

        for tag in &group.tags {
            let classification = classify(&tag.name);
            let reason = decide(tag, &group.digest, &classification);
            let decision = reason.decision();

            if decision.is_delete() {
                deletable.insert(tag.clone());
            } else {
                retained.insert(tag.clone());
            }

            evaluations.push(TagEvaluation {
                tag: tag.clone(),
                digest: group.digest.clone(),
                classification,
                decision,
                reason,
            });
        }

        if retained.is_empty() {
            digests_to_delete.insert(group.digest.clone());
            tags_to_delete.extend(deletable);
        } else {
            if !deletable.is_empty() {
                tracing::debug!(
                    repository,
                    digest = %group.digest,
                    retained = retained.len(),
                    "digest protected by retained tags"
                );
                tags_retained.extend(deletable.iter().cloned());
                protected_digests.push(ProtectedDigest {
                    digest: group.digest.clone(),
                    deletable,
                    retained_by: retained.clone(),
                });
            }
            tags_retained.extend(retained);
        }
    }

    tags_retained.extend(resolution.failures.iter().map(|f| f.tag.clone()));

    PurgePlan {
        repository: repository.to_string(),
        digests_to_delete,
        tags_retained,
        tags_to_delete,
        protected_digests,
        resolution_failures: resolution.failures.clone(),
        evaluations,
    }
}

/// Plans purges with a configured policy and keep list.
#[derive(Debug, Clone, Default)]
pub struct PurgePlanner {
    policy: RetentionPolicy,
    keep_list: KeepList,
}

impl PurgePlanner {
    /// Creates a planner with the given policy and an empty keep list.
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            keep_list: KeepList::new(),
        }
    }

    /// Sets the keep list.
    #[must_use]
    pub fn with_keep_list(mut self, keep_list: KeepList) -> Self {
        self.keep_list = keep_list;
        self
    }

    /// Evaluates a single tag.
    #[must_use]
    pub fn reason_for(
        &self,
        tag: &Tag,
        digest: &str,
        classification: &Classification,
        now: DateTime<Utc>,
    ) -> RetentionReason {
        if self.keep_list.protects(tag, Some(digest)) {
            RetentionReason::KeepList
        } else {
            self.policy.evaluate(classification, now)
        }
    }

    /// Plans the purge of a resolved repository as of `now`.
    #[must_use]
    pub fn plan(&self, resolution: &Resolution, now: DateTime<Utc>) -> PurgePlan {
        plan(
            &resolution.repository,
            resolution,
            |name| classify_with(name, self.policy.timestamp_matching),
            |tag, digest, classification| self.reason_for(tag, digest, classification, now),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn resolution(entries: &[(&str, &str)], missing: &[&str]) -> Resolution {
        let lookups = entries
            .iter()
            .map(|(tag, digest)| ((*tag).to_string(), Ok((*digest).to_string())))
            .chain(missing.iter().map(|tag| {
                (
                    (*tag).to_string(),
                    Err(GatewayError::NotFound {
                        repository: "repo".to_string(),
                        reference: (*tag).to_string(),
                    }),
                )
            }));
        Resolution::from_lookups("repo", lookups).unwrap()
    }

    fn tags(names: &[&str]) -> BTreeSet<Tag> {
        names.iter().map(|n| Tag::new("repo", *n)).collect()
    }

    #[test]
    fn test_release_protects_shared_digest() {
        let planner = PurgePlanner::default();
        let res = resolution(&[("v1.0.0", "D"), ("20200101000000", "D")], &[]);

        let plan = planner.plan(&res, now() + TimeDelta::days(3650));

        assert!(plan.digests_to_delete.is_empty());
        assert_eq!(plan.tags_retained, tags(&["v1.0.0", "20200101000000"]));
        assert!(plan.tags_to_delete.is_empty());
        assert_eq!(plan.protected_digests.len(), 1);
        assert_eq!(plan.protected_digests[0].deletable, tags(&["20200101000000"]));
        assert_eq!(plan.protected_digests[0].retained_by, tags(&["v1.0.0"]));
    }

    #[test]
    fn test_fully_deletable_digest_is_deleted() {
        let planner = PurgePlanner::default();
        let res = resolution(&[("1.0.0-rc.1", "B"), ("20190101000000", "B")], &[]);

        let plan = planner.plan(&res, now());

        assert_eq!(plan.digests_to_delete, BTreeSet::from(["B".to_string()]));
        assert_eq!(plan.tags_to_delete, tags(&["1.0.0-rc.1", "20190101000000"]));
        assert!(plan.tags_retained.is_empty());
        assert_eq!(plan.tags_for_digest("B").count(), 2);
    }

    #[test]
    fn test_mixed_repository() {
        let planner = PurgePlanner::default();
        let res = resolution(
            &[
                ("v2.0.0", "A"),
                ("v2.1.0-beta", "B"),
                ("20190101000000", "C"),
                ("latest", "D"),
            ],
            &[],
        );

        let plan = planner.plan(&res, now());

        assert_eq!(
            plan.digests_to_delete,
            BTreeSet::from(["B".to_string(), "C".to_string()])
        );
        assert_eq!(plan.tags_retained, tags(&["v2.0.0", "latest"]));
        assert!(plan.protected_digests.is_empty());
    }

    #[test]
    fn test_unresolved_tags_are_retained() {
        let planner = PurgePlanner::default();
        let res = resolution(&[("1.0.0-rc.1", "B")], &["1.0.0-rc.2"]);

        let plan = planner.plan(&res, now());

        assert!(plan.tags_retained.contains(&Tag::new("repo", "1.0.0-rc.2")));
        assert_eq!(plan.resolution_failures.len(), 1);
        assert_eq!(plan.digests_to_delete, BTreeSet::from(["B".to_string()]));
    }

    #[test]
    fn test_keep_list_protects_by_tag_and_digest() {
        let keep_list = KeepList::parse("repo:1.0.0-rc.1\n*@sha256:pinned").unwrap();
        let planner = PurgePlanner::default().with_keep_list(keep_list);
        let res = resolution(
            &[
                ("1.0.0-rc.1", "sha256:a"),
                ("1.0.0-rc.2", "sha256:pinned"),
                ("1.0.0-rc.3", "sha256:c"),
            ],
            &[],
        );

        let plan = planner.plan(&res, now());

        assert_eq!(plan.digests_to_delete, BTreeSet::from(["sha256:c".to_string()]));
        let reasons: Vec<_> = plan.evaluations.iter().map(|e| e.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RetentionReason::KeepList,
                RetentionReason::Prerelease,
                RetentionReason::KeepList
            ]
        );
    }

    #[test]
    fn test_planning_is_idempotent() {
        let planner = PurgePlanner::default().with_keep_list(KeepList::new().with_latest());
        let res = resolution(
            &[("v1.0.0", "A"), ("1.1.0-rc.1", "B"), ("latest", "B"), ("20100101000000", "C")],
            &["gone"],
        );

        assert_eq!(planner.plan(&res, now()), planner.plan(&res, now()));
    }

    #[test]
    fn test_generic_plan_uses_supplied_rules() {
        let res = resolution(&[("keep-me", "A"), ("drop-me", "B")], &[]);

        let plan = plan("repo", &res, |_| Classification::Unrecognized, |tag, _, _| {
            if tag.name.starts_with("drop") {
                RetentionReason::NotSemver
            } else {
                RetentionReason::Unrecognized
            }
        });

        assert_eq!(plan.digests_to_delete, BTreeSet::from(["B".to_string()]));
        assert_eq!(plan.tags_retained, tags(&["keep-me"]));
    }

    #[test]
    fn test_embedded_timestamps_follow_policy() {
        let res = resolution(&[("build_20190101T000000", "A"), ("v1.0.0", "B")], &[]);

        let plan = PurgePlanner::default().plan(&res, now());
        assert_eq!(plan.digests_to_delete, BTreeSet::from(["A".to_string()]));

        let whole_tag = PurgePlanner::new(RetentionPolicy::default().with_whole_tag_timestamps(true));
        let plan = whole_tag.plan(&res, now());
        assert!(plan.is_noop());
        assert_eq!(plan.evaluations[0].reason, RetentionReason::Unrecognized);
    }

    #[test]
    fn test_empty_resolution() {
        let plan = PurgePlanner::default().plan(&Resolution::default(), now());
        assert!(plan.is_noop());
        assert!(plan.evaluations.is_empty());
    }
}
