//! Retention policy.
//!
//! The policy turns a [`Classification`] into a keep/delete decision:
//!
//! | Classification | Default decision |
//! |----------------|------------------|
//! | release        | keep, regardless of age |
//! | prerelease     | delete |
//! | timestamp      | delete once older than `max_age` |
//! | unrecognized   | keep |

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{Classification, TimestampMatching};

/// Default retention window for timestamp tags, in days.
pub const DEFAULT_MAX_AGE_DAYS: i64 = 90;

/// Keep or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionDecision {
    /// The tag must survive.
    Keep,
    /// The tag may be removed.
    Delete,
}

impl RetentionDecision {
    /// Returns true for [`RetentionDecision::Delete`].
    #[must_use]
    pub const fn is_delete(self) -> bool {
        matches!(self, Self::Delete)
    }
}

/// Why a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionReason {
    /// Protected by the keep list.
    KeepList,
    /// Stable release.
    StableRelease,
    /// Prerelease under the default policy.
    Prerelease,
    /// Prerelease, retained because prereleases are configured to be kept.
    PrereleaseRetained,
    /// Timestamp older than the retention window.
    Expired,
    /// Timestamp within the retention window.
    WithinRetention,
    /// Timestamp tag, but timestamps in tag names are not trusted.
    TimestampUntrusted,
    /// Not a semantic version while semantic versions are required.
    NotSemver,
    /// Could not be classified.
    Unrecognized,
}

impl RetentionReason {
    /// The decision this reason implies.
    #[must_use]
    pub const fn decision(self) -> RetentionDecision {
        match self {
            Self::Prerelease | Self::Expired | Self::NotSemver => RetentionDecision::Delete,
            Self::KeepList
            | Self::StableRelease
            | Self::PrereleaseRetained
            | Self::WithinRetention
            | Self::TimestampUntrusted
            | Self::Unrecognized => RetentionDecision::Keep,
        }
    }

    /// Human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::KeepList => "protected by keep list",
            Self::StableRelease => "stable release",
            Self::Prerelease => "prerelease",
            Self::PrereleaseRetained => "prerelease (retained by configuration)",
            Self::Expired => "timestamp older than retention window",
            Self::WithinRetention => "timestamp within retention window",
            Self::TimestampUntrusted => "timestamp tags not trusted",
            Self::NotSemver => "not a semantic version",
            Self::Unrecognized => "unrecognized tag",
        }
    }
}

impl std::fmt::Display for RetentionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Decides under the default policy with the given retention window.
///
/// A timestamp tag is deleted only when strictly older than `max_age`;
/// a tag exactly `max_age` old is kept.
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use regpurge_core::{classify, decide, RetentionDecision};
///
/// let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let max_age = TimeDelta::days(90);
///
/// assert_eq!(decide(&classify("v1.0.0"), now, max_age), RetentionDecision::Keep);
/// assert_eq!(decide(&classify("1.0.0-rc.1"), now, max_age), RetentionDecision::Delete);
/// assert_eq!(decide(&classify("20190101000000"), now, max_age), RetentionDecision::Delete);
/// assert_eq!(decide(&classify("latest"), now, max_age), RetentionDecision::Keep);
/// ```
#[must_use]
pub fn decide(
    classification: &Classification,
    now: DateTime<Utc>,
    max_age: TimeDelta,
) -> RetentionDecision {
    RetentionPolicy::new(max_age).decide(classification, now)
}

/// Configurable retention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Retention window for timestamp tags.
    pub max_age: TimeDelta,

    /// Keep prerelease tags instead of deleting them.
    pub keep_prereleases: bool,

    /// Derive age from timestamps in tag names. When disabled, timestamp
    /// tags are handled like unrecognized tags.
    pub trust_timestamp_tags: bool,

    /// Delete every tag that is not a semantic version.
    pub require_semver: bool,

    /// Where timestamps are looked for in tag names.
    pub timestamp_matching: TimestampMatching,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(TimeDelta::days(DEFAULT_MAX_AGE_DAYS))
    }
}

impl RetentionPolicy {
    /// Creates the default policy with the given retention window.
    #[must_use]
    pub const fn new(max_age: TimeDelta) -> Self {
        Self {
            max_age,
            keep_prereleases: false,
            trust_timestamp_tags: true,
            require_semver: false,
            timestamp_matching: TimestampMatching::Embedded,
        }
    }

    /// Sets whether prereleases are kept.
    #[must_use]
    pub const fn with_keep_prereleases(mut self, keep: bool) -> Self {
        self.keep_prereleases = keep;
        self
    }

    /// Sets whether timestamps in tag names are trusted.
    #[must_use]
    pub const fn with_trust_timestamp_tags(mut self, trust: bool) -> Self {
        self.trust_timestamp_tags = trust;
        self
    }

    /// Sets whether non-semver tags are deleted.
    #[must_use]
    pub const fn with_require_semver(mut self, require: bool) -> Self {
        self.require_semver = require;
        self
    }

    /// Restricts timestamp detection to whole tag names.
    #[must_use]
    pub const fn with_whole_tag_timestamps(mut self, whole_tag_only: bool) -> Self {
        self.timestamp_matching = if whole_tag_only {
            TimestampMatching::WholeTag
        } else {
            TimestampMatching::Embedded
        };
        self
    }

    /// Evaluates a classification, returning the reason for the decision.
    #[must_use]
    pub fn evaluate(&self, classification: &Classification, now: DateTime<Utc>) -> RetentionReason {
        match classification {
            Classification::SemanticRelease { .. } => RetentionReason::StableRelease,
            Classification::SemanticPrerelease { .. } if self.keep_prereleases => {
                RetentionReason::PrereleaseRetained
            }
            Classification::SemanticPrerelease { .. } => RetentionReason::Prerelease,
            _ if self.require_semver => RetentionReason::NotSemver,
            Classification::Timestamp { instant } if self.trust_timestamp_tags => {
                if now.signed_duration_since(*instant) > self.max_age {
                    RetentionReason::Expired
                } else {
                    RetentionReason::WithinRetention
                }
            }
            Classification::Timestamp { .. } => RetentionReason::TimestampUntrusted,
            Classification::Unrecognized => RetentionReason::Unrecognized,
        }
    }

    /// Decides whether to keep or delete a classified tag.
    #[must_use]
    pub fn decide(&self, classification: &Classification, now: DateTime<Utc>) -> RetentionDecision {
        self.evaluate(classification, now).decision()
    }
}
