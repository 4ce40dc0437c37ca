//! Tag classification.
//!
//! Every tag name maps to exactly one [`Classification`]. The classifier
//! never fails: names it cannot make sense of are [`Classification::Unrecognized`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::timestamp::{find_timestamp, parse_timestamp};
use crate::version::SemanticVersion;

/// What kind of build a tag name denotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    /// Stable semantic version release (`1.2.3`, `v1.2.3+build`).
    SemanticRelease {
        /// Major version.
        major: u64,
        /// Minor version.
        minor: u64,
        /// Patch version.
        patch: u64,
        /// Build metadata, if present.
        #[serde(skip_serializing_if = "Option::is_none")]
        build: Option<String>,
    },

    /// Semantic version with a pre-release component (`1.2.3-rc.1`).
    SemanticPrerelease {
        /// Major version.
        major: u64,
        /// Minor version.
        minor: u64,
        /// Patch version.
        patch: u64,
        /// Pre-release component.
        pre: String,
    },

    /// Timestamp-named build.
    Timestamp {
        /// Instant encoded in the tag name (UTC).
        instant: DateTime<Utc>,
    },

    /// Anything else (`latest`, branch names, commit hashes, ...).
    Unrecognized,
}

impl Classification {
    /// Short, stable name of the variant, for logs and reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SemanticRelease { .. } => "release",
            Self::SemanticPrerelease { .. } => "prerelease",
            Self::Timestamp { .. } => "timestamp",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timestamp { instant } => write!(f, "timestamp {}", instant.to_rfc3339()),
            other => f.write_str(other.kind()),
        }
    }
}

/// Where a timestamp may appear in a tag name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMatching {
    /// The whole tag, or a delimited `YYYYMMDDTHHMMSS` run inside it.
    #[default]
    Embedded,
    /// Only the whole tag.
    WholeTag,
}

/// Classifies a tag name, accepting embedded timestamps.
///
/// Semantic versions take precedence over timestamps; the two grammars do
/// not overlap in practice since timestamps carry no dots.
///
/// # Examples
///
/// ```
/// use regpurge_core::{classify, Classification};
///
/// assert!(matches!(classify("v2.0.0"), Classification::SemanticRelease { major: 2, .. }));
/// assert!(matches!(classify("2.1.0-beta"), Classification::SemanticPrerelease { .. }));
/// assert!(matches!(classify("20190101000000"), Classification::Timestamp { .. }));
/// assert!(matches!(classify("build_20190101T000000"), Classification::Timestamp { .. }));
/// assert_eq!(classify("latest"), Classification::Unrecognized);
/// ```
#[must_use]
pub fn classify(tag_name: &str) -> Classification {
    classify_with(tag_name, TimestampMatching::Embedded)
}

/// Classifies a tag name with the given timestamp matching.
#[must_use]
pub fn classify_with(tag_name: &str, matching: TimestampMatching) -> Classification {
    if let Some(version) = SemanticVersion::parse(tag_name) {
        return match version.pre {
            Some(pre) => Classification::SemanticPrerelease {
                major: version.major,
                minor: version.minor,
                patch: version.patch,
                pre,
            },
            None => Classification::SemanticRelease {
                major: version.major,
                minor: version.minor,
                patch: version.patch,
                build: version.build,
            },
        };
    }

    let instant = match matching {
        TimestampMatching::Embedded => find_timestamp(tag_name),
        TimestampMatching::WholeTag => parse_timestamp(tag_name),
    };
    instant.map_or(Classification::Unrecognized, |instant| {
        Classification::Timestamp { instant }
    })
}
