//! Semantic version parsing for tag names.
//!
//! Accepts `MAJOR.MINOR.PATCH` with an optional leading `v`, an optional
//! `-pre.release` component and optional `+build` metadata:
//!
//! - `v1.2.3` → release
//! - `1.2.3+20240101` → release with build metadata
//! - `1.2.3-rc.1` → prerelease

use serde::Serialize;

/// A parsed semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemanticVersion {
    /// Major version.
    pub major: u64,

    /// Minor version.
    pub minor: u64,

    /// Patch version.
    pub patch: u64,

    /// Pre-release component (after `-`), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre: Option<String>,

    /// Build metadata (after `+`), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

impl SemanticVersion {
    /// Parses a tag name as a semantic version.
    ///
    /// Returns `None` when the name is not a semantic version.
    ///
    /// # Examples
    ///
    /// ```
    /// use regpurge_core::SemanticVersion;
    ///
    /// let version = SemanticVersion::parse("v1.2.3-rc.1").unwrap();
    /// assert_eq!((version.major, version.minor, version.patch), (1, 2, 3));
    /// assert_eq!(version.pre.as_deref(), Some("rc.1"));
    ///
    /// assert!(SemanticVersion::parse("1.2").is_none());
    /// assert!(SemanticVersion::parse("latest").is_none());
    /// ```
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let version = input.strip_prefix('v').unwrap_or(input);

        let (version, build) = match version.split_once('+') {
            Some((version, build)) => (version, Some(build)),
            None => (version, None),
        };

        let (core, pre) = match version.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (version, None),
        };

        let mut parts = core.split('.');
        let major = parse_numeric(parts.next()?)?;
        let minor = parse_numeric(parts.next()?)?;
        let patch = parse_numeric(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }

        if !pre.map_or(true, valid_identifiers) || !build.map_or(true, valid_identifiers) {
            return None;
        }

        Some(Self {
            major,
            minor,
            patch,
            pre: pre.map(str::to_string),
            build: build.map(str::to_string),
        })
    }

    /// Returns true if this version carries a pre-release component.
    #[must_use]
    pub const fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl std::fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.pre {
            write!(f, "-{pre}")?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

/// Parses a numeric identifier: ASCII digits, no leading zeros.
fn parse_numeric(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

/// Dot-separated, non-empty identifiers of `[0-9A-Za-z-]`.
fn valid_identifiers(value: &str) -> bool {
    value.split('.').all(|identifier| {
        !identifier.is_empty()
            && identifier
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}
