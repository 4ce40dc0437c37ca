//! Shared registry fixtures.

use chrono::{DateTime, TimeZone, Utc};

use crate::memory::InMemoryRegistry;

/// Repository used by the reference fixtures.
pub const REFERENCE_REPOSITORY: &str = "team/api";

/// Fixed evaluation instant: 2024-01-01T00:00:00Z.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A fake `sha256:` digest derived from a label.
///
/// # Examples
///
/// ```rust
/// use regpurge_test::digest;
///
/// assert_eq!(digest("a"), "sha256:aaaaaaaaaaaa");
/// ```
#[must_use]
pub fn digest(label: &str) -> String {
    format!("sha256:{}", label.repeat(12))
}

/// Registry holding the reference repository:
///
/// | tag | digest |
/// |-----|--------|
/// | `v2.0.0` | A |
/// | `v2.1.0-beta` | B |
/// | `20190101000000` | C |
/// | `latest` | D |
///
/// Evaluated at [`fixed_now`] with default settings, B and C are deleted and
/// A and D kept.
#[must_use]
pub fn reference_registry() -> InMemoryRegistry {
    InMemoryRegistry::new()
        .with_tag(REFERENCE_REPOSITORY, "v2.0.0", &digest("a"))
        .with_tag(REFERENCE_REPOSITORY, "v2.1.0-beta", &digest("b"))
        .with_tag(REFERENCE_REPOSITORY, "20190101000000", &digest("c"))
        .with_tag(REFERENCE_REPOSITORY, "latest", &digest("d"))
}
