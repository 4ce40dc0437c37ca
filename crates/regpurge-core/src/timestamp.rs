//! Timestamp tag parsing.
//!
//! Recognized layouts, all interpreted as UTC:
//!
//! - `YYYYMMDDHHMMSS` (e.g. `20190101000000`)
//! - `YYYYMMDD-HHMMSS` (e.g. `20190101-000000`)
//! - `YYYYMMDDTHHMMSS` (e.g. `20181128T161823`, `t` accepted)
//!
//! [`find_timestamp`] additionally accepts a `YYYYMMDDTHHMMSS` run embedded
//! in a longer name, delimited on both sides by a word boundary or an
//! underscore (`build_20181128T161823`, `feature-x-20181128T161823`).

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

const DATE_DIGITS: usize = 8;
const TIME_DIGITS: usize = 6;

static EMBEDDED_TIMESTAMP: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?:\b|_)([0-9]{8}[Tt][0-9]{6})(?:\b|_)").ok());

/// Parses a whole tag name as a timestamp.
///
/// Returns `None` if the name does not match a recognized layout or does
/// not denote a valid calendar instant.
///
/// # Examples
///
/// ```
/// use regpurge_core::parse_timestamp;
///
/// let instant = parse_timestamp("20181128T161823").unwrap();
/// assert_eq!(instant.to_rfc3339(), "2018-11-28T16:18:23+00:00");
///
/// assert!(parse_timestamp("20181328000000").is_none());
/// ```
#[must_use]
pub fn parse_timestamp(tag: &str) -> Option<DateTime<Utc>> {
    if !tag.is_ascii() {
        return None;
    }
    let bytes = tag.as_bytes();

    let (date, time) = match bytes.len() {
        14 => (&tag[..DATE_DIGITS], &tag[DATE_DIGITS..]),
        15 if matches!(bytes[DATE_DIGITS], b'-' | b'T' | b't') => {
            (&tag[..DATE_DIGITS], &tag[DATE_DIGITS + 1..])
        }
        _ => return None,
    };

    if date.len() != DATE_DIGITS
        || time.len() != TIME_DIGITS
        || !date.bytes().chain(time.bytes()).all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let year = date[0..4].parse().ok()?;
    let month = date[4..6].parse().ok()?;
    let day = date[6..8].parse().ok()?;
    let hour = time[0..2].parse().ok()?;
    let minute = time[2..4].parse().ok()?;
    let second = time[4..6].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)
        .map(|naive| naive.and_utc())
}

/// Finds a timestamp in a tag name.
///
/// A whole-tag match in any layout accepted by [`parse_timestamp`] wins.
/// Otherwise the first delimited `YYYYMMDDTHHMMSS` run is used; if it is not
/// a valid calendar instant the tag has no timestamp.
///
/// # Examples
///
/// ```
/// use regpurge_core::find_timestamp;
///
/// let instant = find_timestamp("build_20181128T161823").unwrap();
/// assert_eq!(instant.to_rfc3339(), "2018-11-28T16:18:23+00:00");
///
/// assert!(find_timestamp("abc20181128T161823").is_none());
/// ```
#[must_use]
pub fn find_timestamp(tag: &str) -> Option<DateTime<Utc>> {
    parse_timestamp(tag).or_else(|| {
        let captures = EMBEDDED_TIMESTAMP.as_ref()?.captures(tag)?;
        parse_timestamp(captures.get(1)?.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_compact_layout() {
        let instant = parse_timestamp("20190101000000").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_dashed_layout() {
        let instant = parse_timestamp("20231231-235959").unwrap();
        assert_eq!(
            instant,
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_iso_basic_layout() {
        let upper = parse_timestamp("20181128T161823").unwrap();
        let lower = parse_timestamp("20181128t161823").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper, Utc.with_ymd_and_hms(2018, 11, 28, 16, 18, 23).unwrap());
    }

    #[test]
    fn test_rejects_invalid_calendar_values() {
        assert!(parse_timestamp("20191301000000").is_none());
        assert!(parse_timestamp("20190230000000").is_none());
        assert!(parse_timestamp("20190101250000").is_none());
        assert!(parse_timestamp("20190101006000").is_none());
    }

    #[test]
    fn test_rejects_other_shapes() {
        assert!(parse_timestamp("2019010100000").is_none());
        assert!(parse_timestamp("201901010000000").is_none());
        assert!(parse_timestamp("20190101_000000").is_none());
        assert!(parse_timestamp("2019-01-01T00:00").is_none());
        assert!(parse_timestamp("2019010100000a").is_none());
        assert!(parse_timestamp("build-20190101000000").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_non_ascii_input_is_rejected() {
        // 14 bytes, with a multi-byte character across the date boundary.
        assert!(parse_timestamp("2019010é00000").is_none());
        assert!(parse_timestamp("20190101é00000").is_none());
    }

    #[test]
    fn test_find_embedded_timestamp() {
        let expected = Utc.with_ymd_and_hms(2018, 11, 28, 16, 18, 23).unwrap();
        for tag in [
            "build_20181128T161823",
            "feature-x-20181128T161823",
            "20181128T161823-hotfix",
            "release.20181128t161823",
            "ci_20181128T161823_amd64",
        ] {
            assert_eq!(find_timestamp(tag), Some(expected), "{tag}");
        }
    }

    #[test]
    fn test_find_prefers_whole_tag() {
        assert_eq!(
            find_timestamp("20190101000000"),
            Some(Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_find_requires_delimiters() {
        assert!(find_timestamp("abc20181128T161823").is_none());
        assert!(find_timestamp("build_20181128T1618234").is_none());
        assert!(find_timestamp("build-20190101000000").is_none());
        assert!(find_timestamp("build_20181301T000000").is_none());
        assert!(find_timestamp("latest").is_none());
    }
}
