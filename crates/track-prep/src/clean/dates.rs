//! Release-date normalization shared by bulk cleaning and catalogue lookups.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Stored in place of a release date that could not be parsed.
pub const DATE_SENTINEL: &str = "0";

static YEAR_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}$").expect("Invalid regex: year only"));

/// Expand a bare four-digit year to the first of January of that year.
/// Anything else is returned trimmed and unchanged.
pub fn normalize_release_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if YEAR_ONLY.is_match(trimmed) {
        format!("{}-01-01", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Normalize and parse a release date with the given chrono format.
pub fn parse_release_date(raw: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&normalize_release_date(raw), format).ok()
}
