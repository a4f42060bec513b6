//! Release-date enrichment from an external catalogue.
//!
//! The [`CatalogueLookup`] trait is always available so tests and callers can
//! plug in their own source. The HTTP-backed [`SpotifyCatalogue`] needs the
//! `catalogue` feature (on by default).
//!
//! Lookups never fail a batch: a catalogue error, an empty answer or a
//! missing track id all become [`ReleaseDateLookup::Unknown`], and the row's
//! date stays missing for the cleaning stage to handle.

mod provider;
pub use provider::CatalogueLookup;

#[cfg(feature = "catalogue")]
mod spotify;
#[cfg(feature = "catalogue")]
pub use spotify::{SpotifyCatalogue, SpotifyConfig, SpotifyConfigBuilder};

use crate::clean::normalize_release_date;
use crate::error::{PrepError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Outcome of a single release-date lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "date", rename_all = "snake_case")]
pub enum ReleaseDateLookup {
    /// Release date with the four-digit-year rule already applied.
    Found(String),
    Unknown,
}

impl ReleaseDateLookup {
    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Found(date) => Some(date),
            Self::Unknown => None,
        }
    }
}

/// Look up one track, recovering every failure as `Unknown`. Single attempt.
pub fn lookup_release_date(catalogue: &dyn CatalogueLookup, track_id: &str) -> ReleaseDateLookup {
    match catalogue.release_date(track_id) {
        Ok(raw) if !raw.trim().is_empty() => ReleaseDateLookup::Found(normalize_release_date(&raw)),
        Ok(_) => ReleaseDateLookup::Unknown,
        Err(e) => {
            warn!(
                "{} lookup for track '{}' failed: {}",
                catalogue.name(),
                track_id,
                e
            );
            ReleaseDateLookup::Unknown
        }
    }
}

/// Counters for one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub catalogue: String,
    /// Distinct track ids sent to the catalogue.
    pub looked_up: usize,
    pub found: usize,
    pub unknown: usize,
}

/// Fill missing release dates from `catalogue`, keyed by `id_column`.
///
/// Only rows whose date is missing are looked up, and each distinct id at
/// most once. If the table has no `date_column` at all it is created.
pub fn enrich_release_dates(
    df: &DataFrame,
    catalogue: &dyn CatalogueLookup,
    id_column: &str,
    date_column: &str,
) -> Result<(DataFrame, EnrichmentReport)> {
    let ids = df
        .column(id_column)
        .map_err(|_| PrepError::ColumnNotFound(id_column.to_string()))?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let ids = ids.str()?;

    let existing: Vec<Option<String>> = match df.column(date_column) {
        Ok(column) => column
            .as_materialized_series()
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.filter(|d| !d.trim().is_empty()).map(str::to_string))
            .collect(),
        Err(_) => vec![None; df.height()],
    };

    let mut report = EnrichmentReport {
        catalogue: catalogue.name().to_string(),
        ..Default::default()
    };
    let mut cache: HashMap<String, Option<String>> = HashMap::new();
    let mut dates: Vec<Option<String>> = Vec::with_capacity(existing.len());

    for (current, id) in existing.into_iter().zip(ids.into_iter()) {
        if current.is_some() {
            dates.push(current);
            continue;
        }

        let filled = match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => cache
                .entry(id.to_string())
                .or_insert_with(|| {
                    report.looked_up += 1;
                    let found = lookup_release_date(catalogue, id).into_option();
                    if found.is_some() {
                        report.found += 1;
                    } else {
                        report.unknown += 1;
                    }
                    found
                })
                .clone(),
            None => None,
        };
        dates.push(filled);
    }

    let mut out = df.clone();
    out.with_column(Series::new(date_column.into(), dates))?;

    info!(
        "Release-date enrichment via {}: {} looked up, {} found, {} unknown",
        report.catalogue, report.looked_up, report.found, report.unknown
    );
    Ok((out, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCatalogue {
        dates: HashMap<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl FixedCatalogue {
        fn new(entries: &[(&'static str, &'static str)]) -> Self {
            Self {
                dates: entries.iter().copied().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CatalogueLookup for FixedCatalogue {
        fn release_date(&self, track_id: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.dates
                .get(track_id)
                .map(|d| d.to_string())
                .ok_or_else(|| anyhow!("404 for {}", track_id))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_lookup_applies_year_rule() {
        let catalogue = FixedCatalogue::new(&[("a", "1999"), ("b", "2001-05-01"), ("c", " ")]);
        assert_eq!(
            lookup_release_date(&catalogue, "a"),
            ReleaseDateLookup::Found("1999-01-01".to_string())
        );
        assert_eq!(
            lookup_release_date(&catalogue, "b"),
            ReleaseDateLookup::Found("2001-05-01".to_string())
        );
        assert_eq!(lookup_release_date(&catalogue, "c"), ReleaseDateLookup::Unknown);
    }

    #[test]
    fn test_lookup_failure_is_unknown() {
        let catalogue = FixedCatalogue::new(&[]);
        assert_eq!(lookup_release_date(&catalogue, "zzz"), ReleaseDateLookup::Unknown);
    }

    #[test]
    fn test_enrich_fills_only_missing_dates() {
        let df = df! {
            "track_id" => &[Some("a"), Some("b"), Some("x"), Some("a"), None],
            "track_album_release_date" => &[None, Some("2010-02-02"), None, None, None],
        }
        .unwrap();
        let catalogue = FixedCatalogue::new(&[("a", "1999"), ("b", "1970-01-01")]);

        let (out, report) =
            enrich_release_dates(&df, &catalogue, "track_id", "track_album_release_date").unwrap();

        let dates: Vec<Option<&str>> = out
            .column("track_album_release_date")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            dates,
            vec![Some("1999-01-01"), Some("2010-02-02"), None, Some("1999-01-01"), None]
        );
        assert_eq!(report.looked_up, 2);
        assert_eq!(report.found, 1);
        assert_eq!(report.unknown, 1);
        assert_eq!(catalogue.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_enrich_creates_missing_date_column() {
        let df = df! { "track_id" => &["a"] }.unwrap();
        let catalogue = FixedCatalogue::new(&[("a", "2020-03-03")]);
        let (out, _) = enrich_release_dates(&df, &catalogue, "track_id", "release").unwrap();
        assert!(out.column("release").is_ok());
    }

    #[test]
    fn test_enrich_without_id_column_fails() {
        let df = df! { "name" => &["a"] }.unwrap();
        let catalogue = FixedCatalogue::new(&[]);
        let err = enrich_release_dates(&df, &catalogue, "track_id", "release").unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }
}
