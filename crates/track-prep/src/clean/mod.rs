//! Cleaning stage: removes invalid rows, derives calendar fields from the
//! release-date string and drops identifier columns.
//!
//! Steps run in a fixed order:
//!
//! 1. drop every row with any missing value
//! 2. drop duplicate rows, keeping the first occurrence
//! 3. normalize and parse the release date (sentinel on failure)
//! 4. derive `release_year` / `release_month` / `release_day`
//! 5. drop identifier columns
//!
//! Running [`clean`] on its own output changes nothing.

mod dates;

pub use dates::{DATE_SENTINEL, normalize_release_date, parse_release_date};

use crate::config::PrepConfig;
use crate::error::Result;
use chrono::Datelike;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Names of the derived calendar columns.
pub const RELEASE_YEAR: &str = "release_year";
pub const RELEASE_MONTH: &str = "release_month";
pub const RELEASE_DAY: &str = "release_day";

/// What the cleaning stage did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub incomplete_rows_dropped: usize,
    /// Rows equal to an earlier row on every column except the identifier
    /// columns. Rows that differ only in an identifier (`track_id`, `index`,
    /// ...) count as duplicates, so this is not an exact-row comparison.
    pub duplicates_removed: usize,
    /// `None` when the table has no release-date column.
    pub unparseable_dates: Option<usize>,
    pub dropped_columns: Vec<String>,
    pub actions: Vec<String>,
}

/// Drop every row that has a missing value in any column.
pub fn drop_incomplete(df: &DataFrame) -> Result<DataFrame> {
    Ok(df.drop_nulls::<String>(None)?)
}

/// Drop duplicate rows keeping the first occurrence, in original order.
///
/// Two rows are duplicates when they agree on every column except those in
/// `ignore`. Returns the deduplicated table and the number of rows removed.
pub fn drop_duplicates(df: &DataFrame, ignore: &[String]) -> Result<(DataFrame, usize)> {
    if df.height() == 0 {
        return Ok((df.clone(), 0));
    }

    let mut key_columns: Vec<Series> = df
        .get_columns()
        .iter()
        .filter(|c| !ignore.iter().any(|i| i.as_str() == c.name().as_str()))
        .map(|c| c.as_materialized_series().cast(&DataType::String))
        .collect::<PolarsResult<_>>()?;

    if key_columns.is_empty() {
        key_columns = df
            .get_columns()
            .iter()
            .map(|c| c.as_materialized_series().cast(&DataType::String))
            .collect::<PolarsResult<_>>()?;
    }

    let mut row_keys: Vec<String> = vec![String::new(); df.height()];
    for series in &key_columns {
        for (idx, value) in series.str()?.into_iter().enumerate() {
            let key = &mut row_keys[idx];
            key.push_str(value.unwrap_or("\u{0}"));
            key.push('\u{1f}');
        }
    }

    let mut seen: HashSet<String> = HashSet::with_capacity(row_keys.len());
    let keep: Vec<bool> = row_keys.into_iter().map(|k| seen.insert(k)).collect();
    let removed = keep.iter().filter(|k| !**k).count();

    if removed == 0 {
        return Ok((df.clone(), 0));
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    Ok((df.filter(&mask)?, removed))
}

/// Rewrite the release-date column and append the calendar fields.
///
/// Parseable dates keep their normalized string; the rest become
/// [`DATE_SENTINEL`] with year, month and day all 0. Returns the number of
/// unparseable dates.
pub fn derive_release_fields(
    df: &DataFrame,
    date_column: &str,
    format: &str,
) -> Result<(DataFrame, usize)> {
    let raw = df
        .column(date_column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let raw = raw.str()?;

    let mut dates: Vec<String> = Vec::with_capacity(raw.len());
    let mut years: Vec<i64> = Vec::with_capacity(raw.len());
    let mut months: Vec<i64> = Vec::with_capacity(raw.len());
    let mut days: Vec<i64> = Vec::with_capacity(raw.len());
    let mut unparseable = 0;

    for value in raw.into_iter() {
        let normalized = value.map(normalize_release_date);
        let parsed = normalized
            .as_deref()
            .and_then(|v| parse_release_date(v, format));

        match parsed {
            Some(date) => {
                dates.push(normalized.unwrap_or_default());
                years.push(date.year() as i64);
                months.push(date.month() as i64);
                days.push(date.day() as i64);
            }
            None => {
                unparseable += 1;
                dates.push(DATE_SENTINEL.to_string());
                years.push(0);
                months.push(0);
                days.push(0);
            }
        }
    }

    let mut out = df.clone();
    out.with_column(Series::new(date_column.into(), dates))?;
    out.with_column(Series::new(RELEASE_YEAR.into(), years))?;
    out.with_column(Series::new(RELEASE_MONTH.into(), months))?;
    out.with_column(Series::new(RELEASE_DAY.into(), days))?;

    Ok((out, unparseable))
}

/// Drop whichever of `columns` are present.
pub fn drop_identifier_columns(df: &DataFrame, columns: &[String]) -> (DataFrame, Vec<String>) {
    let present: Vec<String> = columns
        .iter()
        .filter(|c| df.column(c.as_str()).is_ok())
        .cloned()
        .collect();

    if present.is_empty() {
        return (df.clone(), present);
    }

    let names: Vec<PlSmallStr> = present.iter().map(|c| c.as_str().into()).collect();
    (df.drop_many(names), present)
}

/// Run the full cleaning stage.
pub fn clean(df: &DataFrame, config: &PrepConfig) -> Result<(DataFrame, CleaningReport)> {
    let identifiers = config.identifier_columns();
    let mut report = CleaningReport {
        rows_in: df.height(),
        ..Default::default()
    };

    let complete = drop_incomplete(df)?;
    report.incomplete_rows_dropped = df.height() - complete.height();
    if report.incomplete_rows_dropped > 0 {
        report.actions.push(format!(
            "Dropped {} row(s) with missing values",
            report.incomplete_rows_dropped
        ));
    }

    let (unique, duplicates) = drop_duplicates(&complete, &identifiers)?;
    report.duplicates_removed = duplicates;
    if duplicates > 0 {
        report.actions.push(format!(
            "Removed {} duplicate row(s), identifier columns ignored",
            duplicates
        ));
    }

    let dated = if unique.column(&config.release_date_column).is_ok() {
        let (dated, unparseable) =
            derive_release_fields(&unique, &config.release_date_column, &config.date_format)?;
        report.unparseable_dates = Some(unparseable);
        report.actions.push(format!(
            "Derived release year/month/day from '{}' ({} unparseable)",
            config.release_date_column, unparseable
        ));
        dated
    } else {
        info!(
            "No '{}' column, skipping release date derivation",
            config.release_date_column
        );
        unique
    };

    let (cleaned, dropped) = drop_identifier_columns(&dated, &identifiers);
    if !dropped.is_empty() {
        report
            .actions
            .push(format!("Dropped identifier columns: {}", dropped.join(", ")));
    }
    report.dropped_columns = dropped;

    debug!("Cleaning actions: {:?}", report.actions);
    info!(
        "Cleaning complete: {} -> {} rows, {} columns",
        report.rows_in,
        cleaned.height(),
        cleaned.width()
    );

    Ok((cleaned, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df! {
            "track_id" => &[Some("a"), Some("b"), Some("c"), Some("d"), Some("e")],
            "track_name" => &[Some("One"), Some("One"), Some("Two"), None, Some("Three")],
            "energy" => &[Some(0.5), Some(0.5), Some(0.7), Some(0.1), Some(0.9)],
            "track_album_release_date" => &[
                Some("2019-11-29"),
                Some("2019-11-29"),
                Some("1999"),
                Some("2001-01-01"),
                Some("March 2001"),
            ],
        }
        .unwrap()
    }

    fn config() -> PrepConfig {
        PrepConfig::builder()
            .split("h.csv", "l.csv")
            .identifier_columns(["track_id"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_drop_incomplete() {
        let out = drop_incomplete(&sample()).unwrap();
        assert_eq!(out.height(), 4);
        assert!(out.get_columns().iter().all(|c| c.null_count() == 0));
    }

    #[test]
    fn test_drop_duplicates_keeps_first_in_order() {
        let df = df! {
            "name" => &["x", "y", "x", "z", "y"],
            "n" => &[1i64, 2, 1, 3, 2],
        }
        .unwrap();

        let (out, removed) = drop_duplicates(&df, &[]).unwrap();
        assert_eq!(removed, 2);
        let names: Vec<Option<&str>> = out.column("name").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(names, vec![Some("x"), Some("y"), Some("z")]);
    }

    #[test]
    fn test_drop_duplicates_ignores_identifier_columns() {
        let (out, removed) = drop_duplicates(&sample(), &["track_id".to_string()]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(out.height(), 4);

        let (_, removed) = drop_duplicates(&sample(), &[]).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_derive_release_fields_sentinel() {
        let df = sample();
        let (out, unparseable) =
            derive_release_fields(&df, "track_album_release_date", "%Y-%m-%d").unwrap();

        assert_eq!(unparseable, 1);
        let years: Vec<Option<i64>> = out.column(RELEASE_YEAR).unwrap().i64().unwrap().into_iter().collect();
        let months: Vec<Option<i64>> = out.column(RELEASE_MONTH).unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(years, vec![Some(2019), Some(2019), Some(1999), Some(2001), Some(0)]);
        assert_eq!(months, vec![Some(11), Some(11), Some(1), Some(1), Some(0)]);

        let dates: Vec<Option<&str>> = out
            .column("track_album_release_date")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(dates[2], Some("1999-01-01"));
        assert_eq!(dates[4], Some(DATE_SENTINEL));
    }

    #[test]
    fn test_clean_order_and_report() {
        let (out, report) = clean(&sample(), &config()).unwrap();

        assert_eq!(report.rows_in, 5);
        assert_eq!(report.incomplete_rows_dropped, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.unparseable_dates, Some(1));
        assert_eq!(report.dropped_columns, vec!["track_id".to_string()]);

        assert_eq!(out.height(), 3);
        assert!(out.column("track_id").is_err());
        assert!(out.column(RELEASE_DAY).is_ok());
    }

    #[test]
    fn test_duplicates_differing_only_in_identifiers() {
        // Rows "a" and "b" differ only in track_id
        let (out, report) = clean(&sample(), &config()).unwrap();
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(out.height(), 3);

        let keep_ids = PrepConfig::builder()
            .split("h.csv", "l.csv")
            .identifier_columns(std::iter::empty::<&str>())
            .build()
            .unwrap();
        let (out, report) = clean(&sample(), &keep_ids).unwrap();
        assert_eq!(report.duplicates_removed, 0);
        assert_eq!(out.height(), 4);
        assert!(out.column("track_id").is_ok());
    }

    #[test]
    fn test_clean_is_idempotent() {
        let (once, _) = clean(&sample(), &config()).unwrap();
        let (twice, report) = clean(&once, &config()).unwrap();

        assert!(once.equals(&twice));
        assert_eq!(report.incomplete_rows_dropped, 0);
        assert_eq!(report.duplicates_removed, 0);
        assert!(report.dropped_columns.is_empty());
    }

    #[test]
    fn test_clean_without_date_column_skips_derivation() {
        let df = df! { "index" => &["0", "1"], "track_name" => &["a", "b"] }.unwrap();
        let config = PrepConfig::single("tracks.csv");
        let (out, report) = clean(&df, &config).unwrap();

        assert_eq!(report.unparseable_dates, None);
        assert!(out.column(RELEASE_YEAR).is_err());
        assert_eq!(report.dropped_columns, vec!["index".to_string()]);
    }
}
