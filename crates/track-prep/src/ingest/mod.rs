//! Ingestion and reconciliation of raw track sources.
//!
//! Sources are loaded as all-text tables, tagged with their provenance label
//! (split layout), projected onto a common column set by name, renamed onto
//! the canonical column names and finally conformed to [`TrackSchema`].
//! Any failure here is fatal: there is no partial load.

use crate::config::{ColumnRename, PrepConfig, SourceLayout};
use crate::error::{PrepError, Result};
use crate::schema::{self, ConformReport, TrackSchema};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Label given to rows of the high-popularity source.
pub const HIGH_POPULARITY_LABEL: i64 = 1;

/// Label given to rows of the low-popularity source.
pub const LOW_POPULARITY_LABEL: i64 = 0;

/// Raw source tables, already in memory.
#[derive(Debug, Clone)]
pub enum SourceTables {
    Split { high: DataFrame, low: DataFrame },
    Single(DataFrame),
}

/// Row count of one loaded source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRows {
    pub source: String,
    pub rows: usize,
}

/// Reconciled, renamed and conformed table plus what happened on the way.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub table: DataFrame,
    pub rows_per_source: Vec<SourceRows>,
    /// Columns of the second source that the first does not have.
    pub projected_away: Vec<String>,
    pub conform: ConformReport,
}

/// Read one comma-delimited file with a header row, every column as text.
pub fn load_source(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(PrepError::SourceLoad {
            path: path.display().to_string(),
            reason: "file does not exist".to_string(),
        });
    }

    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(0))
        .with_has_header(true)
        .with_parse_options(
            CsvParseOptions::default()
                .with_quote_char(Some(b'"'))
                .with_missing_is_null(true),
        )
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))
        .and_then(|reader| reader.finish())
        .map_err(|e| PrepError::SourceLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    if df.width() == 0 {
        return Err(PrepError::SourceLoad {
            path: path.display().to_string(),
            reason: "no columns found".to_string(),
        });
    }

    info!(
        "Loaded '{}': {} rows x {} columns",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

/// Load the sources named by the configured layout.
pub fn load_sources(layout: &SourceLayout) -> Result<SourceTables> {
    match layout {
        SourceLayout::Split { high, low } => Ok(SourceTables::Split {
            high: load_source(high)?,
            low: load_source(low)?,
        }),
        SourceLayout::Single { path } => Ok(SourceTables::Single(load_source(path)?)),
    }
}

/// Append a constant provenance label column.
pub fn tag_source(df: &DataFrame, label_column: &str, label: i64) -> Result<DataFrame> {
    let mut tagged = df.clone();
    let labels = Series::new(label_column.into(), vec![label; df.height()]);
    tagged.with_column(labels)?;
    Ok(tagged)
}

/// Select `target` columns from `df` by name and in `target` order.
///
/// Returns the projected table and the columns of `df` that were left out.
/// Fails with [`PrepError::SchemaMismatch`] if any target column is absent.
pub fn project_onto(df: &DataFrame, target: &[PlSmallStr]) -> Result<(DataFrame, Vec<String>)> {
    let present = df.get_column_names();
    let missing: Vec<String> = target
        .iter()
        .filter(|name| !present.contains(name))
        .map(|name| name.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(PrepError::SchemaMismatch { missing });
    }

    let extra: Vec<String> = present
        .into_iter()
        .filter(|name| !target.contains(*name))
        .map(|name| name.to_string())
        .collect();

    let projected = df.select(target.to_vec())?;
    Ok((projected, extra))
}

/// Tag both split sources and concatenate them row-wise, low after high.
pub fn reconcile(
    high: &DataFrame,
    low: &DataFrame,
    label_column: &str,
) -> Result<(DataFrame, Vec<String>)> {
    let high = tag_source(high, label_column, HIGH_POPULARITY_LABEL)?;
    let low = tag_source(low, label_column, LOW_POPULARITY_LABEL)?;

    let target: Vec<PlSmallStr> = high.get_column_names().into_iter().cloned().collect();
    let (low, projected_away) = project_onto(&low, &target)?;

    if !projected_away.is_empty() {
        warn!(
            "Dropping {} column(s) only present in the low-popularity source: {:?}",
            projected_away.len(),
            projected_away
        );
    }

    let merged = high.vstack(&low)?;
    debug!(
        "Reconciled {} + {} rows into {}",
        high.height(),
        low.height(),
        merged.height()
    );
    Ok((merged, projected_away))
}

/// Apply source-to-canonical renames. Renames whose source column is absent
/// are skipped.
pub fn apply_renames(df: &DataFrame, renames: &[ColumnRename]) -> Result<DataFrame> {
    let mut renamed = df.clone();
    for rename in renames {
        if renamed.column(&rename.from).is_err() {
            debug!("Rename '{}' -> '{}' skipped: column absent", rename.from, rename.to);
            continue;
        }
        renamed.rename(&rename.from, rename.to.as_str().into())?;
    }
    Ok(renamed)
}

/// Fail loudly when any required column is absent.
pub fn require_columns(df: &DataFrame, required: &[String]) -> Result<()> {
    let present = df.get_column_names();
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !present.iter().any(|p| p.as_str() == name.as_str()))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PrepError::SchemaMismatch { missing })
    }
}

/// Reconcile, rename, validate and conform in-memory source tables.
pub fn ingest_tables(tables: SourceTables, config: &PrepConfig) -> Result<Ingested> {
    let (merged, rows_per_source, projected_away) = match tables {
        SourceTables::Split { high, low } => {
            let rows = vec![
                SourceRows {
                    source: "high".to_string(),
                    rows: high.height(),
                },
                SourceRows {
                    source: "low".to_string(),
                    rows: low.height(),
                },
            ];
            let (merged, extra) = reconcile(&high, &low, &config.label_column)?;
            (merged, rows, extra)
        }
        SourceTables::Single(df) => {
            let rows = vec![SourceRows {
                source: "single".to_string(),
                rows: df.height(),
            }];
            (df, rows, Vec::new())
        }
    };

    let renamed = apply_renames(&merged, &config.renames())?;
    require_columns(&renamed, &config.required_columns)?;

    let (table, conform) = schema::conform(&renamed, &TrackSchema::source())?;

    info!(
        "Ingested {} rows x {} columns ({} layout)",
        table.height(),
        table.width(),
        config.layout.name()
    );

    Ok(Ingested {
        table,
        rows_per_source,
        projected_away,
        conform,
    })
}

/// Load the configured sources and ingest them.
pub fn ingest(config: &PrepConfig) -> Result<Ingested> {
    let tables = load_sources(&config.layout)?;
    ingest_tables(tables, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(df: &DataFrame) -> Vec<String> {
        df.get_column_names().iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_project_onto_uses_target_order() {
        let df = df! {
            "b" => &["1", "2"],
            "extra" => &["x", "y"],
            "a" => &["3", "4"],
        }
        .unwrap();

        let (projected, extra) = project_onto(&df, &[PlSmallStr::from("a"), PlSmallStr::from("b")]).unwrap();
        assert_eq!(names(&projected), vec!["a", "b"]);
        assert_eq!(extra, vec!["extra".to_string()]);
    }

    #[test]
    fn test_project_onto_missing_column_is_schema_mismatch() {
        let df = df! { "a" => &["1"] }.unwrap();
        let err = project_onto(&df, &[PlSmallStr::from("a"), PlSmallStr::from("key")]).unwrap_err();
        match err {
            PrepError::SchemaMismatch { missing } => assert_eq!(missing, vec!["key".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reconcile_tags_and_keeps_all_rows() {
        let high = df! { "name" => &["h1", "h2"], "genre" => &["pop", "rock"] }.unwrap();
        let low = df! { "genre" => &["jazz"], "name" => &["l1"], "subgenre" => &["bebop"] }.unwrap();

        let (merged, extra) = reconcile(&high, &low, "popularity").unwrap();

        assert_eq!(merged.height(), 3);
        assert_eq!(names(&merged), vec!["name", "genre", "popularity"]);
        assert_eq!(extra, vec!["subgenre".to_string()]);

        let labels: Vec<Option<i64>> = merged
            .column("popularity")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(labels, vec![Some(1), Some(1), Some(0)]);

        let names_col: Vec<Option<&str>> = merged
            .column("name")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(names_col, vec![Some("h1"), Some("h2"), Some("l1")]);
    }

    #[test]
    fn test_apply_renames_skips_absent_columns() {
        let df = df! { "popularity" => &["50"], "artists" => &["A"] }.unwrap();
        let renames = vec![
            ColumnRename::new("popularity", "track_popularity"),
            ColumnRename::new("artists", "track_artist"),
            ColumnRename::new("genre", "track_genre"),
        ];
        let renamed = apply_renames(&df, &renames).unwrap();
        assert_eq!(names(&renamed), vec!["track_popularity", "track_artist"]);
    }

    #[test]
    fn test_require_columns_lists_every_missing_column() {
        let df = df! { "energy" => &["0.1"] }.unwrap();
        let required = vec!["energy".to_string(), "key".to_string(), "mode".to_string()];
        let err = require_columns(&df, &required).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        assert!(err.to_string().contains("key"));
        assert!(err.to_string().contains("mode"));
    }

    #[test]
    fn test_load_source_missing_file_is_fatal() {
        let err = load_source(Path::new("does/not/exist.csv")).unwrap_err();
        assert_eq!(err.error_code(), "SOURCE_LOAD_FAILED");
        assert!(err.is_fatal());
    }
}
