use crate::catalogue::EnrichmentReport;
use crate::ingest::SourceRows;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Human-readable summary of one pipeline run.
///
/// Serialized into the run report and printed by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrepSummary {
    /// Total execution time in milliseconds.
    pub duration_ms: u64,

    /// `"split"` or `"single"`.
    pub layout: String,
    /// Rows read from each source, in load order.
    pub rows_per_source: Vec<SourceRows>,
    /// Rows in the reconciled table.
    pub rows_loaded: usize,
    /// Values per column cleared at the ingestion boundary.
    pub rejected_values: BTreeMap<String, usize>,
    /// Columns of the second source not present in the first.
    pub projected_away: Vec<String>,

    /// Present when release dates were looked up in a catalogue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentReport>,

    pub incomplete_rows_dropped: usize,
    pub duplicates_removed: usize,
    /// `None` when the sources carry no release date.
    pub unparseable_dates: Option<usize>,
    pub dropped_columns: Vec<String>,

    pub rows_after: usize,
    pub columns_after: usize,

    pub actions: Vec<String>,
    pub warnings: Vec<String>,
}

impl PrepSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn rows_removed(&self) -> usize {
        self.rows_loaded.saturating_sub(self.rows_after)
    }

    /// Percentage of reconciled rows that did not survive cleaning.
    pub fn rows_removed_percentage(&self) -> f32 {
        if self.rows_loaded == 0 {
            0.0
        } else {
            (self.rows_removed() as f32 / self.rows_loaded as f32) * 100.0
        }
    }
}

/// The canonical prepared table together with how it was produced.
///
/// Immutable once built; a reload produces a new value.
#[derive(Debug, Clone)]
pub struct PreparedTracks {
    pub table: DataFrame,
    pub summary: PrepSummary,
}

impl PreparedTracks {
    pub fn height(&self) -> usize {
        self.table.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.table
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect()
    }
}

static_assertions::assert_impl_all!(PreparedTracks: Send, Sync);
