//! Declared column schema for track tables.
//!
//! Sources are read with every column as text. [`conform`] then converts each
//! declared column to its kind and bounds; a value that does not fit becomes
//! null, which the exhaustive missing-value drop in the cleaning stage turns
//! into a rejected row.

mod converters;

use crate::config::PrepConfig;
use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Semantic kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Float,
    Integer,
    Boolean,
    /// Discrete labels. Stored as strings.
    Categorical,
}

impl ColumnKind {
    /// Polars dtype a conformed column of this kind has.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Text | Self::Categorical => DataType::String,
            Self::Float => DataType::Float64,
            Self::Integer => DataType::Int64,
            Self::Boolean => DataType::Boolean,
        }
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Categorical => "categorical",
        };
        write!(f, "{}", name)
    }
}

/// Kind and inclusive bounds of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            min: None,
            max: None,
        }
    }

    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }
}

const UNIT_DESCRIPTORS: [&str; 7] = [
    "danceability",
    "energy",
    "valence",
    "acousticness",
    "instrumentalness",
    "liveness",
    "speechiness",
];

/// Statically declared schema of a track table.
///
/// Columns not listed are treated as [`ColumnKind::Text`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackSchema {
    columns: Vec<ColumnSpec>,
}

impl TrackSchema {
    /// Schema of a reconciled, renamed source table.
    pub fn source() -> Self {
        let mut columns: Vec<ColumnSpec> = UNIT_DESCRIPTORS
            .iter()
            .map(|name| ColumnSpec::new(*name, ColumnKind::Float).bounded(0.0, 1.0))
            .collect();

        columns.extend([
            ColumnSpec::new("loudness", ColumnKind::Float),
            ColumnSpec::new("tempo", ColumnKind::Float).at_least(0.0),
            ColumnSpec::new("duration_ms", ColumnKind::Integer).at_least(1.0),
            ColumnSpec::new("key", ColumnKind::Integer).bounded(0.0, 11.0),
            ColumnSpec::new("mode", ColumnKind::Integer).bounded(0.0, 1.0),
            ColumnSpec::new("time_signature", ColumnKind::Integer).bounded(0.0, 12.0),
            ColumnSpec::new("explicit", ColumnKind::Boolean),
            ColumnSpec::new("track_popularity", ColumnKind::Float).bounded(0.0, 100.0),
        ]);

        Self { columns }
    }

    /// Schema of the table produced by the full pipeline.
    pub fn prepared(config: &PrepConfig) -> Self {
        let mut schema = Self::source();
        for name in ["key", "mode"] {
            schema.set(ColumnSpec::new(name, ColumnKind::Categorical));
        }
        for name in ["release_year", "release_month", "release_day"] {
            schema.set(ColumnSpec::new(name, ColumnKind::Integer).at_least(0.0));
        }
        schema.set(ColumnSpec::new(config.label_column.clone(), ColumnKind::Integer).bounded(0.0, 1.0));
        schema.set(ColumnSpec::new("duration_minutes", ColumnKind::Float).at_least(0.0));
        schema.set(ColumnSpec::new("duration_bin", ColumnKind::Integer).at_least(0.0));
        schema.set(ColumnSpec::new("popularity_category", ColumnKind::Categorical));
        schema
    }

    /// Add or replace a column spec.
    pub fn set(&mut self, spec: ColumnSpec) {
        match self.columns.iter_mut().find(|c| c.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.columns.push(spec),
        }
    }

    pub fn spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn kind_of(&self, name: &str) -> ColumnKind {
        self.spec(name).map(|c| c.kind).unwrap_or(ColumnKind::Text)
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }
}

/// Outcome of conforming a table to a schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConformReport {
    /// Values per column that did not fit their declared kind or bounds.
    pub rejected_values: BTreeMap<String, usize>,
}

impl ConformReport {
    pub fn total_rejected(&self) -> usize {
        self.rejected_values.values().sum()
    }
}

/// Convert every text column of `df` to its declared kind.
///
/// Columns that are already typed are left alone.
pub fn conform(df: &DataFrame, schema: &TrackSchema) -> Result<(DataFrame, ConformReport)> {
    let mut out = df.clone();
    let mut report = ConformReport::default();

    for column in df.get_columns() {
        if column.dtype() != &DataType::String {
            continue;
        }

        let name = column.name().to_string();
        let series = column.as_materialized_series();
        let converted = match schema.spec(&name) {
            Some(spec) => match spec.kind {
                ColumnKind::Float => converters::string_to_float(series, spec.min, spec.max),
                ColumnKind::Integer => converters::string_to_integer(series, spec.min, spec.max),
                ColumnKind::Boolean => converters::string_to_boolean(series),
                ColumnKind::Text | ColumnKind::Categorical => converters::trim_text(series),
            },
            None => converters::trim_text(series),
        }
        .map_err(|e| crate::error::PrepError::InvalidValue {
            column: name.clone(),
            reason: e.to_string(),
        })?;

        if converted.rejected > 0 {
            warn!(
                "Column '{}': {} value(s) do not conform to {} and were cleared",
                name,
                converted.rejected,
                schema.kind_of(&name)
            );
            report.rejected_values.insert(name.clone(), converted.rejected);
        }

        out.with_column(converted.series)?;
    }

    debug!(
        "Conformed {} columns, {} value(s) rejected",
        out.width(),
        report.total_rejected()
    );

    Ok((out, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlisted_columns_are_text() {
        let schema = TrackSchema::source();
        assert_eq!(schema.kind_of("track_name"), ColumnKind::Text);
        assert_eq!(schema.kind_of("energy"), ColumnKind::Float);
        assert_eq!(schema.kind_of("explicit"), ColumnKind::Boolean);
    }

    #[test]
    fn test_prepared_schema_overrides_key_and_mode() {
        let schema = TrackSchema::prepared(&PrepConfig::default());
        assert_eq!(schema.kind_of("key"), ColumnKind::Categorical);
        assert_eq!(schema.kind_of("mode"), ColumnKind::Categorical);
        assert_eq!(schema.kind_of("release_year"), ColumnKind::Integer);
        assert_eq!(schema.kind_of("popularity"), ColumnKind::Integer);
        assert_eq!(schema.kind_of("popularity_category"), ColumnKind::Categorical);
        assert_eq!(ColumnKind::Categorical.dtype(), DataType::String);
    }

    #[test]
    fn test_conform_clears_nonconforming_values() {
        let df = df! {
            "energy" => &[Some("0.5"), Some("1.7"), Some("0.2")],
            "key" => &[Some("5"), Some("11"), Some("13")],
            "track_name" => &[Some(" Song "), Some("Other"), Some("")],
        }
        .unwrap();

        let (conformed, report) = conform(&df, &TrackSchema::source()).unwrap();

        let energy: Vec<Option<f64>> = conformed
            .column("energy")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(energy, vec![Some(0.5), None, Some(0.2)]);

        let key: Vec<Option<i64>> = conformed
            .column("key")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(key, vec![Some(5), Some(11), None]);

        let names: Vec<Option<&str>> = conformed
            .column("track_name")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(names, vec![Some("Song"), Some("Other"), None]);

        assert_eq!(report.rejected_values.get("energy"), Some(&1));
        assert_eq!(report.rejected_values.get("key"), Some(&1));
        assert_eq!(report.total_rejected(), 3);
    }
}
