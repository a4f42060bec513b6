//! Configuration types for the track preparation pipeline.
//!
//! Everything the stages used to read from hardcoded globals lives here:
//! source paths, identifier columns to drop, the release-date format,
//! popularity band edges and labels, and the column rename map. Each stage
//! receives a `&PrepConfig`, so the pipeline is a pure function of
//! `(tables, config)`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Column holding the album release date string.
pub const RELEASE_DATE_COLUMN: &str = "track_album_release_date";

/// Catalogue track id, the key for release-date lookups.
pub const TRACK_ID_COLUMN: &str = "track_id";

/// Column holding the continuous 0-100 popularity score.
pub const POPULARITY_SCORE_COLUMN: &str = "track_popularity";

/// Column holding the high/low source provenance label.
pub const SOURCE_LABEL_COLUMN: &str = "popularity";

/// Release dates are parsed with this format unless configured otherwise.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Width of a duration bucket in seconds.
pub const DEFAULT_DURATION_BIN_SECONDS: u32 = 15;

/// Identifier and URL columns of the split high/low popularity exports.
const SPLIT_IDENTIFIER_COLUMNS: [&str; 8] = [
    "track_id",
    "track_album_id",
    "playlist_id",
    "id",
    "track_href",
    "analysis_url",
    "uri",
    "type",
];

/// The pre-merged export only carries a positional index column.
const SINGLE_IDENTIFIER_COLUMNS: [&str; 1] = ["index"];

/// Columns every dashboard view relies on after reconciliation.
pub const DASHBOARD_COLUMNS: [&str; 18] = [
    "track_popularity",
    "track_artist",
    "track_genre",
    "track_name",
    "duration_ms",
    "key",
    "mode",
    "time_signature",
    "explicit",
    "valence",
    "energy",
    "acousticness",
    "danceability",
    "loudness",
    "speechiness",
    "liveness",
    "tempo",
    "instrumentalness",
];

/// Where the raw track records come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLayout {
    /// Two exports, one of high-popularity and one of low-popularity tracks.
    /// Rows are tagged with a provenance label before they are merged.
    Split { high: PathBuf, low: PathBuf },
    /// One pre-merged export using the `popularity`/`artists` naming.
    Single { path: PathBuf },
}

impl Default for SourceLayout {
    fn default() -> Self {
        SourceLayout::Single {
            path: PathBuf::from("dataset/dataset_spotify.csv"),
        }
    }
}

impl SourceLayout {
    /// Source files in load order.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::Split { high, low } => vec![high.as_path(), low.as_path()],
            Self::Single { path } => vec![path.as_path()],
        }
    }

    /// Short name used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Split { .. } => "split",
            Self::Single { .. } => "single",
        }
    }

    /// Identifier columns dropped during cleaning for this layout.
    pub fn default_identifier_columns(&self) -> Vec<String> {
        let columns: &[&str] = match self {
            Self::Split { .. } => &SPLIT_IDENTIFIER_COLUMNS,
            Self::Single { .. } => &SINGLE_IDENTIFIER_COLUMNS,
        };
        columns.iter().map(|c| c.to_string()).collect()
    }

    /// Renames that bring this layout onto the canonical column names.
    pub fn default_renames(&self) -> Vec<ColumnRename> {
        match self {
            Self::Split { .. } => Vec::new(),
            Self::Single { .. } => vec![
                ColumnRename::new("popularity", POPULARITY_SCORE_COLUMN),
                ColumnRename::new("artists", "track_artist"),
            ],
        }
    }
}

/// A single source-to-canonical column rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub from: String,
    pub to: String,
}

impl ColumnRename {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Ordered popularity bands with inclusive upper edges.
///
/// A score `s` belongs to the first band whose edge is `>= s`. Scores below
/// zero, above the last edge, or non-finite belong to no band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularityBands {
    pub upper_edges: Vec<f64>,
    pub labels: Vec<String>,
}

impl Default for PopularityBands {
    fn default() -> Self {
        Self {
            upper_edges: vec![20.0, 40.0, 60.0, 80.0, 100.0],
            labels: ["Very Low", "Low", "Medium", "High", "Very High"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
        }
    }
}

impl PopularityBands {
    /// Index of the band containing `score`, lowest band first.
    pub fn band_index(&self, score: f64) -> Option<usize> {
        if !score.is_finite() || score < 0.0 {
            return None;
        }
        self.upper_edges.iter().position(|edge| score <= *edge)
    }

    /// Label of the band containing `score`.
    pub fn classify(&self, score: f64) -> Option<&str> {
        self.band_index(score).map(|idx| self.labels[idx].as_str())
    }

    /// Position of `label` in band order, lowest band first.
    ///
    /// `popularity_category` is stored as text, so sorting it directly is
    /// alphabetical. Sort by this rank to get band order.
    pub fn rank(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Largest score covered by the bands.
    pub fn max_score(&self) -> f64 {
        self.upper_edges.last().copied().unwrap_or(0.0)
    }

    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.upper_edges.is_empty() {
            return Err(ConfigValidationError::InvalidBands(
                "at least one band is required".to_string(),
            ));
        }
        if self.upper_edges.len() != self.labels.len() {
            return Err(ConfigValidationError::InvalidBands(format!(
                "{} edges but {} labels",
                self.upper_edges.len(),
                self.labels.len()
            )));
        }
        if self.upper_edges[0] < 0.0 || self.upper_edges.iter().any(|e| !e.is_finite()) {
            return Err(ConfigValidationError::InvalidBands(
                "edges must be finite and non-negative".to_string(),
            ));
        }
        if self.upper_edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigValidationError::InvalidBands(
                "edges must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the track preparation pipeline.
///
/// Use [`PrepConfig::split`] / [`PrepConfig::single`] for the two standard
/// layouts, or [`PrepConfig::builder()`] for full control.
///
/// # Example
///
/// ```rust,ignore
/// use track_prep::config::PrepConfig;
///
/// let config = PrepConfig::builder()
///     .split("high_popularity_spotify_data.csv", "low_popularity_spotify_data.csv")
///     .rename("playlist_genre", "track_genre")
///     .output_dir("outputs")
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    /// Source files and their layout.
    pub layout: SourceLayout,

    /// Identifier/URL columns removed during cleaning.
    /// Default: depends on the layout.
    pub identifier_columns: Option<Vec<String>>,

    /// Source-to-canonical renames applied at ingestion.
    /// Default: depends on the layout.
    pub renames: Option<Vec<ColumnRename>>,

    /// Columns that must exist after reconciliation and renaming.
    /// Default: the columns used by the dashboard views.
    pub required_columns: Vec<String>,

    /// Column holding the release date string.
    /// Default: "track_album_release_date"
    pub release_date_column: String,

    /// chrono format string for release dates.
    /// Default: "%Y-%m-%d"
    pub date_format: String,

    /// Column holding the continuous popularity score used for banding.
    /// Default: "track_popularity"
    pub popularity_column: String,

    /// Column receiving the provenance label in the split layout.
    /// Default: "popularity"
    pub label_column: String,

    /// Popularity bands.
    pub bands: PopularityBands,

    /// Width of duration buckets in seconds.
    /// Default: 15
    pub duration_bin_seconds: u32,

    /// Output directory for the prepared table and reports.
    /// Default: "outputs"
    pub output_dir: PathBuf,

    /// Output file name (without extension).
    /// Default: "tracks_prepared"
    pub output_name: String,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            layout: SourceLayout::default(),
            identifier_columns: None,
            renames: None,
            required_columns: DASHBOARD_COLUMNS.iter().map(|c| c.to_string()).collect(),
            release_date_column: RELEASE_DATE_COLUMN.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            popularity_column: POPULARITY_SCORE_COLUMN.to_string(),
            label_column: SOURCE_LABEL_COLUMN.to_string(),
            bands: PopularityBands::default(),
            duration_bin_seconds: DEFAULT_DURATION_BIN_SECONDS,
            output_dir: PathBuf::from("outputs"),
            output_name: "tracks_prepared".to_string(),
        }
    }
}

impl PrepConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PrepConfigBuilder {
        PrepConfigBuilder::default()
    }

    /// Default configuration for the high/low popularity exports.
    pub fn split(high: impl Into<PathBuf>, low: impl Into<PathBuf>) -> Self {
        Self {
            layout: SourceLayout::Split {
                high: high.into(),
                low: low.into(),
            },
            ..Self::default()
        }
    }

    /// Default configuration for a single pre-merged export.
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            layout: SourceLayout::Single { path: path.into() },
            ..Self::default()
        }
    }

    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PrepConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Identifier columns, resolved against the layout default.
    pub fn identifier_columns(&self) -> Vec<String> {
        self.identifier_columns
            .clone()
            .unwrap_or_else(|| self.layout.default_identifier_columns())
    }

    /// Rename map, resolved against the layout default.
    pub fn renames(&self) -> Vec<ColumnRename> {
        self.renames
            .clone()
            .unwrap_or_else(|| self.layout.default_renames())
    }

    /// Path of the prepared CSV inside the output directory.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.output_name))
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self
            .layout
            .paths()
            .iter()
            .any(|p| p.as_os_str().is_empty())
        {
            return Err(ConfigValidationError::EmptySourcePath);
        }

        self.bands.validate()?;

        if self.duration_bin_seconds == 0 {
            return Err(ConfigValidationError::InvalidDurationBin(
                self.duration_bin_seconds,
            ));
        }

        for (field, value) in [
            ("date_format", &self.date_format),
            ("release_date_column", &self.release_date_column),
            ("popularity_column", &self.popularity_column),
            ("label_column", &self.label_column),
            ("output_name", &self.output_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigValidationError::EmptyField(field.to_string()));
            }
        }

        if let Some(rename) = self
            .renames()
            .iter()
            .find(|r| r.from.trim().is_empty() || r.to.trim().is_empty())
        {
            return Err(ConfigValidationError::InvalidRename {
                from: rename.from.clone(),
                to: rename.to.clone(),
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Source paths must not be empty")]
    EmptySourcePath,

    #[error("Invalid popularity bands: {0}")]
    InvalidBands(String),

    #[error("Invalid duration bin width: {0} (must be at least 1 second)")]
    InvalidDurationBin(u32),

    #[error("Field '{0}' must not be empty")]
    EmptyField(String),

    #[error("Invalid rename '{from}' -> '{to}'")]
    InvalidRename { from: String, to: String },
}

/// Builder for [`PrepConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PrepConfigBuilder {
    layout: Option<SourceLayout>,
    identifier_columns: Option<Vec<String>>,
    renames: Option<Vec<ColumnRename>>,
    extra_renames: Vec<ColumnRename>,
    required_columns: Option<Vec<String>>,
    release_date_column: Option<String>,
    date_format: Option<String>,
    popularity_column: Option<String>,
    label_column: Option<String>,
    bands: Option<PopularityBands>,
    duration_bin_seconds: Option<u32>,
    output_dir: Option<PathBuf>,
    output_name: Option<String>,
}

impl PrepConfigBuilder {
    /// Set the source layout.
    pub fn layout(mut self, layout: SourceLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Use the high/low popularity exports.
    pub fn split(self, high: impl Into<PathBuf>, low: impl Into<PathBuf>) -> Self {
        self.layout(SourceLayout::Split {
            high: high.into(),
            low: low.into(),
        })
    }

    /// Use a single pre-merged export.
    pub fn single(self, path: impl Into<PathBuf>) -> Self {
        self.layout(SourceLayout::Single { path: path.into() })
    }

    /// Replace the identifier columns dropped during cleaning.
    pub fn identifier_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifier_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the whole rename map.
    pub fn renames(mut self, renames: Vec<ColumnRename>) -> Self {
        self.renames = Some(renames);
        self
    }

    /// Add one rename on top of the layout defaults (or the replaced map).
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.extra_renames.push(ColumnRename::new(from, to));
        self
    }

    /// Replace the columns required after reconciliation.
    pub fn required_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Set the release-date column.
    pub fn release_date_column(mut self, column: impl Into<String>) -> Self {
        self.release_date_column = Some(column.into());
        self
    }

    /// Set the chrono format used to parse release dates.
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    /// Set the continuous popularity column used for banding.
    pub fn popularity_column(mut self, column: impl Into<String>) -> Self {
        self.popularity_column = Some(column.into());
        self
    }

    /// Set the provenance label column.
    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    /// Set custom popularity bands.
    pub fn bands(mut self, bands: PopularityBands) -> Self {
        self.bands = Some(bands);
        self
    }

    /// Set the duration bucket width in seconds.
    pub fn duration_bin_seconds(mut self, seconds: u32) -> Self {
        self.duration_bin_seconds = Some(seconds);
        self
    }

    /// Set the output directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set the output file name (without extension).
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PrepConfig` or an error if validation fails.
    pub fn build(self) -> Result<PrepConfig, ConfigValidationError> {
        let defaults = PrepConfig::default();
        let layout = self.layout.unwrap_or_default();

        let renames = if self.renames.is_some() || !self.extra_renames.is_empty() {
            let mut renames = self
                .renames
                .unwrap_or_else(|| layout.default_renames());
            renames.extend(self.extra_renames);
            Some(renames)
        } else {
            None
        };

        let config = PrepConfig {
            layout,
            identifier_columns: self.identifier_columns,
            renames,
            required_columns: self.required_columns.unwrap_or(defaults.required_columns),
            release_date_column: self
                .release_date_column
                .unwrap_or(defaults.release_date_column),
            date_format: self.date_format.unwrap_or(defaults.date_format),
            popularity_column: self.popularity_column.unwrap_or(defaults.popularity_column),
            label_column: self.label_column.unwrap_or(defaults.label_column),
            bands: self.bands.unwrap_or_default(),
            duration_bin_seconds: self
                .duration_bin_seconds
                .unwrap_or(DEFAULT_DURATION_BIN_SECONDS),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            output_name: self.output_name.unwrap_or(defaults.output_name),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrepConfig::default();
        assert_eq!(config.date_format, "%Y-%m-%d");
        assert_eq!(config.duration_bin_seconds, 15);
        assert_eq!(config.popularity_column, "track_popularity");
        assert_eq!(config.required_columns.len(), 18);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_layout_defaults() {
        let split = PrepConfig::split("high.csv", "low.csv");
        assert_eq!(split.identifier_columns().len(), 8);
        assert!(split.identifier_columns().contains(&"analysis_url".to_string()));
        assert!(split.renames().is_empty());

        let single = PrepConfig::single("tracks.csv");
        assert_eq!(single.identifier_columns(), vec!["index".to_string()]);
        assert_eq!(
            single.renames(),
            vec![
                ColumnRename::new("popularity", "track_popularity"),
                ColumnRename::new("artists", "track_artist"),
            ]
        );
    }

    #[test]
    fn test_builder_extra_rename_keeps_layout_defaults() {
        let config = PrepConfig::builder()
            .single("tracks.csv")
            .rename("genre", "track_genre")
            .build()
            .unwrap();

        let renames = config.renames();
        assert_eq!(renames.len(), 3);
        assert_eq!(renames[2], ColumnRename::new("genre", "track_genre"));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PrepConfig::builder()
            .split("h.csv", "l.csv")
            .identifier_columns(["track_id"])
            .date_format("%d/%m/%Y")
            .duration_bin_seconds(30)
            .output_name("merged")
            .build()
            .unwrap();

        assert_eq!(config.identifier_columns(), vec!["track_id".to_string()]);
        assert_eq!(config.date_format, "%d/%m/%Y");
        assert_eq!(config.duration_bin_seconds, 30);
        assert_eq!(config.output_path(), PathBuf::from("outputs/merged.csv"));
    }

    #[test]
    fn test_band_classification_edges() {
        let bands = PopularityBands::default();
        assert_eq!(bands.classify(0.0), Some("Very Low"));
        assert_eq!(bands.classify(20.0), Some("Very Low"));
        assert_eq!(bands.classify(20.5), Some("Low"));
        assert_eq!(bands.classify(21.0), Some("Low"));
        assert_eq!(bands.classify(60.0), Some("Medium"));
        assert_eq!(bands.classify(80.0), Some("High"));
        assert_eq!(bands.classify(81.0), Some("Very High"));
        assert_eq!(bands.classify(100.0), Some("Very High"));
        assert_eq!(bands.classify(100.5), None);
        assert_eq!(bands.classify(-1.0), None);
        assert_eq!(bands.classify(f64::NAN), None);
    }

    #[test]
    fn test_bands_partition_integer_scores() {
        let bands = PopularityBands::default();
        for score in 0..=100 {
            let matching = bands
                .upper_edges
                .iter()
                .enumerate()
                .filter(|(idx, edge)| {
                    let lower = if *idx == 0 { -1.0 } else { bands.upper_edges[idx - 1] };
                    (score as f64) > lower && (score as f64) <= **edge
                })
                .count();
            assert_eq!(matching, 1, "score {} matched {} bands", score, matching);
            assert!(bands.classify(score as f64).is_some());
        }
    }

    #[test]
    fn test_band_rank_follows_band_order() {
        let bands = PopularityBands::default();
        assert_eq!(bands.rank("Very Low"), Some(0));
        assert_eq!(bands.rank("Medium"), Some(2));
        assert_eq!(bands.rank("Very High"), Some(4));
        assert_eq!(bands.rank("Unknown"), None);

        let mut labels = vec!["Very High", "High", "Low", "Very Low", "Medium"];
        labels.sort_by_key(|l| bands.rank(l));
        assert_eq!(labels, vec!["Very Low", "Low", "Medium", "High", "Very High"]);

        assert_eq!(bands.band_index(80.0), Some(3));
        assert_eq!(bands.band_index(100.5), None);
    }

    #[test]
    fn test_validation_rejects_unsorted_bands() {
        let result = PrepConfig::builder()
            .bands(PopularityBands {
                upper_edges: vec![50.0, 40.0],
                labels: vec!["a".to_string(), "b".to_string()],
            })
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidBands(_)
        ));
    }

    #[test]
    fn test_validation_rejects_label_count_mismatch() {
        let result = PrepConfig::builder()
            .bands(PopularityBands {
                upper_edges: vec![50.0, 100.0],
                labels: vec!["low".to_string()],
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_zero_bin() {
        let result = PrepConfig::builder().duration_bin_seconds(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidDurationBin(0)
        ));
    }

    #[test]
    fn test_validation_rejects_empty_rename() {
        let result = PrepConfig::builder().rename("", "track_genre").build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidRename { .. }
        ));
    }

    #[test]
    fn test_config_from_partial_json() {
        let json = r#"{
            "layout": { "kind": "split", "high": "h.csv", "low": "l.csv" },
            "date_format": "%Y-%m-%d",
            "renames": [{ "from": "playlist_genre", "to": "track_genre" }]
        }"#;

        let config: PrepConfig = serde_json::from_str(json).expect("partial config");
        assert_eq!(config.layout.name(), "split");
        assert_eq!(config.identifier_columns().len(), 8);
        assert_eq!(
            config.renames(),
            vec![ColumnRename::new("playlist_genre", "track_genre")]
        );
        assert_eq!(config.duration_bin_seconds, 15);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = PrepConfig::split("h.csv", "l.csv");
        let json = serde_json::to_string(&config).unwrap();
        let back: PrepConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.layout, config.layout);
        assert_eq!(back.bands, config.bands);
    }
}
