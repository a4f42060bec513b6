use crate::config::PrepConfig;
use crate::error::{PrepError, Result, ResultExt};
use crate::ingest::load_source;
use crate::insights::DashboardSnapshot;
use crate::schema::{self, ColumnKind, TrackSchema};
use crate::types::{PrepSummary, PreparedTracks};
use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ============================================================================
// Run Report Types
// ============================================================================

/// Report of one pipeline run, written next to the prepared table.
///
/// Used for both JSON output (`--json`) and file writing (`--emit-report`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    /// `"split"` or `"single"`
    pub layout: String,
    /// Source files in load order
    pub input_files: Vec<String>,
    /// Path to the prepared table (if written)
    pub output_file: Option<String>,
    pub summary: PrepSummary,
    /// Final columns with their semantic kinds
    pub columns: Vec<ColumnEntry>,
}

/// A column of the prepared table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub name: String,
    pub kind: ColumnKind,
}

impl PrepReport {
    /// Build a report from a finished run.
    pub fn build(config: &PrepConfig, output_file: Option<&Path>, prepared: &PreparedTracks) -> Self {
        let schema = TrackSchema::prepared(config);
        let columns = prepared
            .column_names()
            .into_iter()
            .map(|name| ColumnEntry {
                kind: schema.kind_of(&name),
                name,
            })
            .collect();

        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            layout: config.layout.name().to_string(),
            input_files: config
                .layout
                .paths()
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            output_file: output_file.map(|p| p.display().to_string()),
            summary: prepared.summary.clone(),
            columns,
        }
    }
}

// ============================================================================
// Prepared table IO
// ============================================================================

/// Write the prepared table: header row, comma-delimited, no index column.
pub fn write_prepared_csv(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut out = df.clone();
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .with_quote_char(b'"')
        .finish(&mut out)
        .context(format!("Writing prepared table '{}'", path.display()))?;

    info!("Prepared table saved: {}", path.display());
    Ok(())
}

/// Read a table written by [`write_prepared_csv`] back with its declared kinds.
///
/// Categorical columns come back as strings.
pub fn load_prepared_csv(path: &Path, config: &PrepConfig) -> Result<DataFrame> {
    let raw = load_source(path)?;
    let (df, report) = schema::conform(&raw, &TrackSchema::prepared(config))?;

    if report.total_rejected() > 0 {
        return Err(PrepError::InvalidValue {
            column: report
                .rejected_values
                .keys()
                .next()
                .cloned()
                .unwrap_or_default(),
            reason: format!(
                "{} value(s) in '{}' do not match the prepared schema",
                report.total_rejected(),
                path.display()
            ),
        });
    }

    debug!("Reloaded prepared table: {} rows", df.height());
    Ok(df)
}

// ============================================================================
// Report Generator
// ============================================================================

/// Writes the prepared table and JSON side files into one output directory.
pub struct ReportGenerator {
    output_dir: PathBuf,
    output_name: String,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./outputs"),
            output_name: "tracks_prepared".to_string(),
        }
    }
}

impl ReportGenerator {
    /// Create a new ReportGenerator with custom output settings.
    pub fn new(output_dir: PathBuf, output_name: impl Into<String>) -> Self {
        Self {
            output_dir,
            output_name: output_name.into(),
        }
    }

    pub fn from_config(config: &PrepConfig) -> Self {
        Self::new(config.output_dir.clone(), config.output_name.clone())
    }

    /// Path the prepared table is written to.
    pub fn table_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.output_name))
    }

    /// Write the prepared table and return its path.
    pub fn write_table(&self, df: &DataFrame) -> Result<PathBuf> {
        let path = self.table_path();
        write_prepared_csv(df, &path)?;
        Ok(path)
    }

    /// Write the run report as `<name>_report.json`.
    pub fn write_report_to_file(&self, report: &PrepReport) -> Result<PathBuf> {
        self.write_json(report, "report")
    }

    /// Write the dashboard view payloads as `<name>_views.json`.
    pub fn write_views_to_file(&self, snapshot: &DashboardSnapshot) -> Result<PathBuf> {
        self.write_json(snapshot, "views")
    }

    fn write_json<T: Serialize>(&self, value: &T, suffix: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;

        let path = self
            .output_dir
            .join(format!("{}_{}.json", self.output_name, suffix));
        let mut file = File::create(&path)?;
        file.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;

        info!("{} saved: {}", suffix, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared() -> PreparedTracks {
        let table = df! {
            "track_name" => &["One, Two", "Three"],
            "track_popularity" => &[95.0f64, 15.0],
            "key" => &["5", "11"],
            "explicit" => &[true, false],
            "release_year" => &[2019i64, 0],
            "popularity_category" => &["Very High", "Very Low"],
        }
        .unwrap();
        PreparedTracks {
            table,
            summary: PrepSummary::new(),
        }
    }

    #[test]
    fn test_prepared_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prepared.csv");
        let tracks = prepared();

        write_prepared_csv(&tracks.table, &path).unwrap();
        let back = load_prepared_csv(&path, &PrepConfig::default()).unwrap();

        assert!(back.equals(&tracks.table));
    }

    #[test]
    fn test_report_lists_column_kinds() {
        let config = PrepConfig::split("h.csv", "l.csv");
        let report = PrepReport::build(&config, Some(Path::new("out/t.csv")), &prepared());

        assert_eq!(report.layout, "split");
        assert_eq!(report.input_files, vec!["h.csv".to_string(), "l.csv".to_string()]);
        assert_eq!(report.output_file.as_deref(), Some("out/t.csv"));
        assert!(report.columns.contains(&ColumnEntry {
            name: "key".to_string(),
            kind: ColumnKind::Categorical,
        }));
        assert!(report.columns.contains(&ColumnEntry {
            name: "track_name".to_string(),
            kind: ColumnKind::Text,
        }));
    }

    #[test]
    fn test_generator_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(dir.path().to_path_buf(), "run");
        let config = PrepConfig::default();

        let table_path = generator.write_table(&prepared().table).unwrap();
        let report = PrepReport::build(&config, Some(&table_path), &prepared());
        let report_path = generator.write_report_to_file(&report).unwrap();

        assert_eq!(table_path.file_name().unwrap(), "run.csv");
        assert_eq!(report_path.file_name().unwrap(), "run_report.json");

        let content = fs::read_to_string(report_path).unwrap();
        let parsed: PrepReport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.columns.len(), 6);
    }
}
