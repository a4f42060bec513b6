//! Music Track Preparation Library
//!
//! Turns raw music-track exports into one canonical table for an
//! exploratory popularity dashboard, built with Rust and Polars.
//!
//! # Overview
//!
//! - **Ingestion**: a `Split` layout (high + low popularity exports, tagged
//!   with a provenance label and reconciled by column name) or a `Single`
//!   pre-merged export, validated against a declared [`schema::TrackSchema`]
//! - **Enrichment**: optional release-date lookups through a
//!   [`catalogue::CatalogueLookup`] such as the Spotify Web API
//! - **Cleaning**: exhaustive missing-value drop, duplicate removal,
//!   release date parsing with a `0` sentinel, identifier column removal
//! - **Features**: duration in minutes, 15-second duration bins, five
//!   popularity bands, categorical key and mode
//! - **Views**: serializable aggregates for every dashboard chart in
//!   [`insights`], plus a session cache in [`TrackStore`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use track_prep::{Pipeline, PrepConfig};
//! use track_prep::insights::{DashboardSnapshot, TrackFilter};
//!
//! let prepared = Pipeline::builder()
//!     .config(PrepConfig::split(
//!         "dataset/high_popularity_spotify_data.csv",
//!         "dataset/low_popularity_spotify_data.csv",
//!     ))
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run()?;
//!
//! println!("{} tracks, {} columns", prepared.height(), prepared.table.width());
//!
//! let pop = TrackFilter::new().genre("pop").apply(&prepared.table)?;
//! let snapshot = DashboardSnapshot::build(&pop)?;
//! ```
//!
//! # Configuration
//!
//! ```rust,ignore
//! use track_prep::config::*;
//!
//! let config = PrepConfig::builder()
//!     .single("dataset/dataset_spotify.csv")
//!     .date_format("%d/%m/%Y")
//!     .duration_bin_seconds(30)
//!     .output_dir("outputs")
//!     .build()?;
//! ```

pub mod catalogue;
pub mod clean;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod insights;
pub mod pipeline;
pub mod reporting;
pub mod schema;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use catalogue::{CatalogueLookup, EnrichmentReport, ReleaseDateLookup, lookup_release_date};
#[cfg(feature = "catalogue")]
pub use catalogue::{SpotifyCatalogue, SpotifyConfig};
pub use clean::CleaningReport;
pub use config::{
    ColumnRename, ConfigValidationError, PopularityBands, PrepConfig, PrepConfigBuilder,
    SourceLayout,
};
pub use error::{PrepError, Result as PrepResult, ResultExt};
pub use ingest::SourceTables;
pub use insights::{DashboardSnapshot, TrackFilter};
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PrepStage, ProgressReporter,
    ProgressUpdate,
};
pub use reporting::{PrepReport, ReportGenerator, load_prepared_csv, write_prepared_csv};
pub use schema::{ColumnKind, TrackSchema};
pub use store::TrackStore;
pub use types::{PrepSummary, PreparedTracks};
