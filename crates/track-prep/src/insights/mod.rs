//! View data for the dashboard.
//!
//! Every function here is a pure aggregation over a prepared table and
//! returns a serde-serializable payload. Rendering is left to the caller.
//!
//! - [`filters`]: [`TrackFilter`] narrows the table before any view runs.
//! - `market`: genre, artist, explicit-content and time-signature views.
//! - `sonic`: correlations, unit grids, duration and key views, plus the
//!   per-track radar and distance-to-hit comparisons.
//! - `distribution`: box summaries per genre (explicit popularity split,
//!   tempo, speechiness, genre features) and the loudness and liveness
//!   scatters.
//!
//! [`DashboardSnapshot`] bundles the views that do not depend on a selected
//! track.
//!
//! # Example
//!
//! ```rust,ignore
//! use track_prep::insights::{DashboardSnapshot, TrackFilter};
//!
//! let rock = TrackFilter::new().genre("rock").apply(&prepared.table)?;
//! let snapshot = DashboardSnapshot::build(&rock)?;
//! let radar = track_prep::insights::sonic_radar(&rock, "Bohemian Rhapsody")?;
//! ```

mod distribution;
pub mod filters;
mod market;
mod sonic;

pub use distribution::{
    BoxSummary, ExplicitPopularity, GENRE_FEATURE_TOP_N, GENRE_FEATURES, GenreFeature,
    GroupSummary, LIVENESS_SAMPLE_SIZE, LOUDNESS_REFERENCE_DB, LOUDNESS_SAMPLE_SIZE, LinearTrend,
    SPEECHINESS_TOP_N, ScatterPoint, ScatterView, SpeechinessBand, SpeechinessProfile,
    explicit_popularity_split, genre_feature_profiles, liveness_scatter, loudness_scatter,
    speechiness_band, speechiness_by_genre, tempo_profile, top_genres,
};
pub use filters::{Threshold, TrackFilter, distinct_values, filter_by_feature, popularity_bounds};
pub use market::{
    ArtistDominance, ExplicitSplit, GenreShare, HISTOGRAM_BIN_WIDTH, HistogramBin,
    TimeSignatureShare, artist_dominance, explicit_split_by_genre, genre_market_share,
    popularity_histogram, time_signature_share,
};
pub use sonic::{
    CORRELATION_COLUMNS, CorrelationMatrix, DurationPoint, FeatureMean, GRID_BINS, GridCell,
    HIT_FEATURES, HitDistance, KeyModeCell, RADAR_FEATURES, RadarAxis, SonicRadar, UnitGrid,
    correlation_matrix, distance_to_hit, duration_decay, key_mode_heatmap, key_name, mode_name,
    mood_grid, production_density, sonic_profile, sonic_radar,
};

use crate::error::{PrepError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Artists shown in the dominance view.
pub const ARTIST_TOP_N: usize = 50;

/// Genres shown in the explicit split view.
pub const EXPLICIT_TOP_N: usize = 20;

// ============================================================================
// Column extraction
// ============================================================================

fn series(df: &DataFrame, column: &str) -> Result<Series> {
    let column = df
        .column(column)
        .map_err(|_| PrepError::ColumnNotFound(column.to_string()))?;
    Ok(column.as_materialized_series().clone())
}

pub(crate) fn floats(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let s = series(df, column)?.cast(&DataType::Float64)?;
    Ok(s.f64()?.into_iter().collect())
}

pub(crate) fn integers(df: &DataFrame, column: &str) -> Result<Vec<Option<i64>>> {
    let s = series(df, column)?.cast(&DataType::Int64)?;
    Ok(s.i64()?.into_iter().collect())
}

pub(crate) fn booleans(df: &DataFrame, column: &str) -> Result<Vec<Option<bool>>> {
    let s = series(df, column)?.cast(&DataType::Boolean)?;
    Ok(s.bool()?.into_iter().collect())
}

pub(crate) fn strings(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let s = series(df, column)?.cast(&DataType::String)?;
    Ok(s.str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Running mean.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Mean {
    sum: f64,
    pub(crate) count: usize,
}

impl Mean {
    pub(crate) fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub(crate) fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// All track-independent views over one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub track_count: usize,
    pub popularity_histogram: Vec<HistogramBin>,
    pub correlation: CorrelationMatrix,
    pub genre_market_share: Vec<GenreShare>,
    pub artist_dominance: Vec<ArtistDominance>,
    pub explicit_split: Vec<ExplicitSplit>,
    pub explicit_popularity: Vec<ExplicitPopularity>,
    pub mood_grid: UnitGrid,
    pub production_density: UnitGrid,
    pub duration_decay: Vec<DurationPoint>,
    pub key_mode: Vec<KeyModeCell>,
    pub time_signatures: Vec<TimeSignatureShare>,
    pub sonic_profile: Vec<FeatureMean>,
    pub tempo_profile: Vec<GroupSummary>,
    pub speechiness: SpeechinessProfile,
    pub genre_features: Vec<GenreFeature>,
    pub loudness: ScatterView,
    pub liveness: ScatterView,
}

impl DashboardSnapshot {
    pub fn build(df: &DataFrame) -> Result<Self> {
        debug!("Building dashboard views over {} tracks", df.height());

        Ok(Self {
            track_count: df.height(),
            popularity_histogram: popularity_histogram(df)?,
            correlation: correlation_matrix(df)?,
            genre_market_share: genre_market_share(df)?,
            artist_dominance: artist_dominance(df, ARTIST_TOP_N)?,
            explicit_split: explicit_split_by_genre(df, EXPLICIT_TOP_N)?,
            explicit_popularity: explicit_popularity_split(df)?,
            mood_grid: mood_grid(df)?,
            production_density: production_density(df)?,
            duration_decay: duration_decay(df)?,
            key_mode: key_mode_heatmap(df)?,
            time_signatures: time_signature_share(df)?,
            sonic_profile: sonic_profile(df)?,
            tempo_profile: tempo_profile(df)?,
            speechiness: speechiness_by_genre(df, SPEECHINESS_TOP_N)?,
            genre_features: genre_feature_profiles(df, GENRE_FEATURE_TOP_N)?,
            loudness: loudness_scatter(df)?,
            liveness: liveness_scatter(df)?,
        })
    }
}
