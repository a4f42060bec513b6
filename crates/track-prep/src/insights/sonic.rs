//! Audio-feature views: correlations, density grids and per-track
//! comparisons against the catalogue.

use super::{Mean, floats, integers, strings};
use crate::error::{PrepError, Result};
use crate::features::DURATION_BIN;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const POPULARITY: &str = "track_popularity";
const TRACK_NAME: &str = "track_name";

/// Columns of the hit-formula correlation matrix, in display order.
pub const CORRELATION_COLUMNS: [&str; 10] = [
    "track_popularity",
    "danceability",
    "energy",
    "valence",
    "loudness",
    "acousticness",
    "instrumentalness",
    "speechiness",
    "tempo",
    "duration_ms",
];

/// Axes of the sonic radar.
pub const RADAR_FEATURES: [&str; 6] = [
    "danceability",
    "energy",
    "valence",
    "acousticness",
    "liveness",
    "speechiness",
];

/// Features compared by the distance-to-hit score.
pub const HIT_FEATURES: [&str; 5] = ["danceability", "energy", "valence", "acousticness", "loudness"];

/// Cells per axis of the unit-interval grids.
pub const GRID_BINS: usize = 20;

/// Duration bins at or above this many seconds are left out of the decay curve.
pub const DURATION_DECAY_LIMIT_SECONDS: i64 = 600;

const KEY_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

// ============================================================================
// Correlation
// ============================================================================

/// Pearson correlations between popularity and the audio features.
///
/// `values[i][j]` is `None` when fewer than two rows have both values or
/// either column is constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

pub fn correlation_matrix(df: &DataFrame) -> Result<CorrelationMatrix> {
    let columns: Vec<String> = CORRELATION_COLUMNS
        .iter()
        .filter(|name| df.column(name).is_ok())
        .map(|name| name.to_string())
        .collect();

    let data = columns
        .iter()
        .map(|name| floats(df, name))
        .collect::<Result<Vec<_>>>()?;

    let values = data
        .iter()
        .map(|a| data.iter().map(|b| pearson(a, b)).collect())
        .collect();

    Ok(CorrelationMatrix { columns, values })
}

fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let (dx, dy) = (x - mean_x, y - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

// ============================================================================
// Unit grids
// ============================================================================

/// One non-empty cell of a 20 x 20 grid over two unit-interval features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub x_bin: usize,
    pub y_bin: usize,
    pub track_count: usize,
    pub mean_popularity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitGrid {
    pub x_feature: String,
    pub y_feature: String,
    pub bins: usize,
    pub cells: Vec<GridCell>,
}

impl UnitGrid {
    pub fn cell(&self, x_bin: usize, y_bin: usize) -> Option<&GridCell> {
        self.cells
            .iter()
            .find(|c| c.x_bin == x_bin && c.y_bin == y_bin)
    }
}

fn unit_bin(value: f64) -> Option<usize> {
    if !(0.0..=1.0).contains(&value) {
        return None;
    }
    Some(((value * GRID_BINS as f64) as usize).min(GRID_BINS - 1))
}

fn unit_grid(df: &DataFrame, x_feature: &str, y_feature: &str) -> Result<UnitGrid> {
    let xs = floats(df, x_feature)?;
    let ys = floats(df, y_feature)?;
    let scores = floats(df, POPULARITY)?;

    let mut cells: BTreeMap<(usize, usize), Mean> = BTreeMap::new();
    for ((x, y), score) in xs.into_iter().zip(ys).zip(scores) {
        let (Some(x), Some(y), Some(score)) = (x.and_then(unit_bin), y.and_then(unit_bin), score)
        else {
            continue;
        };
        cells.entry((x, y)).or_default().add(score);
    }

    Ok(UnitGrid {
        x_feature: x_feature.to_string(),
        y_feature: y_feature.to_string(),
        bins: GRID_BINS,
        cells: cells
            .into_iter()
            .map(|((x_bin, y_bin), mean)| GridCell {
                x_bin,
                y_bin,
                track_count: mean.count,
                mean_popularity: mean.value().unwrap_or(0.0),
            })
            .collect(),
    })
}

/// Mean popularity over valence (x) by energy (y).
pub fn mood_grid(df: &DataFrame) -> Result<UnitGrid> {
    unit_grid(df, "valence", "energy")
}

/// Track density over acousticness (x) by energy (y).
pub fn production_density(df: &DataFrame) -> Result<UnitGrid> {
    unit_grid(df, "acousticness", "energy")
}

// ============================================================================
// Duration, key and mode
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationPoint {
    pub duration_bin: i64,
    pub track_count: usize,
    pub mean_popularity: f64,
}

/// Mean popularity per duration bin, shortest first.
pub fn duration_decay(df: &DataFrame) -> Result<Vec<DurationPoint>> {
    let bins = integers(df, DURATION_BIN)?;
    let scores = floats(df, POPULARITY)?;

    let mut points: BTreeMap<i64, Mean> = BTreeMap::new();
    for (bin, score) in bins.into_iter().zip(scores) {
        if let (Some(bin), Some(score)) = (bin, score) {
            if bin < DURATION_DECAY_LIMIT_SECONDS {
                points.entry(bin).or_default().add(score);
            }
        }
    }

    Ok(points
        .into_iter()
        .map(|(duration_bin, mean)| DurationPoint {
            duration_bin,
            track_count: mean.count,
            mean_popularity: mean.value().unwrap_or(0.0),
        })
        .collect())
}

/// Pitch-class name for a Spotify key number.
pub fn key_name(key: i64) -> Option<&'static str> {
    usize::try_from(key).ok().and_then(|k| KEY_NAMES.get(k).copied())
}

pub fn mode_name(mode: i64) -> Option<&'static str> {
    match mode {
        1 => Some("Major"),
        0 => Some("Minor"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyModeCell {
    pub key: String,
    pub mode: String,
    pub track_count: usize,
    pub mean_popularity: f64,
}

/// Mean popularity per key and mode, in pitch order with Major first.
///
/// Key and mode may be stored as numbers or as their categorical strings.
pub fn key_mode_heatmap(df: &DataFrame) -> Result<Vec<KeyModeCell>> {
    let keys = strings(df, "key")?;
    let modes = strings(df, "mode")?;
    let scores = floats(df, POPULARITY)?;

    let code = |value: Option<String>| value.and_then(|v| v.trim().parse::<i64>().ok());

    // Mode is keyed as 1 - mode so Major (1) sorts before Minor (0).
    let mut cells: BTreeMap<(i64, i64), Mean> = BTreeMap::new();
    for ((key, mode), score) in keys.into_iter().zip(modes).zip(scores) {
        let (Some(key), Some(mode), Some(score)) = (code(key), code(mode), score) else {
            continue;
        };
        if key_name(key).is_some() && mode_name(mode).is_some() {
            cells.entry((key, 1 - mode)).or_default().add(score);
        }
    }

    Ok(cells
        .into_iter()
        .filter_map(|((key, inverted_mode), mean)| {
            Some(KeyModeCell {
                key: key_name(key)?.to_string(),
                mode: mode_name(1 - inverted_mode)?.to_string(),
                track_count: mean.count,
                mean_popularity: mean.value().unwrap_or(0.0),
            })
        })
        .collect())
}

// ============================================================================
// Per-track comparisons
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMean {
    pub feature: String,
    pub mean: Option<f64>,
}

/// Catalogue-wide means of the radar features.
pub fn sonic_profile(df: &DataFrame) -> Result<Vec<FeatureMean>> {
    RADAR_FEATURES
        .iter()
        .map(|feature| {
            let mut mean = Mean::default();
            floats(df, feature)?.into_iter().flatten().for_each(|v| mean.add(v));
            Ok(FeatureMean {
                feature: feature.to_string(),
                mean: mean.value(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarAxis {
    pub feature: String,
    pub track: Option<f64>,
    pub global: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SonicRadar {
    pub track_name: String,
    /// Rows named `track_name`; their features are averaged.
    pub matched_rows: usize,
    pub axes: Vec<RadarAxis>,
}

fn rows_named(df: &DataFrame, track_name: &str) -> Result<Vec<usize>> {
    let rows: Vec<usize> = strings(df, TRACK_NAME)?
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_deref() == Some(track_name))
        .map(|(i, _)| i)
        .collect();

    if rows.is_empty() {
        return Err(PrepError::TrackNotFound(track_name.to_string()));
    }
    Ok(rows)
}

/// One track's radar features against the catalogue means.
pub fn sonic_radar(df: &DataFrame, track_name: &str) -> Result<SonicRadar> {
    let rows = rows_named(df, track_name)?;
    let global = sonic_profile(df)?;

    let axes = global
        .into_iter()
        .map(|FeatureMean { feature, mean }| {
            let values = floats(df, &feature)?;
            let mut track = Mean::default();
            rows.iter()
                .filter_map(|&i| values[i])
                .for_each(|v| track.add(v));
            Ok(RadarAxis {
                feature,
                track: track.value(),
                global: mean,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SonicRadar {
        track_name: track_name.to_string(),
        matched_rows: rows.len(),
        axes,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitDistance {
    pub track_name: String,
    /// 0 - 100; 100 means the track sits on the hit centroid.
    pub score: f64,
    /// Popularity a track had to exceed to count as a hit.
    pub hit_threshold: f64,
    pub hit_count: usize,
}

/// Popularity thresholds tried in order when selecting hits.
const HIT_THRESHOLDS: [f64; 2] = [75.0, 60.0];

/// Similarity of a track to the centroid of hit tracks.
///
/// Features are min-max scaled over the hits and the named track, then the
/// Euclidean distance is mapped onto 0 - 100 against the unit-cube diagonal.
/// Returns `Ok(None)` when no track clears either hit threshold. The first
/// row named `track_name` is scored.
pub fn distance_to_hit(df: &DataFrame, track_name: &str) -> Result<Option<HitDistance>> {
    let scores = floats(df, POPULARITY)?;
    let features = HIT_FEATURES
        .iter()
        .map(|f| floats(df, f))
        .collect::<Result<Vec<_>>>()?;

    let Some((hit_threshold, hits)) = HIT_THRESHOLDS.iter().find_map(|&threshold| {
        let hits: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some_and(|s| s > threshold))
            .map(|(i, _)| i)
            .collect();
        (!hits.is_empty()).then_some((threshold, hits))
    }) else {
        return Ok(None);
    };

    let targets = rows_named(df, track_name)?;
    let target = targets[0];

    let mut squared = 0.0;
    for values in &features {
        let fitted: Vec<f64> = hits
            .iter()
            .chain(&targets)
            .filter_map(|&i| values[i])
            .collect();
        let min = fitted.iter().copied().fold(f64::INFINITY, f64::min);
        let max = fitted.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let scale = |v: f64| if max > min { (v - min) / (max - min) } else { 0.0 };

        let mut centroid = Mean::default();
        hits.iter().filter_map(|&i| values[i]).for_each(|v| centroid.add(v));

        if let (Some(c), Some(t)) = (centroid.value(), values[target]) {
            squared += (scale(c) - scale(t)).powi(2);
        }
    }

    let max_distance = (HIT_FEATURES.len() as f64).sqrt();
    let score = (100.0 * (1.0 - squared.sqrt() / max_distance)).max(0.0);

    Ok(Some(HitDistance {
        track_name: track_name.to_string(),
        score,
        hit_threshold,
        hit_count: hits.len(),
    }))
}
