//! Distribution views: box summaries per group and capped scatter samples.
//!
//! Box-style views (explicit popularity split, tempo profile, speechiness,
//! genre features) carry a [`BoxSummary`] per group instead of raw values.
//! Scatter views carry at most a fixed number of points, drawn with a seeded
//! generator so the same table always yields the same sample, plus a
//! least-squares trend fitted on every row.

use super::{booleans, floats, strings};
use crate::error::Result;
use polars::prelude::DataFrame;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const POPULARITY: &str = "track_popularity";
const GENRE: &str = "track_genre";

/// Genres shown in the speechiness view.
pub const SPEECHINESS_TOP_N: usize = 10;

/// Genres shown in the genre feature view.
pub const GENRE_FEATURE_TOP_N: usize = 5;

/// Features compared across genres.
pub const GENRE_FEATURES: [&str; 4] = ["danceability", "energy", "valence", "acousticness"];

/// Points kept in the loudness scatter.
pub const LOUDNESS_SAMPLE_SIZE: usize = 5000;

/// Points kept in the liveness scatter.
pub const LIVENESS_SAMPLE_SIZE: usize = 2000;

/// Streaming loudness normalization target, in dB.
pub const LOUDNESS_REFERENCE_DB: f64 = -14.0;

const SAMPLE_SEED: u64 = 42;

/// Speechiness bands as `(label, lower, upper)`; the lower edge is inclusive.
const SPEECHINESS_BANDS: [(&str, f64, f64); 3] = [
    ("Music", 0.0, 0.33),
    ("Rap/Rhythmic", 0.33, 0.66),
    ("Spoken Word", 0.66, 1.0),
];

// ============================================================================
// Box summaries
// ============================================================================

/// Five-number summary plus count and mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSummary {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

impl BoxSummary {
    /// Summary of `values`, or `None` when there are none.
    ///
    /// Quartiles interpolate linearly between the closest ranks.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            count: sorted.len(),
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        })
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

/// A labelled group and the summary of its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: String,
    pub summary: BoxSummary,
}

/// Complete values of `column` per genre.
fn values_by_genre(df: &DataFrame, column: &str) -> Result<BTreeMap<String, Vec<f64>>> {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (genre, value) in strings(df, GENRE)?.into_iter().zip(floats(df, column)?) {
        if let (Some(genre), Some(value)) = (genre, value) {
            groups.entry(genre).or_default().push(value);
        }
    }
    Ok(groups)
}

fn summarize(groups: BTreeMap<String, Vec<f64>>) -> Vec<GroupSummary> {
    groups
        .into_iter()
        .filter_map(|(group, values)| {
            BoxSummary::from_values(&values).map(|summary| GroupSummary { group, summary })
        })
        .collect()
}

/// The `top_n` genres by track count, ties broken by name.
pub fn top_genres(df: &DataFrame, top_n: usize) -> Result<Vec<String>> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for genre in strings(df, GENRE)?.into_iter().flatten() {
        *counts.entry(genre).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(ranked.into_iter().take(top_n).map(|(genre, _)| genre).collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitPopularity {
    pub genre: String,
    pub explicit: bool,
    pub summary: BoxSummary,
}

/// Popularity spread per genre, split into clean and explicit tracks.
///
/// Genres are alphabetical; within a genre the clean group comes first. Groups
/// without tracks are left out.
pub fn explicit_popularity_split(df: &DataFrame) -> Result<Vec<ExplicitPopularity>> {
    let genres = strings(df, GENRE)?;
    let explicit = booleans(df, "explicit")?;
    let scores = floats(df, POPULARITY)?;

    let mut groups: BTreeMap<(String, bool), Vec<f64>> = BTreeMap::new();
    for ((genre, flag), score) in genres.into_iter().zip(explicit).zip(scores) {
        if let (Some(genre), Some(flag), Some(score)) = (genre, flag, score) {
            groups.entry((genre, flag)).or_default().push(score);
        }
    }

    Ok(groups
        .into_iter()
        .filter_map(|((genre, explicit), values)| {
            BoxSummary::from_values(&values).map(|summary| ExplicitPopularity {
                genre,
                explicit,
                summary,
            })
        })
        .collect())
}

/// Tempo spread per genre, alphabetical.
pub fn tempo_profile(df: &DataFrame) -> Result<Vec<GroupSummary>> {
    Ok(summarize(values_by_genre(df, "tempo")?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechinessBand {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechinessProfile {
    pub bands: Vec<SpeechinessBand>,
    /// Largest genres first.
    pub genres: Vec<GroupSummary>,
}

/// Band label for a speechiness value.
pub fn speechiness_band(value: f64) -> &'static str {
    SPEECHINESS_BANDS
        .iter()
        .find(|(_, _, upper)| value < *upper)
        .map(|(label, _, _)| *label)
        .unwrap_or(SPEECHINESS_BANDS[SPEECHINESS_BANDS.len() - 1].0)
}

/// Speechiness spread for the `top_n` genres, with the band boundaries.
pub fn speechiness_by_genre(df: &DataFrame, top_n: usize) -> Result<SpeechinessProfile> {
    let mut groups = values_by_genre(df, "speechiness")?;
    let genres = top_genres(df, top_n)?
        .into_iter()
        .filter_map(|genre| {
            let values = groups.remove(&genre)?;
            BoxSummary::from_values(&values).map(|summary| GroupSummary {
                group: genre,
                summary,
            })
        })
        .collect();

    Ok(SpeechinessProfile {
        bands: SPEECHINESS_BANDS
            .iter()
            .map(|(label, lower, upper)| SpeechinessBand {
                label: label.to_string(),
                lower: *lower,
                upper: *upper,
            })
            .collect(),
        genres,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreFeature {
    pub feature: String,
    pub genre: String,
    pub summary: BoxSummary,
}

/// Spread of each of [`GENRE_FEATURES`] for the `top_n` genres.
///
/// Ordered by feature, then by genre size.
pub fn genre_feature_profiles(df: &DataFrame, top_n: usize) -> Result<Vec<GenreFeature>> {
    let genres = top_genres(df, top_n)?;
    let mut rows = Vec::with_capacity(GENRE_FEATURES.len() * genres.len());

    for feature in GENRE_FEATURES {
        let groups = values_by_genre(df, feature)?;
        for genre in &genres {
            let Some(summary) = groups.get(genre).and_then(|v| BoxSummary::from_values(v)) else {
                continue;
            };
            rows.push(GenreFeature {
                feature: feature.to_string(),
                genre: genre.clone(),
                summary,
            });
        }
    }
    Ok(rows)
}

// ============================================================================
// Scatter views
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub popularity: f64,
}

/// `popularity = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterView {
    pub feature: String,
    /// Rows with both values present, before sampling.
    pub total_points: usize,
    /// At most the view's cap, in table order.
    pub points: Vec<ScatterPoint>,
    /// Fitted on all rows; `None` with fewer than two distinct x values.
    pub trend: Option<LinearTrend>,
    pub reference_x: Option<f64>,
}

fn linear_trend(points: &[ScatterPoint]) -> Option<LinearTrend> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.popularity).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for p in points {
        sxx += (p.x - mean_x).powi(2);
        sxy += (p.x - mean_x) * (p.popularity - mean_y);
    }
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    Some(LinearTrend {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

fn scatter(
    df: &DataFrame,
    feature: &str,
    cap: usize,
    reference_x: Option<f64>,
) -> Result<ScatterView> {
    let points: Vec<ScatterPoint> = floats(df, feature)?
        .into_iter()
        .zip(floats(df, POPULARITY)?)
        .filter_map(|(x, popularity)| Some(ScatterPoint { x: x?, popularity: popularity? }))
        .collect();

    let trend = linear_trend(&points);
    let total_points = points.len();

    let points = if total_points > cap {
        let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
        let mut picked: Vec<usize> = (0..total_points)
            .collect::<Vec<_>>()
            .choose_multiple(&mut rng, cap)
            .copied()
            .collect();
        picked.sort_unstable();
        picked.into_iter().map(|i| points[i]).collect()
    } else {
        points
    };

    Ok(ScatterView {
        feature: feature.to_string(),
        total_points,
        points,
        trend,
        reference_x,
    })
}

/// Loudness against popularity, with the -14 dB reference line.
pub fn loudness_scatter(df: &DataFrame) -> Result<ScatterView> {
    scatter(df, "loudness", LOUDNESS_SAMPLE_SIZE, Some(LOUDNESS_REFERENCE_DB))
}

/// Liveness against popularity.
pub fn liveness_scatter(df: &DataFrame) -> Result<ScatterView> {
    scatter(df, "liveness", LIVENESS_SAMPLE_SIZE, None)
}
