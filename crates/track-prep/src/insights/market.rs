//! Catalogue-level views: how popularity is spread over genres, artists,
//! explicit content and time signatures.

use super::{Mean, booleans, floats, integers, strings};
use crate::error::Result;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const POPULARITY: &str = "track_popularity";
const GENRE: &str = "track_genre";
const ARTIST: &str = "track_artist";

/// Width of a popularity histogram bin.
pub const HISTOGRAM_BIN_WIDTH: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Track counts in 2-point popularity bins over 0..=100.
///
/// Bins are half-open except the last, which also holds 100.
pub fn popularity_histogram(df: &DataFrame) -> Result<Vec<HistogramBin>> {
    let bin_count = (100.0 / HISTOGRAM_BIN_WIDTH) as usize;
    let mut bins: Vec<HistogramBin> = (0..bin_count)
        .map(|i| HistogramBin {
            start: i as f64 * HISTOGRAM_BIN_WIDTH,
            end: (i + 1) as f64 * HISTOGRAM_BIN_WIDTH,
            count: 0,
        })
        .collect();

    for score in floats(df, POPULARITY)?.into_iter().flatten() {
        if !(0.0..=100.0).contains(&score) {
            continue;
        }
        let idx = ((score / HISTOGRAM_BIN_WIDTH) as usize).min(bin_count - 1);
        bins[idx].count += 1;
    }

    Ok(bins)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreShare {
    pub genre: String,
    pub track_count: usize,
    /// Fraction of all tracks (0.0 - 1.0).
    pub share: f64,
    pub mean_popularity: f64,
}

/// Track count, share and mean popularity per genre, largest first.
pub fn genre_market_share(df: &DataFrame) -> Result<Vec<GenreShare>> {
    let genres = strings(df, GENRE)?;
    let scores = floats(df, POPULARITY)?;

    let mut stats: HashMap<String, Mean> = HashMap::new();
    for (genre, score) in genres.into_iter().zip(scores) {
        if let (Some(genre), Some(score)) = (genre, score) {
            stats.entry(genre).or_default().add(score);
        }
    }

    let total: usize = stats.values().map(|m| m.count).sum();
    let mut shares: Vec<GenreShare> = stats
        .into_iter()
        .map(|(genre, mean)| GenreShare {
            genre,
            track_count: mean.count,
            share: mean.count as f64 / total as f64,
            mean_popularity: mean.value().unwrap_or(0.0),
        })
        .collect();

    shares.sort_by(|a, b| b.track_count.cmp(&a.track_count).then_with(|| a.genre.cmp(&b.genre)));
    Ok(shares)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistDominance {
    pub artist: String,
    pub track_count: usize,
    pub mean_popularity: f64,
    /// Most frequent genre; ties go to the alphabetically first.
    pub primary_genre: String,
}

/// The `top_n` artists by track count.
pub fn artist_dominance(df: &DataFrame, top_n: usize) -> Result<Vec<ArtistDominance>> {
    let artists = strings(df, ARTIST)?;
    let genres = strings(df, GENRE)?;
    let scores = floats(df, POPULARITY)?;

    let mut stats: HashMap<String, (Mean, BTreeMap<String, usize>)> = HashMap::new();
    for ((artist, genre), score) in artists.into_iter().zip(genres).zip(scores) {
        let Some(artist) = artist else { continue };
        let entry = stats.entry(artist).or_default();
        if let Some(score) = score {
            entry.0.add(score);
        }
        if let Some(genre) = genre {
            *entry.1.entry(genre).or_default() += 1;
        }
    }

    let mut rows: Vec<ArtistDominance> = stats
        .into_iter()
        .map(|(artist, (mean, genre_counts))| {
            let primary_genre = genre_counts
                .iter()
                .fold(None::<(&String, usize)>, |best, (genre, count)| match best {
                    Some((_, best_count)) if best_count >= *count => best,
                    _ => Some((genre, *count)),
                })
                .map(|(genre, _)| genre.clone())
                .unwrap_or_else(|| "Unknown".to_string());

            ArtistDominance {
                artist,
                track_count: mean.count,
                mean_popularity: mean.value().unwrap_or(0.0),
                primary_genre,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.track_count.cmp(&a.track_count).then_with(|| a.artist.cmp(&b.artist)));
    rows.truncate(top_n);
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitSplit {
    pub genre: String,
    pub explicit_count: usize,
    pub clean_count: usize,
    /// Fraction of the genre's tracks that are explicit.
    pub explicit_share: f64,
    pub explicit_mean_popularity: Option<f64>,
    pub clean_mean_popularity: Option<f64>,
}

/// Explicit versus clean tracks for the `top_n` genres by track count.
pub fn explicit_split_by_genre(df: &DataFrame, top_n: usize) -> Result<Vec<ExplicitSplit>> {
    let genres = strings(df, GENRE)?;
    let explicit = booleans(df, "explicit")?;
    let scores = floats(df, POPULARITY)?;

    let mut stats: HashMap<String, (Mean, Mean)> = HashMap::new();
    for ((genre, flag), score) in genres.into_iter().zip(explicit).zip(scores) {
        let (Some(genre), Some(flag), Some(score)) = (genre, flag, score) else {
            continue;
        };
        let entry = stats.entry(genre).or_default();
        if flag {
            entry.0.add(score);
        } else {
            entry.1.add(score);
        }
    }

    let mut rows: Vec<ExplicitSplit> = stats
        .into_iter()
        .map(|(genre, (explicit, clean))| {
            let total = explicit.count + clean.count;
            ExplicitSplit {
                genre,
                explicit_count: explicit.count,
                clean_count: clean.count,
                explicit_share: explicit.count as f64 / total as f64,
                explicit_mean_popularity: explicit.value(),
                clean_mean_popularity: clean.value(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        (b.explicit_count + b.clean_count)
            .cmp(&(a.explicit_count + a.clean_count))
            .then_with(|| a.genre.cmp(&b.genre))
    });
    rows.truncate(top_n);
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSignatureShare {
    pub time_signature: i64,
    pub count: usize,
    pub share: f64,
}

/// Share of tracks per time signature, most common first.
pub fn time_signature_share(df: &DataFrame) -> Result<Vec<TimeSignatureShare>> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for signature in integers(df, "time_signature")?.into_iter().flatten() {
        *counts.entry(signature).or_default() += 1;
    }

    let total: usize = counts.values().sum();
    let mut rows: Vec<TimeSignatureShare> = counts
        .into_iter()
        .map(|(time_signature, count)| TimeSignatureShare {
            time_signature,
            count,
            share: count as f64 / total as f64,
        })
        .collect();

    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.time_signature.cmp(&b.time_signature)));
    Ok(rows)
}
