//! Cross-cutting dashboard filters.

use super::{booleans, floats, strings};
use crate::error::{PrepError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const POPULARITY: &str = "track_popularity";
const GENRE: &str = "track_genre";
const ARTIST: &str = "track_artist";

/// Value a single feature is compared against.
///
/// On a numeric column a [`Threshold::Number`] keeps rows at or above it.
/// On any other column the value must match exactly; a number is compared
/// with its plain rendering, so `Number(5.0)` matches the key label `"5"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Flag(bool),
    Number(f64),
    Text(String),
}

fn is_number(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn threshold_mask(df: &DataFrame, feature: &str, threshold: &Threshold) -> Result<Vec<bool>> {
    let dtype = df
        .column(feature)
        .map_err(|_| PrepError::ColumnNotFound(feature.to_string()))?
        .dtype()
        .clone();
    let mismatch = || {
        PrepError::InvalidConfig(format!(
            "threshold {:?} cannot be applied to '{}' ({})",
            threshold, feature, dtype
        ))
    };

    let mask = match (threshold, &dtype) {
        (Threshold::Number(min), dt) if is_number(dt) => floats(df, feature)?
            .into_iter()
            .map(|v| v.is_some_and(|v| v >= *min))
            .collect(),
        (Threshold::Flag(flag), DataType::Boolean) => booleans(df, feature)?
            .into_iter()
            .map(|v| v == Some(*flag))
            .collect(),
        (Threshold::Text(text), DataType::String) => strings(df, feature)?
            .into_iter()
            .map(|v| v.as_deref() == Some(text.as_str()))
            .collect(),
        (Threshold::Number(n), DataType::String) => {
            let text = n.to_string();
            strings(df, feature)?
                .into_iter()
                .map(|v| v.as_deref() == Some(text.as_str()))
                .collect()
        }
        _ => return Err(mismatch()),
    };
    Ok(mask)
}

/// Rows of `df` whose `feature` passes `threshold`, in original order.
pub fn filter_by_feature(df: &DataFrame, feature: &str, threshold: &Threshold) -> Result<DataFrame> {
    let keep = threshold_mask(df, feature, threshold)?;
    let mask = BooleanChunked::from_slice("filter".into(), &keep);
    Ok(df.filter(&mask)?)
}

/// Popularity range, genre and artist selections and feature thresholds.
///
/// An empty selection means "all". The range is inclusive at both ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackFilter {
    pub popularity_range: Option<(f64, f64)>,
    pub genres: BTreeSet<String>,
    pub artists: BTreeSet<String>,
    #[serde(default)]
    pub thresholds: Vec<(String, Threshold)>,
}

impl TrackFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn popularity_between(mut self, min: f64, max: f64) -> Self {
        self.popularity_range = Some((min, max));
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genres.insert(genre.into());
        self
    }

    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.artists.insert(artist.into());
        self
    }

    /// Keep rows whose `feature` passes `threshold`.
    pub fn threshold(mut self, feature: impl Into<String>, threshold: Threshold) -> Self {
        self.thresholds.push((feature.into(), threshold));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.popularity_range.is_none()
            && self.genres.is_empty()
            && self.artists.is_empty()
            && self.thresholds.is_empty()
    }

    /// Rows of `df` matching every active criterion, in original order.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        if self.is_empty() {
            return Ok(df.clone());
        }

        let mut keep = vec![true; df.height()];

        if let Some((min, max)) = self.popularity_range {
            if min > max {
                return Err(PrepError::InvalidConfig(format!(
                    "popularity range {}..={} is empty",
                    min, max
                )));
            }
            for (flag, score) in keep.iter_mut().zip(floats(df, POPULARITY)?) {
                *flag &= score.is_some_and(|s| s >= min && s <= max);
            }
        }

        for (column, selected) in [(GENRE, &self.genres), (ARTIST, &self.artists)] {
            if selected.is_empty() {
                continue;
            }
            for (flag, value) in keep.iter_mut().zip(strings(df, column)?) {
                *flag &= value.is_some_and(|v| selected.contains(&v));
            }
        }

        for (feature, threshold) in &self.thresholds {
            for (flag, pass) in keep.iter_mut().zip(threshold_mask(df, feature, threshold)?) {
                *flag &= pass;
            }
        }

        let mask = BooleanChunked::from_slice("filter".into(), &keep);
        Ok(df.filter(&mask)?)
    }
}

/// Sorted distinct values of `column`, for selection widgets.
pub fn distinct_values(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let values: BTreeSet<String> = strings(df, column)?.into_iter().flatten().collect();
    Ok(values.into_iter().collect())
}

/// Observed popularity bounds, used as the default range.
pub fn popularity_bounds(df: &DataFrame) -> Result<Option<(f64, f64)>> {
    let scores: Vec<f64> = floats(df, POPULARITY)?.into_iter().flatten().collect();
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok((!scores.is_empty()).then_some((min, max)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks() -> DataFrame {
        df! {
            "track_name" => &["a", "b", "c", "d"],
            "track_artist" => &["X", "Y", "X", "Z"],
            "track_genre" => &["pop", "rock", "rock", "pop"],
            "track_popularity" => &[10.0f64, 50.0, 75.0, 90.0],
            "explicit" => &[false, true, false, false],
            "key" => &["5", "0", "5", "11"],
        }
        .unwrap()
    }

    fn names(df: &DataFrame) -> Vec<String> {
        strings(df, "track_name").unwrap().into_iter().flatten().collect()
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let out = TrackFilter::new().apply(&tracks()).unwrap();
        assert_eq!(out.height(), 4);
    }

    #[test]
    fn test_popularity_range_is_inclusive() {
        let out = TrackFilter::new()
            .popularity_between(50.0, 75.0)
            .apply(&tracks())
            .unwrap();
        assert_eq!(names(&out), vec!["b", "c"]);
    }

    #[test]
    fn test_criteria_combine() {
        let out = TrackFilter::new()
            .genre("rock")
            .artist("X")
            .artist("Y")
            .apply(&tracks())
            .unwrap();
        assert_eq!(names(&out), vec!["b", "c"]);

        let out = TrackFilter::new()
            .genre("pop")
            .popularity_between(20.0, 100.0)
            .apply(&tracks())
            .unwrap();
        assert_eq!(names(&out), vec!["d"]);
    }

    #[test]
    fn test_numeric_threshold_is_inclusive() {
        let out = filter_by_feature(&tracks(), "track_popularity", &Threshold::Number(50.0)).unwrap();
        assert_eq!(names(&out), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_non_numeric_threshold_is_equality() {
        let out = filter_by_feature(&tracks(), "track_genre", &Threshold::Text("pop".into())).unwrap();
        assert_eq!(names(&out), vec!["a", "d"]);

        let out = filter_by_feature(&tracks(), "explicit", &Threshold::Flag(true)).unwrap();
        assert_eq!(names(&out), vec!["b"]);

        // Categorical key labels compare against the number's rendering
        let out = filter_by_feature(&tracks(), "key", &Threshold::Number(5.0)).unwrap();
        assert_eq!(names(&out), vec!["a", "c"]);
    }

    #[test]
    fn test_threshold_errors() {
        let err = filter_by_feature(&tracks(), "track_popularity", &Threshold::Text("x".into()))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");

        let err = filter_by_feature(&tracks(), "tempo", &Threshold::Number(1.0)).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_thresholds_combine_with_selections() {
        let filter = TrackFilter::new()
            .artist("X")
            .threshold("track_popularity", Threshold::Number(50.0));
        assert!(!filter.is_empty());
        assert_eq!(names(&filter.apply(&tracks()).unwrap()), vec!["c"]);
    }

    #[test]
    fn test_threshold_json_forms() {
        let parsed: Vec<Threshold> = serde_json::from_str(r#"[true, 0.5, "pop"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Threshold::Flag(true),
                Threshold::Number(0.5),
                Threshold::Text("pop".to_string())
            ]
        );
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let err = TrackFilter::new()
            .popularity_between(80.0, 20.0)
            .apply(&tracks())
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_options_and_bounds() {
        assert_eq!(
            distinct_values(&tracks(), "track_genre").unwrap(),
            vec!["pop".to_string(), "rock".to_string()]
        );
        assert_eq!(popularity_bounds(&tracks()).unwrap(), Some((10.0, 90.0)));
        assert_eq!(popularity_bounds(&tracks().head(Some(0))).unwrap(), None);
    }
}
