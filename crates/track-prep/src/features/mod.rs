//! Feature derivation over a cleaned track table.
//!
//! Adds `duration_minutes`, `popularity_category` and `duration_bin`, turns
//! `key`/`mode` into categorical labels and casts the calendar fields and
//! `time_signature` to integers. Runs after cleaning, so the date sentinel
//! substitution has already happened and every cast is total.

use crate::clean::{RELEASE_DAY, RELEASE_MONTH, RELEASE_YEAR};
use crate::config::{PopularityBands, PrepConfig};
use crate::error::{PrepError, Result};
use polars::prelude::*;
use tracing::{debug, info};

pub const DURATION_MINUTES: &str = "duration_minutes";
pub const POPULARITY_CATEGORY: &str = "popularity_category";
pub const DURATION_BIN: &str = "duration_bin";

const DURATION_MS: &str = "duration_ms";
const CATEGORICAL_COLUMNS: [&str; 2] = ["key", "mode"];
const INTEGER_COLUMNS: [&str; 4] = ["time_signature", RELEASE_YEAR, RELEASE_MONTH, RELEASE_DAY];

fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(column)
        .map_err(|_| PrepError::ColumnNotFound(column.to_string()))?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// `duration_ms / 60000`.
pub fn duration_minutes(df: &DataFrame) -> Result<Series> {
    let minutes: Vec<Option<f64>> = float_values(df, DURATION_MS)?
        .into_iter()
        .map(|ms| ms.map(|v| v / 60_000.0))
        .collect();
    Ok(Series::new(DURATION_MINUTES.into(), minutes))
}

/// `floor(duration_ms / 1000 / bin_seconds) * bin_seconds`, in seconds.
pub fn duration_bins(df: &DataFrame, bin_seconds: u32) -> Result<Series> {
    let width = bin_seconds as f64;
    let bins: Vec<Option<i64>> = float_values(df, DURATION_MS)?
        .into_iter()
        .map(|ms| ms.map(|v| ((v / 1000.0 / width).floor() * width) as i64))
        .collect();
    Ok(Series::new(DURATION_BIN.into(), bins))
}

/// Band label for every popularity score.
///
/// A score outside the bands means validation let a bad value through, which
/// is reported as [`PrepError::InvalidValue`] rather than silently labelled.
pub fn popularity_categories(
    df: &DataFrame,
    column: &str,
    bands: &PopularityBands,
) -> Result<Series> {
    let scores = float_values(df, column)?;
    let mut labels: Vec<String> = Vec::with_capacity(scores.len());

    for (row, score) in scores.into_iter().enumerate() {
        let label = score.and_then(|s| bands.classify(s)).ok_or_else(|| {
            PrepError::InvalidValue {
                column: column.to_string(),
                reason: format!(
                    "row {}: score {:?} outside 0..={}",
                    row,
                    score,
                    bands.max_score()
                ),
            }
        })?;
        labels.push(label.to_string());
    }

    Ok(Series::new(POPULARITY_CATEGORY.into(), labels))
}

/// Cast the present `columns` to `dtype`.
fn cast_present(df: &DataFrame, columns: &[&str], dtype: &DataType) -> Result<DataFrame> {
    let mut out = df.clone();
    for name in columns {
        if let Ok(column) = df.column(name) {
            let cast = column.as_materialized_series().strict_cast(dtype)?;
            out.with_column(cast)?;
        }
    }
    Ok(out)
}

/// Run the full feature-derivation stage.
pub fn derive_features(df: &DataFrame, config: &PrepConfig) -> Result<DataFrame> {
    let mut out = cast_present(df, &CATEGORICAL_COLUMNS, &DataType::String)?;
    out = cast_present(&out, &INTEGER_COLUMNS, &DataType::Int64)?;

    out.with_column(duration_minutes(df)?)?;
    out.with_column(popularity_categories(
        df,
        &config.popularity_column,
        &config.bands,
    )?)?;
    out.with_column(duration_bins(df, config.duration_bin_seconds)?)?;

    let with_nulls: Vec<String> = out
        .get_columns()
        .iter()
        .filter(|c| c.null_count() > 0)
        .map(|c| c.name().to_string())
        .collect();
    if let Some(column) = with_nulls.first() {
        return Err(PrepError::InvalidValue {
            column: column.clone(),
            reason: "missing values after feature derivation".to_string(),
        });
    }

    debug!("Derived feature columns: {:?}", [DURATION_MINUTES, POPULARITY_CATEGORY, DURATION_BIN]);
    info!("Feature derivation complete: {} columns", out.width());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df! {
            "track_popularity" => &[0.0f64, 20.0, 21.0, 80.0, 81.0, 100.0],
            "duration_ms" => &[200_040i64, 177_000, 14_999, 15_000, 600_000, 1],
            "key" => &[0i64, 11, 5, 5, 2, 7],
            "mode" => &[1i64, 0, 1, 0, 1, 1],
            "time_signature" => &[4i64, 4, 3, 4, 5, 4],
        }
        .unwrap()
    }

    fn strings(series: &Series) -> Vec<String> {
        series
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_popularity_band_edges() {
        let labels = popularity_categories(&sample(), "track_popularity", &PopularityBands::default())
            .unwrap();
        assert_eq!(
            strings(&labels),
            vec!["Very Low", "Very Low", "Low", "High", "Very High", "Very High"]
        );
    }

    #[test]
    fn test_popularity_bands_over_half_point_scores() {
        let bands = PopularityBands::default();
        let scores: Vec<f64> = (0..=200).map(|i| i as f64 * 0.5).collect();
        let df = df! { "track_popularity" => &scores }.unwrap();

        let labels = strings(&popularity_categories(&df, "track_popularity", &bands).unwrap());
        assert_eq!(labels.len(), scores.len());

        let ranks: Vec<usize> = labels
            .iter()
            .map(|label| bands.rank(label).unwrap())
            .collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "bands out of order: {:?}", ranks);
        assert_eq!(ranks.first(), Some(&0));
        assert_eq!(ranks.last(), Some(&(bands.labels.len() - 1)));

        for (score, label) in scores.iter().zip(&labels) {
            assert_eq!(bands.classify(*score), Some(label.as_str()), "score {}", score);
        }
    }

    #[test]
    fn test_popularity_out_of_range_is_an_error() {
        let df = df! { "track_popularity" => &[50.0f64, 101.0] }.unwrap();
        let err = popularity_categories(&df, "track_popularity", &PopularityBands::default())
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_VALUE");
    }

    #[test]
    fn test_duration_bins() {
        let bins: Vec<Option<i64>> = duration_bins(&sample(), 15)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            bins,
            vec![Some(195), Some(165), Some(0), Some(15), Some(600), Some(0)]
        );
    }

    #[test]
    fn test_duration_minutes() {
        let minutes: Vec<f64> = duration_minutes(&sample())
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert!((minutes[1] - 2.95).abs() < 1e-9);
        assert!((minutes[4] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_derive_features_types() {
        let out = derive_features(&sample(), &PrepConfig::default()).unwrap();

        assert_eq!(out.column("key").unwrap().dtype(), &DataType::String);
        assert_eq!(out.column("mode").unwrap().dtype(), &DataType::String);
        assert_eq!(out.column("time_signature").unwrap().dtype(), &DataType::Int64);
        assert_eq!(out.column(DURATION_BIN).unwrap().dtype(), &DataType::Int64);
        assert_eq!(out.width(), sample().width() + 3);

        let keys = strings(out.column("key").unwrap().as_materialized_series());
        assert_eq!(keys[1], "11");
    }

    #[test]
    fn test_derive_features_is_repeatable() {
        let once = derive_features(&sample(), &PrepConfig::default()).unwrap();
        let twice = derive_features(&once, &PrepConfig::default()).unwrap();
        assert!(once.equals(&twice));
    }
}
