//! Strict string-to-typed conversions used at the ingestion boundary.
//!
//! Unlike a lenient cleaner these never try to salvage a value: a field that
//! does not parse, or parses outside its declared bounds, becomes null and is
//! counted as rejected.

use anyhow::Result;
use polars::prelude::*;

/// Result of converting one column.
pub(crate) struct Converted {
    pub series: Series,
    /// Non-null inputs that became null.
    pub rejected: usize,
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_none_or(|lo| value >= lo) && max.is_none_or(|hi| value <= hi)
}

/// Parse a string column as `f64`, nulling anything outside `[min, max]`.
pub(crate) fn string_to_float(
    series: &Series,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<Converted> {
    let str_series = series.str()?;
    let mut values: Vec<Option<f64>> = Vec::with_capacity(str_series.len());
    let mut rejected = 0;

    for opt_val in str_series.into_iter() {
        match opt_val {
            Some(val) => match val.trim().parse::<f64>() {
                Ok(v) if v.is_finite() && within(v, min, max) => values.push(Some(v)),
                _ => {
                    rejected += 1;
                    values.push(None);
                }
            },
            None => values.push(None),
        }
    }

    Ok(Converted {
        series: Series::new(series.name().clone(), values),
        rejected,
    })
}

/// Parse a string column as `i64`.
///
/// Integral floats such as `"4.0"` are accepted since spreadsheet exports
/// often widen integer columns; `"4.5"` is rejected.
pub(crate) fn string_to_integer(
    series: &Series,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<Converted> {
    let str_series = series.str()?;
    let mut values: Vec<Option<i64>> = Vec::with_capacity(str_series.len());
    let mut rejected = 0;

    for opt_val in str_series.into_iter() {
        match opt_val {
            Some(val) => {
                let trimmed = val.trim();
                let parsed = trimmed.parse::<i64>().ok().or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                });

                match parsed {
                    Some(v) if within(v as f64, min, max) => values.push(Some(v)),
                    _ => {
                        rejected += 1;
                        values.push(None);
                    }
                }
            }
            None => values.push(None),
        }
    }

    Ok(Converted {
        series: Series::new(series.name().clone(), values),
        rejected,
    })
}

/// Parse a string column as boolean.
pub(crate) fn string_to_boolean(series: &Series) -> Result<Converted> {
    let str_series = series.str()?;
    let mut values: Vec<Option<bool>> = Vec::with_capacity(str_series.len());
    let mut rejected = 0;

    for opt_val in str_series.into_iter() {
        match opt_val {
            Some(val) => match parse_bool(val.trim()) {
                Some(b) => values.push(Some(b)),
                None => {
                    rejected += 1;
                    values.push(None);
                }
            },
            None => values.push(None),
        }
    }

    Ok(Converted {
        series: Series::new(series.name().clone(), values),
        rejected,
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Trim a string column, turning blank fields into nulls.
pub(crate) fn trim_text(series: &Series) -> Result<Converted> {
    let str_series = series.str()?;
    let values: Vec<Option<String>> = str_series
        .into_iter()
        .map(|opt| {
            opt.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .collect();

    let rejected = str_series
        .into_iter()
        .filter(|opt| opt.is_some_and(|v| v.trim().is_empty()))
        .count();

    Ok(Converted {
        series: Series::new(series.name().clone(), values),
        rejected,
    })
}
