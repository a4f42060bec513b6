//! Custom error types for the track preparation pipeline.
//!
//! This module provides the error hierarchy using `thiserror` for the
//! ingestion, cleaning and feature-derivation stages as well as the
//! view-data layer built on top of them.
//!
//! Errors are serializable so a dashboard front end can display the
//! code and message of a failed load without parsing strings.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the track preparation pipeline.
#[derive(Error, Debug)]
pub enum PrepError {
    /// A source table could not be read. Always fatal for the session.
    #[error("Failed to load source '{path}': {reason}")]
    SourceLoad { path: String, reason: String },

    /// The second source cannot be projected onto the first by name, or the
    /// reconciled table lacks columns the dashboard relies on.
    #[error("Schema mismatch: missing columns {missing:?}")]
    SchemaMismatch { missing: Vec<String> },

    /// Column was not found in the table.
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A value escaped validation and cannot be used by a derivation step.
    #[error("Invalid value in column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    /// The catalogue refused or could not answer a lookup. Returned by
    /// `SpotifyCatalogue::fetch_release_date`; the batch enrichment helpers
    /// recover it as an unknown date.
    #[error("Catalogue lookup failed: {0}")]
    CatalogueLookup(String),

    /// A track-scoped view was requested for a track that is not in the table.
    #[error("Track '{0}' not found")]
    TrackNotFound(String),

    /// No prepared table is available.
    #[error("No tracks loaded")]
    NoDataLoaded,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error (only with the "catalogue" feature).
    #[cfg(feature = "catalogue")]
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PrepError>,
    },
}

impl PrepError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PrepError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for front-end handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SourceLoad { .. } => "SOURCE_LOAD_FAILED",
            Self::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::CatalogueLookup(_) => "CATALOGUE_LOOKUP_FAILED",
            Self::TrackNotFound(_) => "TRACK_NOT_FOUND",
            Self::NoDataLoaded => "NO_DATA_LOADED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            #[cfg(feature = "catalogue")]
            Self::HttpRequest(_) => "HTTP_REQUEST_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether the error must end the session instead of degrading a view.
    ///
    /// Load, schema and configuration failures are fatal: the dashboard is
    /// never served from a partially prepared table. Track lookups and
    /// catalogue failures only affect a single record or view.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::CatalogueLookup(_) | Self::TrackNotFound(_) | Self::NoDataLoaded => false,
            #[cfg(feature = "catalogue")]
            Self::HttpRequest(_) => false,
            Self::WithContext { source, .. } => source.is_fatal(),
            _ => true,
        }
    }
}

impl From<crate::config::ConfigValidationError> for PrepError {
    fn from(err: crate::config::ConfigValidationError) -> Self {
        PrepError::InvalidConfig(err.to_string())
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for PrepError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PrepError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for preparation operations.
pub type Result<T> = std::result::Result<T, PrepError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PrepError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = PrepError::SourceLoad {
            path: "high.csv".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(err.error_code(), "SOURCE_LOAD_FAILED");
        assert_eq!(
            PrepError::ColumnNotFound("energy".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
    }

    #[test]
    fn test_is_fatal() {
        assert!(PrepError::SchemaMismatch { missing: vec!["key".to_string()] }.is_fatal());
        assert!(PrepError::InvalidConfig("bad".to_string()).is_fatal());
        assert!(!PrepError::CatalogueLookup("timeout".to_string()).is_fatal());
        assert!(!PrepError::TrackNotFound("x".to_string()).is_fatal());
    }

    #[test]
    fn test_error_serialization() {
        let error = PrepError::ColumnNotFound("track_genre".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("track_genre"));
    }

    #[test]
    fn test_with_context_preserves_code_and_fatality() {
        let error = PrepError::CatalogueLookup("503".to_string()).with_context("Enriching dates");
        assert!(error.to_string().contains("Enriching dates"));
        assert_eq!(error.error_code(), "CATALOGUE_LOOKUP_FAILED");
        assert!(!error.is_fatal());
    }
}
