//! Progress reporting for the preparation pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use track_prep::Pipeline;
//!
//! let prepared = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run()?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the preparation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrepStage {
    /// Validating configuration
    Initializing,
    /// Reading the source files
    Loading,
    /// Merging sources and conforming column types
    Reconciling,
    /// Filling release dates from a catalogue
    Enriching,
    /// Dropping incomplete rows and duplicates, deriving dates
    Cleaning,
    /// Adding duration and popularity features
    DerivingFeatures,
    /// Writing the prepared table
    Writing,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline failed with an error
    Failed,
}

impl PrepStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Loading => "Loading Sources",
            Self::Reconciling => "Reconciling Sources",
            Self::Enriching => "Enriching Release Dates",
            Self::Cleaning => "Cleaning Tracks",
            Self::DerivingFeatures => "Deriving Features",
            Self::Writing => "Writing Output",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall run spent in this stage (0.0 - 1.0).
    ///
    /// The non-terminal stages sum to 1.0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::Loading => 0.25,
            Self::Reconciling => 0.15,
            Self::Enriching => 0.20,
            Self::Cleaning => 0.18,
            Self::DerivingFeatures => 0.10,
            Self::Writing => 0.10,
            Self::Complete => 0.0,
            Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::Loading => 0.02,
            Self::Reconciling => 0.27,
            Self::Enriching => 0.42,
            Self::Cleaning => 0.62,
            Self::DerivingFeatures => 0.80,
            Self::Writing => 0.90,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// A single progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PrepStage,

    /// Optional detail, e.g. `"Source: low"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: PrepStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    pub fn with_sub_stage(
        stage: PrepStage,
        sub_stage: impl Into<String>,
        stage_progress: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sub_stage: Some(sub_stage.into()),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: PrepStage::Complete,
            sub_stage: None,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: PrepStage::Failed,
            sub_stage: None,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
        }
    }
}

/// Receiver of progress updates.
///
/// Implementations must be `Send + Sync` so a run can report from a
/// background thread.
pub trait ProgressReporter: Send + Sync {
    /// Called at the start and end of every stage. Should not block.
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RUNNING_STAGES: [PrepStage; 7] = [
        PrepStage::Initializing,
        PrepStage::Loading,
        PrepStage::Reconciling,
        PrepStage::Enriching,
        PrepStage::Cleaning,
        PrepStage::DerivingFeatures,
        PrepStage::Writing,
    ];

    #[test]
    fn test_progress_update_new() {
        let update = ProgressUpdate::new(PrepStage::Cleaning, 0.5, "Cleaning...");
        assert_eq!(update.stage, PrepStage::Cleaning);
        assert!(update.sub_stage.is_none());
        assert_eq!(update.stage_progress, 0.5);
        assert!((update.progress - 0.71).abs() < 1e-6);
    }

    #[test]
    fn test_progress_update_with_sub_stage() {
        let update = ProgressUpdate::with_sub_stage(PrepStage::Loading, "Source: low", 1.0, "Loaded");
        assert_eq!(update.sub_stage.as_deref(), Some("Source: low"));
        assert!((update.progress - 0.27).abs() < 1e-6);
    }

    #[test]
    fn test_stage_weights_sum() {
        let total: f32 = RUNNING_STAGES.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 0.001, "Weights should sum to 1.0");
    }

    #[test]
    fn test_base_progress_is_contiguous() {
        for pair in RUNNING_STAGES.windows(2) {
            let end = pair[0].base_progress() + pair[0].weight();
            assert!(
                (end - pair[1].base_progress()).abs() < 1e-6,
                "{:?} should start where {:?} ends",
                pair[1],
                pair[0]
            );
        }
        let last = PrepStage::Writing;
        assert!((last.base_progress() + last.weight() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stage_json_values() {
        let expectations = [
            (PrepStage::Loading, "\"loading\""),
            (PrepStage::DerivingFeatures, "\"deriving_features\""),
            (PrepStage::Failed, "\"failed\""),
        ];
        for (stage, expected) in expectations {
            assert_eq!(serde_json::to_string(&stage).unwrap(), expected);
        }
    }

    #[test]
    fn test_progress_reporter_across_threads() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let reporter = Arc::new(ClosureProgressReporter::new(move |_update| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let reporter_clone = reporter.clone();
        std::thread::spawn(move || {
            reporter_clone.report(ProgressUpdate::new(PrepStage::Loading, 0.0, "Loading"));
        })
        .join()
        .expect("Thread should not panic");

        reporter.report(ProgressUpdate::complete("Done"));
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }
}
