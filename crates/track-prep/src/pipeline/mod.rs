//! Pipeline module.
//!
//! Runs ingestion, optional release-date enrichment, cleaning and feature
//! derivation in order, reporting progress along the way.

mod builder;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{ClosureProgressReporter, PrepStage, ProgressReporter, ProgressUpdate};
