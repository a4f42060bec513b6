//! The preparation pipeline and its builder.

use crate::catalogue::{CatalogueLookup, enrich_release_dates};
use crate::clean;
use crate::config::{PrepConfig, TRACK_ID_COLUMN};
use crate::error::{PrepError, Result};
use crate::features;
use crate::ingest::{self, SourceTables};
use crate::pipeline::progress::{
    ClosureProgressReporter, PrepStage, ProgressReporter, ProgressUpdate,
};
use crate::reporting::ReportGenerator;
use crate::types::{PrepSummary, PreparedTracks};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Share of reconciled rows that may be dropped before the run is flagged.
const HIGH_DATA_LOSS_PERCENT: f32 = 30.0;

/// The track preparation pipeline.
///
/// Use [`Pipeline::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use track_prep::{Pipeline, PrepConfig};
/// use track_prep::catalogue::SpotifyCatalogue;
/// use std::sync::Arc;
///
/// let prepared = Pipeline::builder()
///     .config(PrepConfig::split("high.csv", "low.csv"))
///     .catalogue(Arc::new(SpotifyCatalogue::from_env()?))
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run()?;
///
/// println!("{} tracks ready", prepared.height());
/// ```
pub struct Pipeline {
    config: PrepConfig,
    catalogue: Option<Arc<dyn CatalogueLookup>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    /// Load, prepare and write the table to the configured output path.
    pub fn run(&self) -> Result<PreparedTracks> {
        let start = self.start();
        self.finish(self.run_internal(true, start))
    }

    /// Load and prepare without writing anything.
    pub fn prepare(&self) -> Result<PreparedTracks> {
        let start = self.start();
        self.finish(self.run_internal(false, start))
    }

    /// Prepare tables that are already in memory. Nothing is written.
    pub fn process_tables(&self, tables: SourceTables) -> Result<PreparedTracks> {
        let start = self.start();
        self.finish(self.process_internal(tables, start))
    }

    fn start(&self) -> Instant {
        info!("Starting track preparation ({} layout)", self.config.layout.name());
        self.report_progress(ProgressUpdate::new(
            PrepStage::Initializing,
            1.0,
            "Configuration validated",
        ));
        Instant::now()
    }

    /// Report the terminal progress state and log failures.
    fn finish(&self, result: Result<PreparedTracks>) -> Result<PreparedTracks> {
        match result {
            Ok(prepared) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Prepared {} tracks",
                    prepared.height()
                )));
                Ok(prepared)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self, write: bool, start: Instant) -> Result<PreparedTracks> {
        self.report_progress(ProgressUpdate::new(
            PrepStage::Loading,
            0.0,
            format!("Loading {} source(s)...", self.config.layout.paths().len()),
        ));
        let tables = ingest::load_sources(&self.config.layout)?;
        self.report_progress(ProgressUpdate::new(PrepStage::Loading, 1.0, "Sources loaded"));

        let mut prepared = self.process_internal(tables, start)?;

        if !write {
            return Ok(prepared);
        }

        self.report_progress(ProgressUpdate::new(
            PrepStage::Writing,
            0.0,
            "Writing prepared table...",
        ));
        let path = ReportGenerator::from_config(&self.config).write_table(&prepared.table)?;
        prepared.summary.duration_ms = start.elapsed().as_millis() as u64;
        self.report_progress(ProgressUpdate::with_sub_stage(
            PrepStage::Writing,
            path.display().to_string(),
            1.0,
            "Prepared table written",
        ));

        Ok(prepared)
    }

    fn process_internal(&self, tables: SourceTables, start: Instant) -> Result<PreparedTracks> {
        let mut summary = PrepSummary::new();
        summary.layout = self.config.layout.name().to_string();

        // Reconcile + schema boundary
        self.report_progress(ProgressUpdate::new(
            PrepStage::Reconciling,
            0.0,
            "Reconciling sources...",
        ));
        let ingested = ingest::ingest_tables(tables, &self.config)?;
        summary.rows_per_source = ingested.rows_per_source;
        summary.rows_loaded = ingested.table.height();
        summary.projected_away = ingested.projected_away;
        summary.rejected_values = ingested.conform.rejected_values;

        if !summary.projected_away.is_empty() {
            summary.actions.push(format!(
                "Projected away {} column(s) of the low source: {}",
                summary.projected_away.len(),
                summary.projected_away.join(", ")
            ));
        }
        let rejected: usize = summary.rejected_values.values().sum();
        if rejected > 0 {
            summary.add_warning(format!(
                "{} value(s) did not match their declared type or range and were cleared",
                rejected
            ));
        }
        self.report_progress(ProgressUpdate::new(
            PrepStage::Reconciling,
            1.0,
            format!("{} rows reconciled", summary.rows_loaded),
        ));

        let table = match &self.catalogue {
            Some(catalogue) => {
                self.report_progress(ProgressUpdate::with_sub_stage(
                    PrepStage::Enriching,
                    catalogue.name().to_string(),
                    0.0,
                    "Looking up missing release dates...",
                ));
                let (enriched, report) = enrich_release_dates(
                    &ingested.table,
                    catalogue.as_ref(),
                    TRACK_ID_COLUMN,
                    &self.config.release_date_column,
                )?;
                if report.unknown > 0 {
                    summary.add_warning(format!(
                        "{} release date(s) unknown to {}",
                        report.unknown, report.catalogue
                    ));
                }
                self.report_progress(ProgressUpdate::new(
                    PrepStage::Enriching,
                    1.0,
                    format!("{} of {} release dates found", report.found, report.looked_up),
                ));
                summary.enrichment = Some(report);
                enriched
            }
            None => ingested.table,
        };

        self.report_progress(ProgressUpdate::new(PrepStage::Cleaning, 0.0, "Cleaning tracks..."));
        let (cleaned, cleaning) = clean::clean(&table, &self.config)?;
        summary.incomplete_rows_dropped = cleaning.incomplete_rows_dropped;
        summary.duplicates_removed = cleaning.duplicates_removed;
        summary.unparseable_dates = cleaning.unparseable_dates;
        summary.dropped_columns = cleaning.dropped_columns;
        summary.actions.extend(cleaning.actions);
        self.report_progress(ProgressUpdate::new(
            PrepStage::Cleaning,
            1.0,
            format!("{} tracks after cleaning", cleaned.height()),
        ));

        self.report_progress(ProgressUpdate::new(
            PrepStage::DerivingFeatures,
            0.0,
            "Deriving features...",
        ));
        let table = features::derive_features(&cleaned, &self.config)?;
        self.report_progress(ProgressUpdate::new(
            PrepStage::DerivingFeatures,
            1.0,
            "Features derived",
        ));

        summary.rows_after = table.height();
        summary.columns_after = table.width();
        summary.duration_ms = start.elapsed().as_millis() as u64;

        if summary.rows_removed_percentage() > HIGH_DATA_LOSS_PERCENT {
            summary.add_warning(format!(
                "High data loss: {:.1}% of rows were removed",
                summary.rows_removed_percentage()
            ));
        }
        if table.height() == 0 {
            summary.add_warning("No tracks survived cleaning");
        }
        for warning in &summary.warnings {
            warn!("{}", warning);
        }

        info!(
            "Preparation complete: {} -> {} rows, {} columns in {} ms",
            summary.rows_loaded, summary.rows_after, summary.columns_after, summary.duration_ms
        );

        Ok(PreparedTracks { table, summary })
    }
}

/// Builder for [`Pipeline`].
///
/// The configuration is validated in [`build`](Self::build); without one the
/// default single-source configuration is used.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PrepConfig>,
    catalogue: Option<Arc<dyn CatalogueLookup>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    pub fn config(mut self, config: PrepConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Fill missing release dates from `catalogue` before cleaning.
    pub fn catalogue(mut self, catalogue: Arc<dyn CatalogueLookup>) -> Self {
        self.catalogue = Some(catalogue);
        self
    }

    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// # Errors
    ///
    /// Returns [`PrepError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.unwrap_or_default();
        config.validate().map_err(PrepError::from)?;

        Ok(Pipeline {
            config,
            catalogue: self.catalogue,
            progress_reporter: self.progress_reporter,
        })
    }
}
