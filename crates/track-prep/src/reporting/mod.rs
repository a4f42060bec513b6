//! Output of a pipeline run.
//!
//! - [`write_prepared_csv`] / [`load_prepared_csv`] move the prepared table
//!   to and from a flat file.
//! - [`PrepReport`] is the JSON run report (`--json`, `--emit-report`).
//! - [`ReportGenerator`] places all of these in the configured output
//!   directory under a common base name.
//!
//! # Example
//!
//! ```rust,ignore
//! use track_prep::reporting::{PrepReport, ReportGenerator};
//!
//! let generator = ReportGenerator::from_config(&config);
//! let table_path = generator.write_table(&prepared.table)?;
//! let report = PrepReport::build(&config, Some(&table_path), &prepared);
//! generator.write_report_to_file(&report)?;
//! ```

mod generator;

pub use generator::{
    ColumnEntry, PrepReport, ReportGenerator, load_prepared_csv, write_prepared_csv,
};
