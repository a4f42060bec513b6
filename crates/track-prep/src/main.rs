//! CLI entry point for the track preparation pipeline.

use anyhow::{Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use track_prep::clean::{drop_duplicates, drop_incomplete};
use track_prep::insights::DashboardSnapshot;
use track_prep::{
    Pipeline, PipelineBuilder, PrepConfig, PrepReport, PreparedTracks, ReportGenerator,
    SourceLayout, TrackSchema, ingest,
};
use tracing::{error, info};

#[cfg(feature = "catalogue")]
use std::sync::Arc;
#[cfg(feature = "catalogue")]
use track_prep::SpotifyCatalogue;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Music track preparation pipeline",
    long_about = "Cleans raw music-track exports into one table for the popularity dashboard.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  CLIENT_ID, CLIENT_SECRET    Spotify credentials (for --enrich-release-dates)\n\n\
                  EXAMPLES:\n  \
                  # High/low popularity exports\n  \
                  track-prep --high high_popularity_spotify_data.csv --low low_popularity_spotify_data.csv\n\n  \
                  # Single pre-merged export\n  \
                  track-prep -i dataset_spotify.csv -o outputs/\n\n  \
                  # Preview without writing\n  \
                  track-prep -i dataset_spotify.csv --dry-run"
)]
struct Args {
    /// High-popularity export (use with --low)
    #[arg(long, requires = "low", conflicts_with = "input")]
    high: Option<PathBuf>,

    /// Low-popularity export (use with --high)
    #[arg(long, requires = "high")]
    low: Option<PathBuf>,

    /// Single pre-merged export
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON configuration file; flags given on the command line override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output file name (without extension)
    #[arg(long)]
    output_name: Option<String>,

    /// Release date format (chrono syntax)
    #[arg(long)]
    date_format: Option<String>,

    /// Load and reconcile the sources, then show what would happen
    #[arg(long)]
    dry_run: bool,

    /// Fill missing release dates from the Spotify catalogue
    #[arg(long)]
    enrich_release_dates: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    quiet: bool,

    /// Output the run report as JSON on stdout instead of a summary
    ///
    /// Disables all logs so stdout carries only JSON.
    #[arg(long)]
    json: bool,

    /// Write the run report as <output-name>_report.json
    #[arg(short = 'r', long)]
    emit_report: bool,

    /// Write the dashboard views as <output-name>_views.json
    #[arg(long)]
    emit_views: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    // Catalogue credentials may live in .env
    dotenv().ok();

    let config = build_config(&args)?;

    if args.dry_run {
        return run_dry_run(&args, &config);
    }

    let pipeline = build_pipeline(&args, config)?;
    run_pipeline(&pipeline, &args)
}

/// Merge the config file (or defaults) with command-line overrides.
fn build_config(args: &Args) -> Result<PrepConfig> {
    let mut config = match &args.config {
        Some(path) => PrepConfig::from_json_file(path)?,
        None => PrepConfig::default(),
    };

    match (&args.high, &args.low, &args.input) {
        (Some(high), Some(low), _) => {
            config.layout = SourceLayout::Split {
                high: high.clone(),
                low: low.clone(),
            };
        }
        (_, _, Some(input)) => {
            config.layout = SourceLayout::Single {
                path: input.clone(),
            };
        }
        _ => {}
    }

    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if let Some(name) = &args.output_name {
        config.output_name = name.clone();
    }
    if let Some(format) = &args.date_format {
        config.date_format = format.clone();
    }

    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

#[cfg(feature = "catalogue")]
fn build_pipeline(args: &Args, config: PrepConfig) -> Result<Pipeline> {
    let mut builder = Pipeline::builder().config(config);

    if args.enrich_release_dates {
        let catalogue = SpotifyCatalogue::from_env()
            .map_err(|e| anyhow!("Cannot enrich release dates: {}", e))?;
        info!("Release dates will be looked up in the Spotify catalogue");
        builder = builder.catalogue(Arc::new(catalogue));
    }

    Ok(with_progress(builder, args).build()?)
}

#[cfg(not(feature = "catalogue"))]
fn build_pipeline(args: &Args, config: PrepConfig) -> Result<Pipeline> {
    if args.enrich_release_dates {
        tracing::warn!("Catalogue support not compiled in; release dates will not be enriched.");
        tracing::warn!("Compile with --features catalogue to enable it.");
    }
    Ok(with_progress(Pipeline::builder().config(config), args).build()?)
}

fn with_progress(builder: PipelineBuilder, args: &Args) -> PipelineBuilder {
    if args.quiet || args.json {
        return builder;
    }
    builder.on_progress(|update| {
        info!(
            "[{:.0}%] {}: {}",
            update.progress * 100.0,
            update.stage.display_name(),
            update.message
        );
    })
}

fn run_pipeline(pipeline: &Pipeline, args: &Args) -> Result<()> {
    info!("{}", "=".repeat(80));
    info!("Starting track preparation...");
    info!("{}", "=".repeat(80));

    let prepared = pipeline.run().map_err(|e| {
        error!("Pipeline failed: {}", e);
        anyhow!("Pipeline failed: {}", e)
    })?;

    let config = pipeline.config();
    let generator = ReportGenerator::from_config(config);
    let table_path = generator.table_path();
    let report = PrepReport::build(config, Some(&table_path), &prepared);

    if args.emit_views {
        let snapshot = DashboardSnapshot::build(&prepared.table)?;
        let path = generator.write_views_to_file(&snapshot)?;
        info!("Views written to: {}", path.display());
    }

    if args.emit_report {
        let path = generator.write_report_to_file(&report)?;
        info!("Report written to: {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_human_readable_summary(&report, &prepared);
    Ok(())
}

/// Show what a run would do without writing anything.
///
/// Uses `println!` on purpose: this output is the point of `--dry-run` and
/// must not depend on the log level.
fn run_dry_run(args: &Args, config: &PrepConfig) -> Result<()> {
    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of preparation steps");
    println!("{}\n", "=".repeat(80));

    let ingested = ingest::ingest(config)?;
    let table = &ingested.table;

    println!("SOURCES ({} layout)", config.layout.name());
    println!("{}", "-".repeat(40));
    for source in &ingested.rows_per_source {
        println!("  {:<8} {} rows", source.source, source.rows);
    }
    println!("  Reconciled: {} rows x {} columns", table.height(), table.width());
    if !ingested.projected_away.is_empty() {
        println!(
            "  Low-source columns projected away: {}",
            ingested.projected_away.join(", ")
        );
    }
    println!();

    println!("COLUMNS");
    println!("{}", "-".repeat(40));
    println!("{:<32} {:<12} {:<10}", "Column", "Kind", "Missing");
    println!("{}", "-".repeat(56));
    let schema = TrackSchema::source();
    for column in table.get_columns() {
        println!(
            "{:<32} {:<12} {:<10}",
            truncate_str(column.name(), 31),
            schema.kind_of(column.name()).to_string(),
            column.null_count()
        );
    }
    println!();

    println!("CLEANING PREVIEW");
    println!("{}", "-".repeat(40));
    let rejected = ingested.conform.total_rejected();
    if rejected > 0 {
        for (column, count) in &ingested.conform.rejected_values {
            println!("  {} value(s) in '{}' fail their declared kind", count, column);
        }
    }
    let complete = drop_incomplete(table)?;
    println!(
        "  Will drop {} row(s) with missing values",
        table.height() - complete.height()
    );
    let (_, duplicates) = drop_duplicates(&complete, &config.identifier_columns())?;
    println!("  Will remove {} duplicate row(s)", duplicates);

    if table.column(&config.release_date_column).is_ok() {
        println!(
            "  Will derive release year/month/day from '{}' ({})",
            config.release_date_column, config.date_format
        );
    } else {
        println!(
            "  No '{}' column; release fields will not be derived",
            config.release_date_column
        );
    }

    let identifiers: Vec<String> = config
        .identifier_columns()
        .into_iter()
        .filter(|c| table.column(c).is_ok())
        .collect();
    if identifiers.is_empty() {
        println!("  No identifier columns to drop");
    } else {
        println!("  Will drop identifier columns: {}", identifiers.join(", "));
    }
    if args.enrich_release_dates {
        println!("  Missing release dates would be looked up in the catalogue");
    }
    println!();

    println!("OUTPUT FILES (will be created)");
    println!("{}", "-".repeat(40));
    let generator = ReportGenerator::from_config(config);
    println!("  - {}", generator.table_path().display());
    if args.emit_report {
        println!(
            "  - {}",
            config
                .output_dir
                .join(format!("{}_report.json", config.output_name))
                .display()
        );
    }
    if args.emit_views {
        println!(
            "  - {}",
            config
                .output_dir
                .join(format!("{}_views.json", config.output_name))
                .display()
        );
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To run the preparation, run without --dry-run");
    println!("{}", "=".repeat(80));

    Ok(())
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn print_human_readable_summary(report: &PrepReport, prepared: &PreparedTracks) {
    let summary = &prepared.summary;

    println!();
    println!("{}", "=".repeat(80));
    println!("PREPARATION COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!("Input ({}):", report.layout);
    for source in &summary.rows_per_source {
        println!("  {:<8} {} rows", source.source, source.rows);
    }
    if let Some(ref output_file) = report.output_file {
        println!(
            "Output: {} ({} rows x {} columns)",
            output_file, summary.rows_after, summary.columns_after
        );
    }
    println!();

    println!("Summary:");
    println!("  Duration: {}ms", summary.duration_ms);
    println!(
        "  Rows: {} -> {} ({} removed, {:.1}%)",
        summary.rows_loaded,
        summary.rows_after,
        summary.rows_removed(),
        summary.rows_removed_percentage()
    );
    println!("  Incomplete rows dropped: {}", summary.incomplete_rows_dropped);
    println!("  Duplicates removed: {}", summary.duplicates_removed);
    if let Some(unparseable) = summary.unparseable_dates {
        println!("  Unparseable release dates: {}", unparseable);
    }
    if let Some(ref enrichment) = summary.enrichment {
        println!(
            "  Release dates from {}: {} found, {} unknown",
            enrichment.catalogue, enrichment.found, enrichment.unknown
        );
    }
    println!();

    if !summary.actions.is_empty() {
        println!("Actions Taken:");
        for action in &summary.actions {
            println!("  - {}", action);
        }
        println!();
    }

    if !summary.warnings.is_empty() {
        println!("Warnings:");
        for warning in &summary.warnings {
            println!("  ! {}", warning);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    println!("Use --emit-report to save the JSON report, --emit-views for dashboard data");
    println!("{}", "=".repeat(80));
}
