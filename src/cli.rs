//! Command-line interface components.

use crate::config::{FormatSelection, PolaritySource, ProcessorConfig, RowCountPolicy};
use crate::models::{Cycle, HalfCycle, ScanOutcome};
use crate::processor::DatasetProcessor;
use crate::processor::writer::CycleWriter;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "echem-processor")]
#[command(about = "Extract charge/discharge cycles from Gamry DTA and EC-Lab MPT exports")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Directory holding the instrument exports
    #[arg(value_name = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// Which formats to read (auto reads both)
    #[arg(long, value_enum, default_value_t = FormatSelection::Auto)]
    pub format: FormatSelection,

    /// Write every sample of every cycle to this .parquet or .csv file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write per-cycle capacities to this .parquet or .csv file
    #[arg(long)]
    pub capacity_output: Option<PathBuf>,

    /// How many rows to read after a DTA `CURVE TABLE <n>` marker
    #[arg(long, value_enum, default_value_t = RowCountPolicy::Detect)]
    pub row_count: RowCountPolicy,

    /// Where DTA charge/discharge classification comes from
    #[arg(long, value_enum, default_value_t = PolaritySource::Auto)]
    pub polarity: PolaritySource,

    /// Include the declared end row in each MPT loop
    #[arg(long)]
    pub loop_end_inclusive: bool,

    /// Disable the progress bar and summary
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Build the processor configuration from the flags
    pub fn to_config(&self) -> ProcessorConfig {
        let config = ProcessorConfig::default()
            .with_formats(self.format)
            .with_row_count(self.row_count)
            .with_polarity_source(self.polarity)
            .with_loop_end_inclusive(self.loop_end_inclusive);

        if self.quiet || self.no_progress {
            config
        } else {
            config.with_progress()
        }
    }
}

/// Scan the directory, print the cycle table and write the requested exports
pub async fn run(args: Args) -> Result<ScanOutcome> {
    setup_logging(&args)?;

    // Fail on a bad export path before reading anything
    let sample_writer = args.output.as_ref().map(CycleWriter::new).transpose()?;
    let capacity_writer = args
        .capacity_output
        .as_ref()
        .map(CycleWriter::new)
        .transpose()?;

    let processor = DatasetProcessor::new(args.data_dir.clone(), args.to_config())
        .with_context(|| format!("Cannot scan {}", args.data_dir.display()))?;
    let outcome = processor.process().await?;

    if !args.quiet {
        print_cycle_table(&outcome.cycles);
    }

    if let Some(writer) = sample_writer {
        let rows = writer
            .write_samples(&outcome.cycles)
            .with_context(|| format!("Failed to export samples to {}", writer.output_path().display()))?;
        report_export("samples", rows, &writer);
    }
    if let Some(writer) = capacity_writer {
        let rows = writer
            .write_capacities(&outcome.cycles)
            .with_context(|| {
                format!("Failed to export capacities to {}", writer.output_path().display())
            })?;
        report_export("capacity rows", rows, &writer);
    }

    Ok(outcome)
}

fn report_export(what: &str, rows: usize, writer: &CycleWriter) {
    println!(
        "  {} {} {} to {}",
        "Wrote".bright_green(),
        rows.to_string().bright_white().bold(),
        what,
        writer.output_path().display()
    );
}

/// Set up structured logging based on CLI arguments
fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("echem_processor={}", log_level)));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

fn half_columns(half: Option<&HalfCycle>) -> (String, String) {
    match half {
        Some(half) => (
            half.len().to_string(),
            format!("{:.4e}", half.capacity().capacity),
        ),
        None => ("-".to_string(), "-".to_string()),
    }
}

/// One line per cycle: index, source, sample counts and capacities
pub fn print_cycle_table(cycles: &[Cycle]) {
    if cycles.is_empty() {
        println!("\n{}", "No cycles found".bright_yellow());
        return;
    }

    let source_width = cycles
        .iter()
        .map(|cycle| cycle.origin.len())
        .max()
        .unwrap_or(0)
        .max("Source".len());

    println!("\n{}", "Cycles".bright_green().bold());
    println!(
        "  {:>5}  {:<width$}  {:>10}  {:>13}  {:>12}  {:>13}",
        "Cycle",
        "Source",
        "Charge pts",
        "Discharge pts",
        "Charge cap",
        "Discharge cap",
        width = source_width
    );

    for cycle in cycles {
        let (charge_points, charge_capacity) = half_columns(cycle.charge());
        let (discharge_points, discharge_capacity) = half_columns(cycle.discharge());
        let line = format!(
            "  {:>5}  {:<width$}  {:>10}  {:>13}  {:>12}  {:>13}",
            cycle.index,
            cycle.origin,
            charge_points,
            discharge_points,
            charge_capacity,
            discharge_capacity,
            width = source_width
        );

        if cycle.is_complete() {
            println!("{}", line);
        } else {
            println!("{}", line.yellow());
        }
    }
}
