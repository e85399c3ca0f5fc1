//! Main processing engine.
//!
//! Orchestrates a directory scan: file discovery, per-file reading on
//! blocking tasks, cycle assembly per scan unit and the final statistics.
//! DTA files of the directory form one scan unit; each MPT file is its own.

pub mod discovery;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::discovery::{DiscoveredFiles, FileDiscovery};

use crate::assembler::assemble;
use crate::config::ProcessorConfig;
use crate::error::{CyclerError, Result};
use crate::models::{FileReport, HalfCycle, ProcessingStats, ScanOutcome, SourceFormat};
use crate::reader::dta::{DtaCurve, dta_half_cycles, read_dta_file};
use crate::reader::mpt::{MptExperiment, read_mpt_file};

use colored::*;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{debug, error, info};

/// Main processor for one data directory
#[derive(Debug)]
pub struct DatasetProcessor {
    data_dir: PathBuf,
    config: Arc<ProcessorConfig>,
    file_discovery: FileDiscovery,
}

impl DatasetProcessor {
    /// Create a new processor for `data_dir`
    pub fn new(data_dir: PathBuf, config: ProcessorConfig) -> Result<Self> {
        config.validate()?;

        if !data_dir.is_dir() {
            return Err(CyclerError::DirectoryNotFound { path: data_dir });
        }

        Ok(Self {
            file_discovery: FileDiscovery::new(data_dir.clone()),
            data_dir,
            config: Arc::new(config),
        })
    }

    /// Label of the DTA scan unit: the directory name
    pub fn directory_label(&self) -> String {
        self.data_dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.data_dir.display().to_string())
    }

    /// Main processing entry point
    pub async fn process(&self) -> Result<ScanOutcome> {
        let start_time = Instant::now();
        let show = self.config.show_progress;

        if show {
            println!("{}", "Starting cycling data extraction".bright_green().bold());
            println!("  {} {}", "Directory:".bright_cyan(), self.data_dir.display());
            println!("\n{}", "Discovering files...".bright_yellow());
        }

        let files = self.file_discovery.discover(&self.config).await?;
        info!(
            "Discovered {} DTA and {} MPT files",
            files.dta.len(),
            files.mpt.len()
        );

        if show {
            println!(
                "  {} {} DTA and {} MPT files",
                "Found".bright_green(),
                files.dta.len().to_string().bright_white().bold(),
                files.mpt.len().to_string().bright_white().bold()
            );
            println!("\n{}", "Reading files...".bright_yellow());
        }

        let progress = self.progress_bar(&files);
        let mut outcome = ScanOutcome::default();

        self.process_dta_unit(&files.dta, &progress, &mut outcome)
            .await?;
        self.process_mpt_files(&files.mpt, &progress, &mut outcome)
            .await?;

        progress.finish_and_clear();

        outcome.stats = summarize(&outcome, start_time.elapsed().as_millis());
        if show {
            print_summary(&outcome);
        }

        Ok(outcome)
    }

    /// Read every DTA file, then assign indices and assemble them as one unit
    async fn process_dta_unit(
        &self,
        paths: &[PathBuf],
        progress: &ProgressBar,
        outcome: &mut ScanOutcome,
    ) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let results = stream::iter(paths)
            .then(|path| async move {
                progress.set_message(format!("Reading: {}", file_name(path)));
                let result = self
                    .run_reader(path, |path, config| read_dta_file(path, &config.dta))
                    .await;
                progress.inc(1);
                (path, result)
            })
            .collect::<Vec<_>>()
            .await;

        let mut curves = Vec::new();
        for (path, result) in results {
            match result {
                Ok(curve) => {
                    outcome.reports.push(dta_report(&curve));
                    curves.push(curve);
                }
                Err(e) if e.is_per_file() => {
                    error!("Failed to process {}: {}", path.display(), e);
                    outcome
                        .reports
                        .push(FileReport::failed(path, SourceFormat::Dta, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        let halves = dta_half_cycles(curves)?;
        self.assemble_unit(&self.directory_label(), halves, outcome);
        Ok(())
    }

    /// Read and assemble each MPT file as its own unit, in sorted order
    async fn process_mpt_files(
        &self,
        paths: &[PathBuf],
        progress: &ProgressBar,
        outcome: &mut ScanOutcome,
    ) -> Result<()> {
        for path in paths {
            progress.set_message(format!("Reading: {}", file_name(path)));
            let result = self
                .run_reader(path, |path, config| read_mpt_file(path, &config.mpt))
                .await;
            progress.inc(1);

            match result {
                Ok(experiment) => {
                    outcome.reports.push(mpt_report(&experiment));
                    self.assemble_unit(&file_name(path), experiment.half_cycles, outcome);
                }
                Err(e) if e.is_per_file() => {
                    error!("Failed to process {}: {}", path.display(), e);
                    outcome.reports.push(FileReport::failed(
                        path,
                        SourceFormat::Mpt,
                        e.to_string(),
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn assemble_unit(&self, origin: &str, halves: Vec<HalfCycle>, outcome: &mut ScanOutcome) {
        let assembled = assemble(origin, halves);
        debug!(
            "{}: {} cycles, {} incomplete, {} conflicts",
            origin,
            assembled.cycles.len(),
            assembled.incomplete.len(),
            assembled.conflicts.len()
        );

        outcome.stats.incomplete_cycles += assembled.incomplete.len();
        outcome.cycles.extend(assembled.cycles);
        outcome.conflicts.extend(assembled.conflicts);
    }

    /// Run a synchronous reader on the blocking pool
    async fn run_reader<T, F>(&self, path: &Path, read: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path, &ProcessorConfig) -> Result<T> + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let owned_path = path.to_path_buf();

        task::spawn_blocking(move || read(&owned_path, &config))
            .await
            .map_err(|e| CyclerError::ProcessingFailed {
                path: path.to_path_buf(),
                reason: format!("Reader task failed: {}", e),
            })?
    }

    fn progress_bar(&self, files: &DiscoveredFiles) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(files.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn dta_report(curve: &DtaCurve) -> FileReport {
    FileReport {
        half_cycles: 1,
        rows_read: curve.samples.len() + curve.malformed_rows,
        malformed_rows: curve.malformed_rows,
        warnings: curve.warnings.clone(),
        ..FileReport::new(&curve.path, SourceFormat::Dta)
    }
}

fn mpt_report(experiment: &MptExperiment) -> FileReport {
    FileReport {
        half_cycles: experiment.half_cycles.len(),
        rows_read: experiment.rows_read,
        malformed_rows: experiment.malformed_rows,
        warnings: experiment.warnings.clone(),
        ..FileReport::new(&experiment.path, SourceFormat::Mpt)
    }
}

fn summarize(outcome: &ScanOutcome, processing_time_ms: u128) -> ProcessingStats {
    let files_failed = outcome.failed_reports().count();
    ProcessingStats {
        files_processed: outcome.reports.len() - files_failed,
        files_failed,
        half_cycles: outcome.reports.iter().map(|r| r.half_cycles).sum(),
        cycles: outcome.cycles.len(),
        incomplete_cycles: outcome.stats.incomplete_cycles,
        conflicts: outcome.conflicts.len(),
        malformed_rows: outcome.reports.iter().map(|r| r.malformed_rows).sum(),
        processing_time_ms,
    }
}

fn print_summary(outcome: &ScanOutcome) {
    let stats = &outcome.stats;
    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        stats.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files processed:".bright_cyan(),
        stats.files_processed.to_string().bright_white()
    );
    if stats.files_failed > 0 {
        println!(
            "  {} {}",
            "Files failed:".bright_red(),
            stats.files_failed.to_string().bright_red().bold()
        );
        for report in outcome.failed_reports() {
            println!(
                "    {} {}",
                report.file_name().red(),
                report.failure.as_deref().unwrap_or_default()
            );
        }
    }
    println!(
        "  {} {}",
        "Cycles:".bright_cyan(),
        stats.cycles.to_string().bright_white().bold()
    );
    if stats.incomplete_cycles > 0 {
        println!(
            "  {} {}",
            "Incomplete pairs:".bright_yellow(),
            stats.incomplete_cycles.to_string().bright_yellow()
        );
    }
    if stats.conflicts > 0 {
        println!(
            "  {} {}",
            "Polarity conflicts:".bright_red(),
            stats.conflicts.to_string().bright_red()
        );
    }
    if stats.malformed_rows > 0 {
        println!(
            "  {} {}",
            "Malformed rows:".bright_yellow(),
            stats.malformed_rows.to_string().bright_yellow()
        );
    }
}
