//! Export module for assembled cycles
//!
//! Flattens cycle aggregates into long-format sample tables and per-cycle
//! capacity summaries, written as Snappy-compressed Parquet or as CSV
//! depending on the output extension.

use crate::constants::export_columns as columns;
use crate::error::{CyclerError, Result};
use crate::models::{Cycle, HalfCycle};

use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Output file formats, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Parquet,
    Csv,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("parquet") => Ok(ExportFormat::Parquet),
            Some("csv") => Ok(ExportFormat::Csv),
            _ => Err(CyclerError::configuration(format!(
                "unsupported export file {}, expected a .parquet or .csv extension",
                path.display()
            ))),
        }
    }
}

/// Writer for cycle exports
#[derive(Debug, Clone)]
pub struct CycleWriter {
    output_path: PathBuf,
    format: ExportFormat,
}

impl CycleWriter {
    /// Create a writer, rejecting unsupported extensions up front
    pub fn new(output_path: impl Into<PathBuf>) -> Result<Self> {
        let output_path = output_path.into();
        let format = ExportFormat::from_path(&output_path)?;
        Ok(Self {
            output_path,
            format,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Write every sample of every cycle, returning the row count
    pub fn write_samples(&self, cycles: &[Cycle]) -> Result<usize> {
        let mut df = sample_frame(cycles)?;
        self.write_frame(&mut df)?;
        Ok(df.height())
    }

    /// Write one capacity row per cycle, returning the row count
    pub fn write_capacities(&self, cycles: &[Cycle]) -> Result<usize> {
        let mut df = capacity_frame(cycles)?;
        self.write_frame(&mut df)?;
        Ok(df.height())
    }

    fn write_frame(&self, df: &mut DataFrame) -> Result<()> {
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&self.output_path)?;
        match self.format {
            ExportFormat::Parquet => {
                ParquetWriter::new(file)
                    .with_compression(ParquetCompression::Snappy)
                    .finish(df)
                    .map_err(|e| CyclerError::ProcessingFailed {
                        path: self.output_path.clone(),
                        reason: format!("Failed to write parquet: {}", e),
                    })?;
            }
            ExportFormat::Csv => {
                CsvWriter::new(file)
                    .include_header(true)
                    .finish(df)
                    .map_err(|e| CyclerError::ProcessingFailed {
                        path: self.output_path.clone(),
                        reason: format!("Failed to write csv: {}", e),
                    })?;
            }
        }

        debug!(
            "Wrote {} rows to {}",
            df.height(),
            self.output_path.display()
        );
        Ok(())
    }
}

/// Long-format table: one row per sample, charge before discharge in each cycle
pub fn sample_frame(cycles: &[Cycle]) -> Result<DataFrame> {
    let rows: usize = cycles
        .iter()
        .flat_map(Cycle::halves)
        .map(HalfCycle::len)
        .sum();

    let mut source: Vec<&str> = Vec::with_capacity(rows);
    let mut cycle_index: Vec<u32> = Vec::with_capacity(rows);
    let mut half_cycle: Vec<&str> = Vec::with_capacity(rows);
    let mut time = Vec::with_capacity(rows);
    let mut voltage = Vec::with_capacity(rows);
    let mut current = Vec::with_capacity(rows);

    for cycle in cycles {
        for half in cycle.halves() {
            let n = half.len();
            source.extend(std::iter::repeat_n(cycle.origin.as_str(), n));
            cycle_index.extend(std::iter::repeat_n(cycle.index, n));
            half_cycle.extend(std::iter::repeat_n(half.polarity().label(), n));
            time.extend_from_slice(half.time());
            voltage.extend_from_slice(half.voltage());
            current.extend_from_slice(half.current());
        }
    }

    let df = df!(
        columns::SOURCE => source,
        columns::CYCLE => cycle_index,
        columns::HALF_CYCLE => half_cycle,
        columns::TIME => time,
        columns::VOLTAGE => voltage,
        columns::CURRENT => current
    )?;
    Ok(df)
}

/// Per-cycle summary; a missing side leaves its columns null
pub fn capacity_frame(cycles: &[Cycle]) -> Result<DataFrame> {
    let points = |half: Option<&HalfCycle>| half.map(|h| h.len() as u32);
    let capacity = |half: Option<&HalfCycle>| half.map(|h| h.capacity().capacity);

    let source: Vec<&str> = cycles.iter().map(|c| c.origin.as_str()).collect();
    let cycle_index: Vec<u32> = cycles.iter().map(|c| c.index).collect();
    let charge_points: Vec<Option<u32>> = cycles.iter().map(|c| points(c.charge())).collect();
    let discharge_points: Vec<Option<u32>> =
        cycles.iter().map(|c| points(c.discharge())).collect();
    let charge_capacity: Vec<Option<f64>> = cycles.iter().map(|c| capacity(c.charge())).collect();
    let discharge_capacity: Vec<Option<f64>> =
        cycles.iter().map(|c| capacity(c.discharge())).collect();

    let df = df!(
        columns::SOURCE => source,
        columns::CYCLE => cycle_index,
        columns::CHARGE_POINTS => charge_points,
        columns::DISCHARGE_POINTS => discharge_points,
        columns::CHARGE_CAPACITY => charge_capacity,
        columns::DISCHARGE_CAPACITY => discharge_capacity
    )?;
    Ok(df)
}
