//! Core data structures and types for cycling data extraction.
//!
//! Defines half-cycle records, cycle aggregates, per-file reports and
//! processing statistics used throughout the library.

use crate::capacity::CapacityEstimate;
use crate::constants::mpt;
use crate::error::{CyclerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Direction of current flow within a half-cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Charge,
    Discharge,
}

impl Polarity {
    /// Classify from the sign of a current; zero and NaN carry no polarity
    pub fn from_current(current: f64) -> Option<Self> {
        if current > 0.0 {
            Some(Polarity::Charge)
        } else if current < 0.0 {
            Some(Polarity::Discharge)
        } else {
            None
        }
    }

    /// Classify from an EC-Lab oxidation/reduction flag value
    pub fn from_flag(flag: f64) -> Option<Self> {
        if flag == mpt::FLAG_OXIDATION {
            Some(Polarity::Charge)
        } else if flag == mpt::FLAG_REDUCTION {
            Some(Polarity::Discharge)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Polarity::Charge => "charge",
            Polarity::Discharge => "discharge",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Instrument export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    /// Gamry, one file per half-cycle
    Dta,
    /// EC-Lab, one file per experiment
    Mpt,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Dta => f.write_str("DTA"),
            SourceFormat::Mpt => f.write_str("MPT"),
        }
    }
}

/// Aligned time/voltage/current columns under construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Samples {
    pub time: Vec<f64>,
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
}

impl Samples {
    pub fn push(&mut self, time: f64, voltage: f64, current: f64) {
        self.time.push(time);
        self.voltage.push(voltage);
        self.current.push(current);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Move the buffered samples out, leaving an empty buffer behind
    pub fn take(&mut self) -> Samples {
        std::mem::take(self)
    }
}

/// One charge or discharge segment: the common output unit of both readers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HalfCycle {
    cycle_index: u32,
    polarity: Polarity,
    path: PathBuf,
    time: Vec<f64>,
    voltage: Vec<f64>,
    current: Vec<f64>,
}

impl HalfCycle {
    /// Build a record; an empty sample set is a segmentation failure
    pub fn new(
        cycle_index: u32,
        polarity: Polarity,
        path: impl Into<PathBuf>,
        samples: Samples,
    ) -> Result<Self> {
        let path = path.into();
        if samples.is_empty() {
            return Err(CyclerError::EmptyHalfCycle {
                origin: path.display().to_string(),
                cycle_index,
                polarity,
            });
        }
        let Samples {
            time,
            voltage,
            current,
        } = samples;
        debug_assert!(time.len() == voltage.len() && time.len() == current.len());

        Ok(Self {
            cycle_index,
            polarity,
            path,
            time,
            voltage,
            current,
        })
    }

    pub fn cycle_index(&self) -> u32 {
        self.cycle_index
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// File the samples were read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn voltage(&self) -> &[f64] {
        &self.voltage
    }

    /// Current in amps
    pub fn current(&self) -> &[f64] {
        &self.current
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Always false for a constructed record
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Elapsed time between first and last sample
    pub fn duration(&self) -> f64 {
        match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    pub fn is_time_monotonic(&self) -> bool {
        self.time.windows(2).all(|pair| pair[0] <= pair[1])
    }

    pub fn capacity(&self) -> CapacityEstimate {
        CapacityEstimate::from_series(&self.time, &self.current)
    }
}

/// A charge and a discharge half-cycle sharing one index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cycle {
    pub index: u32,
    /// Label of the scan unit the cycle came from (directory or experiment file)
    pub origin: String,
    charge: Option<HalfCycle>,
    discharge: Option<HalfCycle>,
}

impl Cycle {
    pub fn new(index: u32, origin: impl Into<String>) -> Self {
        Self {
            index,
            origin: origin.into(),
            charge: None,
            discharge: None,
        }
    }

    pub fn charge(&self) -> Option<&HalfCycle> {
        self.charge.as_ref()
    }

    pub fn discharge(&self) -> Option<&HalfCycle> {
        self.discharge.as_ref()
    }

    pub fn half(&self, polarity: Polarity) -> Option<&HalfCycle> {
        match polarity {
            Polarity::Charge => self.charge.as_ref(),
            Polarity::Discharge => self.discharge.as_ref(),
        }
    }

    pub(crate) fn slot_mut(&mut self, polarity: Polarity) -> &mut Option<HalfCycle> {
        match polarity {
            Polarity::Charge => &mut self.charge,
            Polarity::Discharge => &mut self.discharge,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.charge.is_some() && self.discharge.is_some()
    }

    /// The side still unset, if exactly one is
    pub fn missing(&self) -> Option<Polarity> {
        match (&self.charge, &self.discharge) {
            (Some(_), None) => Some(Polarity::Discharge),
            (None, Some(_)) => Some(Polarity::Charge),
            _ => None,
        }
    }

    /// Populated half-cycles, charge first
    pub fn halves(&self) -> impl Iterator<Item = &HalfCycle> {
        self.charge.iter().chain(self.discharge.iter())
    }
}

/// Outcome of reading a single source file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub half_cycles: usize,
    pub rows_read: usize,
    pub malformed_rows: usize,
    pub warnings: Vec<String>,
    /// Reason the file contributed nothing, if it failed
    pub failure: Option<String>,
}

impl FileReport {
    pub fn new(path: impl Into<PathBuf>, format: SourceFormat) -> Self {
        Self {
            path: path.into(),
            format,
            half_cycles: 0,
            rows_read: 0,
            malformed_rows: 0,
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn failed(path: impl Into<PathBuf>, format: SourceFormat, reason: String) -> Self {
        Self {
            failure: Some(reason),
            ..Self::new(path, format)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Two half-cycles of the same polarity mapped to one index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolarityConflict {
    pub origin: String,
    pub cycle_index: u32,
    pub polarity: Polarity,
    pub paths: Vec<PathBuf>,
}

/// Processing statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub half_cycles: usize,
    pub cycles: usize,
    pub incomplete_cycles: usize,
    pub conflicts: usize,
    pub malformed_rows: usize,
    pub processing_time_ms: u128,
}

/// Everything a directory scan produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOutcome {
    pub cycles: Vec<Cycle>,
    pub reports: Vec<FileReport>,
    pub conflicts: Vec<PolarityConflict>,
    pub stats: ProcessingStats,
}

impl ScanOutcome {
    pub fn complete_cycles(&self) -> impl Iterator<Item = &Cycle> {
        self.cycles.iter().filter(|cycle| cycle.is_complete())
    }

    pub fn failed_reports(&self) -> impl Iterator<Item = &FileReport> {
        self.reports.iter().filter(|report| report.is_failed())
    }
}
