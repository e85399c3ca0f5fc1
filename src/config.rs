//! Configuration management and validation.
//!
//! Provides configuration structures for the two readers: marker tokens,
//! column aliases, row count policy and polarity resolution rules.

use crate::constants::{dta, mpt};
use crate::error::{CyclerError, Result};
use serde::{Deserialize, Serialize};

/// How many rows to read after a `CURVE TABLE <n>` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum RowCountPolicy {
    /// Read exactly the declared count
    Declared,
    /// Read the declared count plus one
    PlusOne,
    /// Read the declared count, then one more row if it continues the point sequence
    Detect,
}

impl RowCountPolicy {
    /// Rows that must be read, and rows that may be read if present and well formed
    pub fn row_budget(self, declared: usize) -> (usize, usize) {
        match self {
            RowCountPolicy::Declared => (declared, 0),
            RowCountPolicy::PlusOne => (declared + 1, 0),
            RowCountPolicy::Detect => (declared, 1),
        }
    }
}

/// Where a DTA file's charge/discharge classification comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum PolaritySource {
    /// Only the signed step current in the header
    Header,
    /// Only the charge/discharge token in the filename
    Filename,
    /// Header sign when present, filename token otherwise
    Auto,
}

/// Which file formats a directory scan reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum FormatSelection {
    Auto,
    Dta,
    Mpt,
}

impl FormatSelection {
    pub fn includes_dta(self) -> bool {
        matches!(self, FormatSelection::Auto | FormatSelection::Dta)
    }

    pub fn includes_mpt(self) -> bool {
        matches!(self, FormatSelection::Auto | FormatSelection::Mpt)
    }
}

/// Gamry DTA reader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtaConfig {
    pub extension: String,
    pub curve_marker: String,
    /// Lines between the marker line and the first data row
    pub header_lines_after_marker: usize,
    pub step_current_label: String,
    pub charge_token: String,
    pub discharge_token: String,
    pub row_count: RowCountPolicy,
    pub polarity_source: PolaritySource,
}

impl Default for DtaConfig {
    fn default() -> Self {
        Self {
            extension: dta::EXTENSION.to_string(),
            curve_marker: dta::CURVE_MARKER.to_string(),
            header_lines_after_marker: dta::HEADER_LINES_AFTER_MARKER,
            step_current_label: dta::STEP_CURRENT_LABEL.to_string(),
            charge_token: dta::CHARGE_TOKEN.to_string(),
            discharge_token: dta::DISCHARGE_TOKEN.to_string(),
            row_count: RowCountPolicy::Detect,
            polarity_source: PolaritySource::Auto,
        }
    }
}

/// EC-Lab MPT reader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MptConfig {
    pub extension: String,
    pub column_header_marker: String,
    pub time_columns: Vec<String>,
    pub voltage_columns: Vec<String>,
    pub current_columns: Vec<String>,
    pub flag_columns: Vec<String>,
    /// Divisor turning the exported current into amps
    pub current_scale: f64,
    /// Treat the `to` row of a loop declaration as part of the loop
    pub loop_end_inclusive: bool,
}

impl Default for MptConfig {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|name| name.to_string()).collect();
        Self {
            extension: mpt::EXTENSION.to_string(),
            column_header_marker: mpt::COLUMN_HEADER_MARKER.to_string(),
            time_columns: owned(mpt::TIME_COLUMNS),
            voltage_columns: owned(mpt::VOLTAGE_COLUMNS),
            current_columns: owned(mpt::CURRENT_COLUMNS),
            flag_columns: owned(mpt::FLAG_COLUMNS),
            current_scale: mpt::CURRENT_SCALE,
            loop_end_inclusive: false,
        }
    }
}

/// Global configuration for a directory scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub formats: FormatSelection,
    pub dta: DtaConfig,
    pub mpt: MptConfig,
    /// Print banner, progress bar and summary to stdout
    pub show_progress: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            formats: FormatSelection::Auto,
            dta: DtaConfig::default(),
            mpt: MptConfig::default(),
            show_progress: false,
        }
    }
}

impl ProcessorConfig {
    /// Restrict the scan to one format
    pub fn with_formats(mut self, formats: FormatSelection) -> Self {
        self.formats = formats;
        self
    }

    /// Set the DTA row count policy
    pub fn with_row_count(mut self, policy: RowCountPolicy) -> Self {
        self.dta.row_count = policy;
        self
    }

    /// Set the DTA polarity source
    pub fn with_polarity_source(mut self, source: PolaritySource) -> Self {
        self.dta.polarity_source = source;
        self
    }

    /// Include the declared end row in each MPT loop
    pub fn with_loop_end_inclusive(mut self, inclusive: bool) -> Self {
        self.mpt.loop_end_inclusive = inclusive;
        self
    }

    /// Enable terminal progress output
    pub fn with_progress(mut self) -> Self {
        self.show_progress = true;
        self
    }

    /// Reject settings the readers cannot work with
    pub fn validate(&self) -> Result<()> {
        let dta = &self.dta;
        if dta.extension.is_empty() || self.mpt.extension.is_empty() {
            return Err(CyclerError::configuration("file extensions must not be empty"));
        }
        if dta.extension.eq_ignore_ascii_case(&self.mpt.extension) {
            return Err(CyclerError::configuration(
                "DTA and MPT extensions must differ",
            ));
        }
        if dta.curve_marker.trim().is_empty() {
            return Err(CyclerError::configuration("curve marker must not be empty"));
        }
        if dta.charge_token.is_empty() || dta.discharge_token.is_empty() {
            return Err(CyclerError::configuration("polarity tokens must not be empty"));
        }
        if dta.charge_token.eq_ignore_ascii_case(&dta.discharge_token) {
            return Err(CyclerError::configuration(
                "charge and discharge tokens must differ",
            ));
        }
        if self.mpt.column_header_marker.is_empty() {
            return Err(CyclerError::configuration(
                "column header marker must not be empty",
            ));
        }
        for (name, aliases) in [
            ("time", &self.mpt.time_columns),
            ("voltage", &self.mpt.voltage_columns),
            ("current", &self.mpt.current_columns),
            ("ox/red flag", &self.mpt.flag_columns),
        ] {
            if aliases.is_empty() {
                return Err(CyclerError::configuration(format!(
                    "no column names configured for {}",
                    name
                )));
            }
        }
        if !self.mpt.current_scale.is_finite() || self.mpt.current_scale <= 0.0 {
            return Err(CyclerError::configuration(format!(
                "current scale must be a positive number, got {}",
                self.mpt.current_scale
            )));
        }
        Ok(())
    }
}
