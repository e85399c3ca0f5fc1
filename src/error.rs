//! Error handling for cycling data extraction.
//!
//! Provides error types with file context for marker detection, row parsing,
//! half-cycle segmentation and cycle assembly failures.

use crate::models::Polarity;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CyclerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Data directory not found at path: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("File discovery failed for pattern {pattern}: {reason}")]
    Discovery { pattern: String, reason: String },

    #[error("No '{marker}' marker found in file: {path}")]
    MarkerNotFound { path: PathBuf, marker: String },

    #[error("Malformed row at line {line} in file: {path} - {reason}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Cannot determine charge/discharge polarity for file: {path}")]
    UnknownPolarity { path: PathBuf },

    #[error("Invalid loop table in file: {path} - {reason}")]
    LoopRange { path: PathBuf, reason: String },

    #[error("Missing column in file: {path} - expected one of {candidates:?}")]
    MissingColumn {
        path: PathBuf,
        candidates: Vec<String>,
    },

    #[error("Half-cycle {cycle_index} ({polarity}) from {origin} has no samples")]
    EmptyHalfCycle {
        origin: String,
        cycle_index: u32,
        polarity: Polarity,
    },

    #[error("Polarity conflict in {origin}: two {polarity} half-cycles claim cycle {cycle_index}")]
    PolarityConflict {
        origin: String,
        cycle_index: u32,
        polarity: Polarity,
    },

    #[error("Processing failed for file: {path} - {reason}")]
    ProcessingFailed { path: PathBuf, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing interrupted: {reason}")]
    ProcessingInterrupted { reason: String },
}

impl CyclerError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a processing interrupted error
    pub fn processing_interrupted(reason: impl Into<String>) -> Self {
        Self::ProcessingInterrupted {
            reason: reason.into(),
        }
    }

    /// Whether this error only affects a single file and the directory scan may continue
    pub fn is_per_file(&self) -> bool {
        !matches!(
            self,
            CyclerError::DirectoryNotFound { .. }
                | CyclerError::Discovery { .. }
                | CyclerError::Configuration { .. }
                | CyclerError::ProcessingInterrupted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CyclerError>;
