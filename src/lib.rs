//! Electrochemical Cycling Processor Library
//!
//! A Rust library for extracting charge/discharge half-cycles from
//! potentiostat text exports and pairing them into cycles.
//!
//! This library provides tools for:
//! - Reading Gamry `.DTA` files (one half-cycle per file) by locating the
//!   `CURVE TABLE` marker and its declared row count
//! - Reading EC-Lab `.mpt` files (one experiment per file) and splitting them
//!   by declared loops or by `ox/red` flag transitions
//! - Pairing half-cycles into cycles and reporting conflicts and gaps
//! - Estimating per-half-cycle capacity by trapezoid integration
//! - Exporting samples and capacities to Parquet or CSV

pub mod assembler;
pub mod capacity;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod processor;
pub mod reader;

// Re-export commonly used types
pub use assembler::{Assembled, CycleAssembler, assemble};
pub use capacity::CapacityEstimate;
pub use config::{FormatSelection, PolaritySource, ProcessorConfig, RowCountPolicy};
pub use error::{CyclerError, Result};
pub use models::{Cycle, FileReport, HalfCycle, Polarity, ProcessingStats, ScanOutcome};
pub use processor::DatasetProcessor;
pub use processor::writer::CycleWriter;
