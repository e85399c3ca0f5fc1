//! Instrument export readers.
//!
//! Both readers turn one source file into half-cycle records; cycle
//! assembly happens in the orchestrator.

pub mod dta;
pub mod mpt;

pub use dta::{DtaCurve, dta_half_cycles, read_dta_file};
pub use mpt::{MptExperiment, MptVariant, read_mpt_file};
