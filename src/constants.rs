//! Application constants for the cycling data processor
//!
//! Marker tokens, column names and default values for the two supported
//! instrument export formats.

// =============================================================================
// Gamry DTA exports (one file per half-cycle)
// =============================================================================

pub mod dta {
    /// File extension of Gamry exports
    pub const EXTENSION: &str = "DTA";

    /// First token of the line announcing the data table (`CURVE\tTABLE\t<n>`)
    pub const CURVE_MARKER: &str = "CURVE";

    /// Column-name and units lines between the marker and the first data row
    pub const HEADER_LINES_AFTER_MARKER: usize = 2;

    /// Header field carrying the signed step current
    pub const STEP_CURRENT_LABEL: &str = "Step 1 Current (A)";

    /// Whitespace field index of the step current value (`ISTEP1 IQUANT <value> ...`)
    pub const STEP_CURRENT_FIELD: usize = 2;

    /// Filename tokens, matched case-insensitively
    pub const CHARGE_TOKEN: &str = "charge";
    pub const DISCHARGE_TOKEN: &str = "discharge";

    /// Field positions within a data row (`Pt T Vf Im ...`)
    pub const POINT_FIELD: usize = 0;
    pub const TIME_FIELD: usize = 1;
    pub const VOLTAGE_FIELD: usize = 2;
    pub const CURRENT_FIELD: usize = 3;
    pub const MIN_ROW_FIELDS: usize = 4;
}

// =============================================================================
// EC-Lab MPT exports (one file per experiment)
// =============================================================================

pub mod mpt {
    /// File extension of EC-Lab text exports
    pub const EXTENSION: &str = "mpt";

    /// Prefix of the column header line that starts the data table
    pub const COLUMN_HEADER_MARKER: &str = "mode\t";

    /// Header line declaring the number of loops
    pub const LOOP_COUNT_LABEL: &str = "Number of loops";

    /// Header line declaring the total header length
    pub const HEADER_LINES_LABEL: &str = "Nb header lines";

    pub const TIME_COLUMNS: &[&str] = &["time/s"];
    pub const VOLTAGE_COLUMNS: &[&str] = &["Ewe/V", "<Ewe>/V"];
    pub const CURRENT_COLUMNS: &[&str] = &["I/mA", "<I>/mA"];
    pub const FLAG_COLUMNS: &[&str] = &["ox/red"];

    /// Current is exported in milliamps
    pub const CURRENT_SCALE: f64 = 1000.0;

    /// Oxidation/reduction flag values
    pub const FLAG_OXIDATION: f64 = 1.0;
    pub const FLAG_REDUCTION: f64 = 0.0;

    /// Field separator of the data table
    pub const SEPARATOR: u8 = b'\t';
}

// =============================================================================
// Output
// =============================================================================

/// Column names of the long-format sample export
pub mod export_columns {
    pub const SOURCE: &str = "source";
    pub const CYCLE: &str = "cycle";
    pub const HALF_CYCLE: &str = "half_cycle";
    pub const TIME: &str = "time_s";
    pub const VOLTAGE: &str = "voltage_v";
    pub const CURRENT: &str = "current_a";

    /// Per-cycle capacity summary
    pub const CHARGE_POINTS: &str = "charge_points";
    pub const DISCHARGE_POINTS: &str = "discharge_points";
    pub const CHARGE_CAPACITY: &str = "charge_capacity";
    pub const DISCHARGE_CAPACITY: &str = "discharge_capacity";
}

/// Check whether a path carries the given extension, ignoring ASCII case
pub fn has_extension(path: &std::path::Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("Cell1_Charge.DTA"), dta::EXTENSION));
        assert!(has_extension(Path::new("cell1_charge.dta"), dta::EXTENSION));
        assert!(has_extension(Path::new("/data/run.mpt"), mpt::EXTENSION));
        assert!(!has_extension(Path::new("run.mpr"), mpt::EXTENSION));
        assert!(!has_extension(Path::new("DTA"), dta::EXTENSION));
    }

    #[test]
    fn test_discharge_token_contains_charge_token() {
        // Classification must test the longer token first
        assert!(dta::DISCHARGE_TOKEN.contains(dta::CHARGE_TOKEN));
    }
}
