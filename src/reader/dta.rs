//! Gamry DTA reader.
//!
//! Each file holds one half-cycle. A single pass over the file finds the
//! `CURVE TABLE <n>` marker, skips the column-name and units lines below it
//! and reads the declared number of data rows. The file is classified as
//! charge or discharge from the signed step current in the header and/or a
//! token in the filename.

use crate::config::{DtaConfig, PolaritySource};
use crate::constants::dta;
use crate::error::{CyclerError, Result};
use crate::models::{HalfCycle, Polarity, Samples};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One parsed DTA file, not yet assigned a cycle index
#[derive(Debug, Clone)]
pub struct DtaCurve {
    pub path: PathBuf,
    pub polarity: Polarity,
    /// Filename stem with the polarity token removed
    pub pair_key: Option<String>,
    pub declared_points: usize,
    pub samples: Samples,
    pub malformed_rows: usize,
    pub warnings: Vec<String>,
}

/// Facts gathered by one pass over a DTA file
#[derive(Debug, Default)]
pub struct DtaScan {
    pub header_polarity: Option<Polarity>,
    pub declared_points: usize,
    pub samples: Samples,
    pub malformed_rows: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    SeekingMarker,
    ReadingHeaderMeta { remaining: usize },
    /// `required` rows are always consumed; `optional` rows only when they
    /// continue the point sequence
    ReadingRows { required: usize, optional: usize },
    Done,
}

impl ScanState {
    fn rows(required: usize, optional: usize) -> Self {
        if required == 0 && optional == 0 {
            ScanState::Done
        } else {
            ScanState::ReadingRows { required, optional }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DataRow {
    point: f64,
    time: f64,
    voltage: f64,
    current: f64,
}

/// Read and classify one DTA file
pub fn read_dta_file(path: &Path, config: &DtaConfig) -> Result<DtaCurve> {
    let file = File::open(path)?;
    let scan = scan_dta(BufReader::new(file), path, config)?;

    if scan.samples.is_empty() {
        return Err(CyclerError::ProcessingFailed {
            path: path.to_path_buf(),
            reason: format!(
                "{} declared rows yielded no usable samples",
                scan.declared_points
            ),
        });
    }

    let polarity = resolve_polarity(path, scan.header_polarity, config)?;
    let pair_key = pair_key(path, config);

    debug!(
        "Read {}: {} with {} samples (declared {}), pair key {:?}",
        path.display(),
        polarity,
        scan.samples.len(),
        scan.declared_points,
        pair_key
    );

    Ok(DtaCurve {
        path: path.to_path_buf(),
        polarity,
        pair_key,
        declared_points: scan.declared_points,
        samples: scan.samples,
        malformed_rows: scan.malformed_rows,
        warnings: scan.warnings,
    })
}

/// Run the marker/header/rows state machine over a DTA stream
pub fn scan_dta<R: BufRead>(reader: R, path: &Path, config: &DtaConfig) -> Result<DtaScan> {
    let mut scan = DtaScan::default();
    let mut state = ScanState::SeekingMarker;
    let mut last_point: Option<f64> = None;
    let mut rows_seen = 0usize;

    for (line_num, line) in reader.split(b'\n').enumerate() {
        let bytes = line?;
        let text = String::from_utf8_lossy(&bytes);
        let line = text.trim_end_matches('\r');

        state = match state {
            ScanState::SeekingMarker => {
                if line.contains(config.step_current_label.as_str()) {
                    scan.header_polarity = parse_step_current(line);
                    debug!(
                        "{}: header step current gives {:?}",
                        path.display(),
                        scan.header_polarity
                    );
                }

                match parse_marker(line, &config.curve_marker) {
                    None => ScanState::SeekingMarker,
                    Some(Err(reason)) => {
                        return Err(CyclerError::MalformedRow {
                            path: path.to_path_buf(),
                            line: line_num + 1,
                            reason,
                        });
                    }
                    Some(Ok(declared)) => {
                        debug!(
                            "{}: {} marker at line {} declares {} points",
                            path.display(),
                            config.curve_marker,
                            line_num + 1,
                            declared
                        );
                        scan.declared_points = declared;
                        let (required, optional) = config.row_count.row_budget(declared);
                        if config.header_lines_after_marker > 0 {
                            ScanState::ReadingHeaderMeta {
                                remaining: config.header_lines_after_marker,
                            }
                        } else {
                            ScanState::rows(required, optional)
                        }
                    }
                }
            }
            ScanState::ReadingHeaderMeta { remaining } => {
                if remaining > 1 {
                    ScanState::ReadingHeaderMeta {
                        remaining: remaining - 1,
                    }
                } else {
                    let (required, optional) =
                        config.row_count.row_budget(scan.declared_points);
                    ScanState::rows(required, optional)
                }
            }
            ScanState::ReadingRows { required, optional } if required > 0 => {
                rows_seen += 1;
                match parse_row(line) {
                    Ok(row) => {
                        scan.samples.push(row.time, row.voltage, row.current);
                        last_point = Some(row.point);
                    }
                    Err(reason) => {
                        let err = CyclerError::MalformedRow {
                            path: path.to_path_buf(),
                            line: line_num + 1,
                            reason,
                        };
                        warn!("Skipping row: {}", err);
                        scan.malformed_rows += 1;
                        scan.warnings.push(err.to_string());
                    }
                }
                ScanState::rows(required - 1, optional)
            }
            ScanState::ReadingRows { .. } => {
                match parse_row(line) {
                    Ok(row) if last_point.is_some_and(|last| row.point == last + 1.0) => {
                        debug!(
                            "{}: consuming undeclared row {} after the declared table",
                            path.display(),
                            row.point
                        );
                        scan.samples.push(row.time, row.voltage, row.current);
                    }
                    _ => {}
                }
                ScanState::Done
            }
            ScanState::Done => ScanState::Done,
        };

        if state == ScanState::Done {
            break;
        }
    }

    match state {
        ScanState::SeekingMarker => Err(CyclerError::MarkerNotFound {
            path: path.to_path_buf(),
            marker: config.curve_marker.clone(),
        }),
        ScanState::ReadingHeaderMeta { .. } | ScanState::ReadingRows { required: 1.., .. } => {
            let message = format!(
                "{}: table declares {} rows but the file ends after {}",
                path.display(),
                scan.declared_points,
                rows_seen
            );
            warn!("{}", message);
            scan.warnings.push(message);
            Ok(scan)
        }
        ScanState::ReadingRows { .. } | ScanState::Done => Ok(scan),
    }
}

/// `Some` when the line is the table marker; the count must be the last token
fn parse_marker(line: &str, marker: &str) -> Option<std::result::Result<usize, String>> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some(marker) {
        return None;
    }

    let count = tokens.last().unwrap_or_default();
    Some(
        count
            .parse::<usize>()
            .map_err(|_| format!("unreadable point count '{}' on {} line", count, marker)),
    )
}

/// Sign of the step current field, e.g. `ISTEP1 IQUANT 0.001 Step 1 Current (A)`
fn parse_step_current(line: &str) -> Option<Polarity> {
    line.split_whitespace()
        .nth(dta::STEP_CURRENT_FIELD)
        .and_then(|value| value.parse::<f64>().ok())
        .and_then(Polarity::from_current)
}

fn parse_row(line: &str) -> std::result::Result<DataRow, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < dta::MIN_ROW_FIELDS {
        return Err(format!(
            "expected at least {} fields, found {}",
            dta::MIN_ROW_FIELDS,
            fields.len()
        ));
    }

    let number = |position: usize| {
        fields[position]
            .parse::<f64>()
            .map_err(|_| format!("field {} '{}' is not a number", position + 1, fields[position]))
    };

    Ok(DataRow {
        point: number(dta::POINT_FIELD)?,
        time: number(dta::TIME_FIELD)?,
        voltage: number(dta::VOLTAGE_FIELD)?,
        current: number(dta::CURRENT_FIELD)?,
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Polarity implied by the filename; the discharge token is tested first
/// because it contains the charge token
pub fn filename_polarity(path: &Path, config: &DtaConfig) -> Option<Polarity> {
    let stem = file_stem(path).to_ascii_lowercase();
    if stem.contains(&config.discharge_token.to_ascii_lowercase()) {
        Some(Polarity::Discharge)
    } else if stem.contains(&config.charge_token.to_ascii_lowercase()) {
        Some(Polarity::Charge)
    } else {
        None
    }
}

/// Filename stem with the polarity token cut out, e.g. `Cell1_Charge` -> `Cell1`
pub fn pair_key(path: &Path, config: &DtaConfig) -> Option<String> {
    let stem = file_stem(path);
    let lower = stem.to_ascii_lowercase();

    for token in [&config.discharge_token, &config.charge_token] {
        let token = token.to_ascii_lowercase();
        if let Some(position) = lower.find(&token) {
            let key = format!("{}{}", &stem[..position], &stem[position + token.len()..]);
            let key = key.trim_matches(|c: char| matches!(c, '_' | '-' | ' ' | '.'));
            return Some(key.to_string());
        }
    }
    None
}

/// Combine header and filename classification according to the configured source
pub fn resolve_polarity(
    path: &Path,
    header: Option<Polarity>,
    config: &DtaConfig,
) -> Result<Polarity> {
    let from_name = filename_polarity(path, config);

    let resolved = match config.polarity_source {
        PolaritySource::Header => header,
        PolaritySource::Filename => from_name,
        PolaritySource::Auto => {
            if let (Some(from_header), Some(named)) = (header, from_name) {
                if from_header != named {
                    warn!(
                        "{}: filename says {} but header step current says {}, using header",
                        path.display(),
                        named,
                        from_header
                    );
                }
            }
            header.or(from_name)
        }
    };

    resolved.ok_or_else(|| CyclerError::UnknownPolarity {
        path: path.to_path_buf(),
    })
}

/// Pair keys carried by both a charge and a discharge curve
fn matched_keys(curves: &[DtaCurve]) -> HashSet<&str> {
    let mut seen: HashMap<&str, (bool, bool)> = HashMap::new();
    for curve in curves {
        if let Some(key) = curve.pair_key.as_deref() {
            let sides = seen.entry(key).or_default();
            match curve.polarity {
                Polarity::Charge => sides.0 = true,
                Polarity::Discharge => sides.1 = true,
            }
        }
    }
    seen.into_iter()
        .filter(|(_, (charge, discharge))| *charge && *discharge)
        .map(|(key, _)| key)
        .collect()
}

/// Cycle index for each curve, in input order
///
/// Curves sharing a pair key that names both a charge and a discharge share
/// an index. Every other curve follows the sequential rule: a charge takes
/// the open index, a discharge takes it and closes it. Indices are handed out
/// from 1 in first-seen order.
pub fn assign_cycle_indices(curves: &[DtaCurve]) -> Vec<u32> {
    let matched = matched_keys(curves);
    let mut keyed: HashMap<&str, u32> = HashMap::new();
    let mut open_sequential: Option<u32> = None;
    let mut next_index = 1u32;
    let mut indices = Vec::with_capacity(curves.len());

    for curve in curves {
        let key = curve
            .pair_key
            .as_deref()
            .filter(|key| matched.contains(key));

        let index = match key {
            Some(key) => *keyed.entry(key).or_insert_with(|| {
                let index = next_index;
                next_index += 1;
                index
            }),
            None => {
                let index = match open_sequential {
                    Some(index) => index,
                    None => {
                        let index = next_index;
                        next_index += 1;
                        open_sequential = Some(index);
                        index
                    }
                };
                if curve.polarity == Polarity::Discharge {
                    open_sequential = None;
                }
                index
            }
        };
        indices.push(index);
    }

    indices
}

/// Turn filename-ordered curves into indexed half-cycle records
pub fn dta_half_cycles(curves: Vec<DtaCurve>) -> Result<Vec<HalfCycle>> {
    let indices = assign_cycle_indices(&curves);
    curves
        .into_iter()
        .zip(indices)
        .map(|(curve, index)| HalfCycle::new(index, curve.polarity, curve.path, curve.samples))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RowCountPolicy;
    use std::io::Cursor;

    const CHARGE_FILE: &str = "EXPLAIN\n\
TAG\tCHRONOP\n\
TITLE\tLABEL\tChronopotentiometry Scan\tTest &Identifier\n\
ISTEP1\tIQUANT\t0.1\tStep 1 Current (A)\n\
OCVCURVE\tTABLE\t2\n\
\tPt\tT\tVf\n\
\t#\ts\tV vs. Ref.\n\
\t0\t0.0\t3.0\n\
\t1\t0.5\t3.0\n\
CURVE\tTABLE\t3\n\
\tPt\tT\tVf\tIm\tVu\tSig\n\
\t#\ts\tV vs. Ref.\tA\tV\tV\n\
\t0\t0\t0.0\t0.1\t0\t0\n\
\t1\t1\t0.1\t0.1\t0\t0\n\
\t2\t2\t0.2\t0.1\t0\t0\n";

    fn scan(content: &str, config: &DtaConfig) -> Result<DtaScan> {
        scan_dta(Cursor::new(content.as_bytes()), Path::new("test.DTA"), config)
    }

    fn curve(name: &str, polarity: Polarity) -> DtaCurve {
        let config = DtaConfig::default();
        let mut samples = Samples::default();
        samples.push(0.0, 1.0, 0.1);
        DtaCurve {
            path: PathBuf::from(name),
            polarity,
            pair_key: pair_key(Path::new(name), &config),
            declared_points: 1,
            samples,
            malformed_rows: 0,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_reads_declared_rows_after_curve_marker() {
        let result = scan(CHARGE_FILE, &DtaConfig::default()).unwrap();

        assert_eq!(result.declared_points, 3);
        assert_eq!(result.samples.time, vec![0.0, 1.0, 2.0]);
        assert_eq!(result.samples.voltage, vec![0.0, 0.1, 0.2]);
        assert_eq!(result.samples.current, vec![0.1, 0.1, 0.1]);
        assert_eq!(result.header_polarity, Some(Polarity::Charge));
        assert_eq!(result.malformed_rows, 0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_ocv_table_is_not_the_marker() {
        assert_eq!(parse_marker("OCVCURVE\tTABLE\t2", "CURVE"), None);
        assert_eq!(parse_marker("CURVE\tTABLE\t42", "CURVE"), Some(Ok(42)));
        assert!(matches!(parse_marker("CURVE\tTABLE", "CURVE"), Some(Err(_))));
    }

    #[test]
    fn test_missing_marker() {
        let content = "EXPLAIN\nTAG\tCHRONOP\nNOTES\tNOTES\t1\tNotes...\n";
        match scan(content, &DtaConfig::default()) {
            Err(CyclerError::MarkerNotFound { marker, .. }) => assert_eq!(marker, "CURVE"),
            other => panic!("Expected MarkerNotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_detect_consumes_continuing_extra_row() {
        let content = format!("{}\t3\t3\t0.3\t0.1\t0\t0\n", CHARGE_FILE);

        let detected = scan(&content, &DtaConfig::default()).unwrap();
        assert_eq!(detected.samples.time, vec![0.0, 1.0, 2.0, 3.0]);

        let config = DtaConfig {
            row_count: RowCountPolicy::Declared,
            ..DtaConfig::default()
        };
        let declared = scan(&content, &config).unwrap();
        assert_eq!(declared.samples.len(), 3);
    }

    #[test]
    fn test_detect_ignores_unrelated_trailing_line() {
        let content = format!("{}EXPERIMENTABORTED\tTOGGLE\tT\n", CHARGE_FILE);
        let result = scan(&content, &DtaConfig::default()).unwrap();
        assert_eq!(result.samples.len(), 3);
    }

    #[test]
    fn test_plus_one_on_short_file_warns() {
        let config = DtaConfig {
            row_count: RowCountPolicy::PlusOne,
            ..DtaConfig::default()
        };
        let result = scan(CHARGE_FILE, &config).unwrap();
        assert_eq!(result.samples.len(), 3);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("declares 3 rows"));
    }

    #[test]
    fn test_malformed_row_is_skipped() {
        let content = CHARGE_FILE.replace("\t1\t1\t0.1\t0.1\t0\t0\n", "\t1\t1\tn/a\t0.1\t0\t0\n");
        let result = scan(&content, &DtaConfig::default()).unwrap();

        assert_eq!(result.samples.time, vec![0.0, 2.0]);
        assert_eq!(result.malformed_rows, 1);
        assert!(result.warnings[0].contains("line 14"));
    }

    #[test]
    fn test_short_row_is_malformed() {
        assert!(parse_row("\t0\t1.0\t2.0").is_err());
        let row = parse_row("\t7\t1.5\t3.25\t-0.002\t0").unwrap();
        assert_eq!(row.point, 7.0);
        assert_eq!(row.current, -0.002);
    }

    #[test]
    fn test_filename_polarity_and_pair_key() {
        let config = DtaConfig::default();

        assert_eq!(
            filename_polarity(Path::new("Cell1_Discharge.DTA"), &config),
            Some(Polarity::Discharge)
        );
        assert_eq!(
            filename_polarity(Path::new("cell1_CHARGE.DTA"), &config),
            Some(Polarity::Charge)
        );
        assert_eq!(filename_polarity(Path::new("run_01.DTA"), &config), None);

        assert_eq!(
            pair_key(Path::new("Cell1_Charge.DTA"), &config).as_deref(),
            Some("Cell1")
        );
        assert_eq!(
            pair_key(Path::new("Cell1_Discharge.DTA"), &config).as_deref(),
            Some("Cell1")
        );
        assert_eq!(
            pair_key(Path::new("Discharge_2.DTA"), &config).as_deref(),
            Some("2")
        );
        assert_eq!(pair_key(Path::new("run_01.DTA"), &config), None);
    }

    #[test]
    fn test_header_sign_takes_precedence() {
        let path = Path::new("Cell1_Charge.DTA");
        let config = DtaConfig::default();

        assert_eq!(
            resolve_polarity(path, Some(Polarity::Discharge), &config).unwrap(),
            Polarity::Discharge
        );
        assert_eq!(
            resolve_polarity(path, None, &config).unwrap(),
            Polarity::Charge
        );

        let header_only = DtaConfig {
            polarity_source: PolaritySource::Header,
            ..DtaConfig::default()
        };
        assert!(matches!(
            resolve_polarity(path, None, &header_only),
            Err(CyclerError::UnknownPolarity { .. })
        ));

        let filename_only = DtaConfig {
            polarity_source: PolaritySource::Filename,
            ..DtaConfig::default()
        };
        assert_eq!(
            resolve_polarity(path, Some(Polarity::Discharge), &filename_only).unwrap(),
            Polarity::Charge
        );
    }

    #[test]
    fn test_keyed_indices_ignore_listing_order() {
        let curves = vec![
            curve("Charge_1.DTA", Polarity::Charge),
            curve("Charge_2.DTA", Polarity::Charge),
            curve("Discharge_1.DTA", Polarity::Discharge),
            curve("Discharge_2.DTA", Polarity::Discharge),
        ];
        assert_eq!(assign_cycle_indices(&curves), vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_unkeyed_indices_follow_sequential_rule() {
        let curves = vec![
            curve("run_01.DTA", Polarity::Charge),
            curve("run_02.DTA", Polarity::Discharge),
            curve("run_03.DTA", Polarity::Charge),
            curve("run_04.DTA", Polarity::Charge),
            curve("run_05.DTA", Polarity::Discharge),
            curve("run_06.DTA", Polarity::Discharge),
        ];
        assert_eq!(assign_cycle_indices(&curves), vec![1, 1, 2, 2, 2, 3]);
    }

    #[test]
    fn test_numbered_stems_fall_back_to_sequential_rule() {
        let curves = vec![
            curve("01_Charge.DTA", Polarity::Charge),
            curve("02_Discharge.DTA", Polarity::Discharge),
            curve("03_Charge.DTA", Polarity::Charge),
            curve("04_Discharge.DTA", Polarity::Discharge),
        ];
        assert_eq!(assign_cycle_indices(&curves), vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_half_cycles_carry_indices() {
        let halves = dta_half_cycles(vec![
            curve("A_charge.DTA", Polarity::Charge),
            curve("A_discharge.DTA", Polarity::Discharge),
            curve("B_charge.DTA", Polarity::Charge),
        ])
        .unwrap();

        let summary: Vec<(u32, Polarity)> = halves
            .iter()
            .map(|half| (half.cycle_index(), half.polarity()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, Polarity::Charge),
                (1, Polarity::Discharge),
                (2, Polarity::Charge)
            ]
        );
    }
}
