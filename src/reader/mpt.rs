//! EC-Lab MPT reader.
//!
//! One file holds a whole experiment. The header pass collects the declared
//! loop table and the position of the column header line; the data table is
//! then read with polars (tab separated, decimal comma) and cut into
//! half-cycles, either by the declared loop row ranges or, when no loops are
//! declared, at every change of the `ox/red` flag.

use crate::config::MptConfig;
use crate::constants::mpt;
use crate::error::{CyclerError, Result};
use crate::models::{HalfCycle, Polarity, Samples};
use polars::prelude::*;
use regex::{Captures, Regex};
use std::io::Cursor;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

struct HeaderPatterns {
    loop_count: Regex,
    loop_range: Regex,
    header_lines: Regex,
}

impl HeaderPatterns {
    fn new() -> Self {
        let labelled = |label: &str| {
            Regex::new(&format!(r"^\s*{}\s*:\s*(\d+)\s*$", regex::escape(label)))
                .expect("labelled count pattern is valid")
        };
        Self {
            loop_count: labelled(mpt::LOOP_COUNT_LABEL),
            header_lines: labelled(mpt::HEADER_LINES_LABEL),
            // Loop 0 from point number 0 to 1234
            loop_range: Regex::new(r"^\s*Loop\s+(\d+)\s.*\s(\d+)\s+\S+\s+(\d+)\s*$")
                .expect("loop range pattern is valid"),
        }
    }
}

static PATTERNS: LazyLock<HeaderPatterns> = LazyLock::new(HeaderPatterns::new);

/// A `Loop k from point number a to b` declaration, as written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRange {
    pub index: usize,
    pub first_row: usize,
    pub last_row: usize,
}

/// Metadata collected before the data table
#[derive(Debug, Clone, PartialEq)]
pub struct MptHeader {
    pub loop_count: Option<usize>,
    pub loops: Vec<LoopRange>,
    pub declared_header_lines: Option<usize>,
    /// Zero-based line number of the column header line
    pub column_header_line: usize,
    pub columns: Vec<String>,
}

impl MptHeader {
    pub fn variant(&self) -> MptVariant {
        match self.loop_count {
            Some(count) if count > 0 => MptVariant::LoopRanges,
            _ => MptVariant::FlagTransitions,
        }
    }
}

/// How an experiment is cut into half-cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MptVariant {
    LoopRanges,
    FlagTransitions,
}

/// Resolved names of the four columns the reader uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub time: String,
    pub voltage: String,
    pub current: String,
    pub flag: String,
}

impl ColumnNames {
    pub fn resolve(columns: &[String], config: &MptConfig, path: &Path) -> Result<Self> {
        let find = |candidates: &[String]| {
            candidates
                .iter()
                .find(|candidate| columns.iter().any(|column| column == *candidate))
                .cloned()
                .ok_or_else(|| CyclerError::MissingColumn {
                    path: path.to_path_buf(),
                    candidates: candidates.to_vec(),
                })
        };

        Ok(Self {
            time: find(&config.time_columns)?,
            voltage: find(&config.voltage_columns)?,
            current: find(&config.current_columns)?,
            flag: find(&config.flag_columns)?,
        })
    }

    fn all(&self) -> [&str; 4] {
        [&self.time, &self.voltage, &self.current, &self.flag]
    }
}

/// One usable table row; current already in amps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MptRow {
    pub time: f64,
    pub voltage: f64,
    pub current: f64,
    pub polarity: Polarity,
}

/// Table rows in file order; `None` marks a malformed row
#[derive(Debug, Clone)]
pub struct MptTable {
    pub rows: Vec<Option<MptRow>>,
    /// One-based file line of the first data row
    pub first_data_line: usize,
}

/// Half-cycles cut from one table
#[derive(Debug, Default)]
pub struct Segmentation {
    pub half_cycles: Vec<HalfCycle>,
    pub malformed_rows: usize,
    pub warnings: Vec<String>,
}

/// One parsed MPT file
#[derive(Debug)]
pub struct MptExperiment {
    pub path: PathBuf,
    pub variant: MptVariant,
    pub rows_read: usize,
    pub half_cycles: Vec<HalfCycle>,
    pub malformed_rows: usize,
    pub warnings: Vec<String>,
}

/// Read one MPT file and cut it into half-cycles
pub fn read_mpt_file(path: &Path, config: &MptConfig) -> Result<MptExperiment> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);

    let header = scan_mpt_header(&text, path, config)?;
    let names = ColumnNames::resolve(&header.columns, config, path)?;
    let table = read_table(&text, &header, &names, config)?;
    let variant = header.variant();

    debug!(
        "{}: {} data rows, {:?}, {} declared loops",
        path.display(),
        table.rows.len(),
        variant,
        header.loop_count.unwrap_or(0)
    );

    let segmentation = match variant {
        MptVariant::LoopRanges => {
            let ranges = resolve_loops(&header, table.rows.len(), config, path)?;
            segment_by_loops(&table, &ranges, path)?
        }
        MptVariant::FlagTransitions => segment_by_transitions(&table, path)?,
    };

    Ok(MptExperiment {
        path: path.to_path_buf(),
        variant,
        rows_read: table.rows.len(),
        half_cycles: segmentation.half_cycles,
        malformed_rows: segmentation.malformed_rows,
        warnings: segmentation.warnings,
    })
}

fn capture_usize(captures: &Captures, group: usize) -> Option<usize> {
    captures.get(group)?.as_str().parse().ok()
}

/// Metadata pass: loop declarations up to the column header line
pub fn scan_mpt_header(text: &str, path: &Path, config: &MptConfig) -> Result<MptHeader> {
    let mut loop_count = None;
    let mut loops = Vec::new();
    let mut declared_header_lines = None;

    for (line_num, line) in text.lines().enumerate() {
        if line.starts_with(config.column_header_marker.as_str()) {
            if let Some(declared) = declared_header_lines {
                if declared != line_num + 1 {
                    warn!(
                        "{}: header declares {} lines but the column header is on line {}",
                        path.display(),
                        declared,
                        line_num + 1
                    );
                }
            }

            let columns = line
                .trim_end_matches('\t')
                .split('\t')
                .map(|column| column.trim().to_string())
                .collect();

            return Ok(MptHeader {
                loop_count,
                loops,
                declared_header_lines,
                column_header_line: line_num,
                columns,
            });
        }

        if let Some(captures) = PATTERNS.loop_count.captures(line) {
            loop_count = capture_usize(&captures, 1);
        } else if let Some(captures) = PATTERNS.header_lines.captures(line) {
            declared_header_lines = capture_usize(&captures, 1);
        } else if let Some(captures) = PATTERNS.loop_range.captures(line) {
            match (
                capture_usize(&captures, 1),
                capture_usize(&captures, 2),
                capture_usize(&captures, 3),
            ) {
                (Some(index), Some(first_row), Some(last_row)) => loops.push(LoopRange {
                    index,
                    first_row,
                    last_row,
                }),
                _ => {
                    return Err(CyclerError::LoopRange {
                        path: path.to_path_buf(),
                        reason: format!("unreadable loop declaration '{}'", line.trim()),
                    });
                }
            }
        }
    }

    Err(CyclerError::MarkerNotFound {
        path: path.to_path_buf(),
        marker: config.column_header_marker.trim_end().to_string(),
    })
}

/// Bulk pass: parse the table below the column header line
pub fn read_table(
    text: &str,
    header: &MptHeader,
    names: &ColumnNames,
    config: &MptConfig,
) -> Result<MptTable> {
    let mut table = String::with_capacity(text.len());
    let lines = text
        .lines()
        .skip(header.column_header_line)
        .filter(|line| !line.trim().is_empty());
    for line in lines {
        table.push_str(line.trim_end_matches('\t'));
        table.push('\n');
    }

    let schema: Schema = names
        .all()
        .iter()
        .map(|name| (PlSmallStr::from(*name), DataType::Float64))
        .collect();

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_ignore_errors(true)
        .with_schema_overwrite(Some(Arc::new(schema)))
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(mpt::SEPARATOR)
                .with_decimal_comma(true)
                .with_truncate_ragged_lines(true),
        )
        .into_reader_with_file_handle(Cursor::new(table.into_bytes()))
        .finish()?;

    let time = float_column(&df, &names.time)?;
    let voltage = float_column(&df, &names.voltage)?;
    let current = float_column(&df, &names.current)?;
    let flag = float_column(&df, &names.flag)?;

    let rows = time
        .into_iter()
        .zip(voltage)
        .zip(current)
        .zip(flag)
        .map(|(((time, voltage), current), flag)| {
            Some(MptRow {
                time: time?,
                voltage: voltage?,
                current: current? / config.current_scale,
                polarity: Polarity::from_flag(flag?)?,
            })
        })
        .collect();

    Ok(MptTable {
        rows,
        first_data_line: header.column_header_line + 2,
    })
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Row ranges of loops `0..n`, checked against the table length
pub fn resolve_loops(
    header: &MptHeader,
    table_rows: usize,
    config: &MptConfig,
    path: &Path,
) -> Result<Vec<Range<usize>>> {
    let count = header.loop_count.unwrap_or(0);
    let loop_error = |reason: String| CyclerError::LoopRange {
        path: path.to_path_buf(),
        reason,
    };

    if header.loops.len() > count {
        warn!(
            "{}: {} loop declarations for {} loops, ignoring the extra ones",
            path.display(),
            header.loops.len(),
            count
        );
    }

    (0..count)
        .map(|index| {
            let declared = header
                .loops
                .iter()
                .find(|range| range.index == index)
                .ok_or_else(|| {
                    loop_error(format!(
                        "{} loops declared but no row range for loop {}",
                        count, index
                    ))
                })?;

            let end = if config.loop_end_inclusive {
                declared.last_row + 1
            } else {
                declared.last_row
            };

            if declared.first_row > end {
                return Err(loop_error(format!(
                    "loop {} starts at row {} after its end {}",
                    index, declared.first_row, end
                )));
            }
            if end > table_rows {
                return Err(loop_error(format!(
                    "loop {} ends at row {} but the table has {} rows",
                    index, end, table_rows
                )));
            }

            Ok(declared.first_row..end)
        })
        .collect()
}

fn malformed(path: &Path, table: &MptTable, row: usize, reason: String) -> String {
    let err = CyclerError::MalformedRow {
        path: path.to_path_buf(),
        line: table.first_data_line + row,
        reason,
    };
    warn!("{}", err);
    err.to_string()
}

/// Split each declared loop into its charge (flag 1) and discharge (flag 0) rows
pub fn segment_by_loops(
    table: &MptTable,
    ranges: &[Range<usize>],
    path: &Path,
) -> Result<Segmentation> {
    let mut segmentation = Segmentation::default();

    for (loop_index, range) in ranges.iter().enumerate() {
        let cycle_index = loop_index as u32 + 1;
        let mut charge = Samples::default();
        let mut discharge = Samples::default();

        for row in range.clone() {
            match &table.rows[row] {
                Some(sample) => {
                    let target = match sample.polarity {
                        Polarity::Charge => &mut charge,
                        Polarity::Discharge => &mut discharge,
                    };
                    target.push(sample.time, sample.voltage, sample.current);
                }
                None => {
                    segmentation.malformed_rows += 1;
                    let reason = format!(
                        "abandoning the remaining {} rows of loop {}",
                        range.end - row,
                        loop_index
                    );
                    segmentation
                        .warnings
                        .push(malformed(path, table, row, reason));
                    break;
                }
            }
        }

        for (polarity, samples) in [(Polarity::Charge, charge), (Polarity::Discharge, discharge)] {
            if samples.is_empty() {
                let message = format!(
                    "{}: loop {} has no {} rows",
                    path.display(),
                    loop_index,
                    polarity
                );
                warn!("{}", message);
                segmentation.warnings.push(message);
                continue;
            }
            segmentation
                .half_cycles
                .push(HalfCycle::new(cycle_index, polarity, path, samples)?);
        }
    }

    Ok(segmentation)
}

/// Close a half-cycle at every flag change and flush the last one at end of table
pub fn segment_by_transitions(table: &MptTable, path: &Path) -> Result<Segmentation> {
    let mut segmentation = Segmentation::default();
    let mut buffer = Samples::default();
    let mut active: Option<Polarity> = None;
    let mut half_cycle_counter = 0u32;

    for (row, sample) in table.rows.iter().enumerate() {
        let Some(sample) = sample else {
            segmentation.malformed_rows += 1;
            let reason = format!(
                "abandoning the remaining {} rows of the file",
                table.rows.len() - row
            );
            segmentation
                .warnings
                .push(malformed(path, table, row, reason));
            break;
        };

        if let Some(previous) = active {
            if previous != sample.polarity {
                segmentation.half_cycles.push(HalfCycle::new(
                    half_cycle_counter / 2 + 1,
                    previous,
                    path,
                    buffer.take(),
                )?);
                half_cycle_counter += 1;
            }
        }

        active = Some(sample.polarity);
        buffer.push(sample.time, sample.voltage, sample.current);
    }

    if let Some(previous) = active {
        if !buffer.is_empty() {
            segmentation.half_cycles.push(HalfCycle::new(
                half_cycle_counter / 2 + 1,
                previous,
                path,
                buffer.take(),
            )?);
        }
    }

    Ok(segmentation)
}
