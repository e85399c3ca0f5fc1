//! Integration tests for the processor module
//!
//! Tests whole directory scans over generated Gamry and EC-Lab exports.

pub mod error_handling;

use std::fs;
use std::path::{Path, PathBuf};

/// Gamry export with an optional signed step current and `(t, v, i)` rows
pub fn dta_content(step_current: Option<f64>, rows: &[(f64, f64, f64)]) -> String {
    let mut text = String::from(
        "EXPLAIN\n\
TAG\tCHRONOP\n\
TITLE\tLABEL\tChronopotentiometry Scan\tTest &Identifier\n\
DATE\tLABEL\t3/14/2023\tDate\n",
    );
    if let Some(current) = step_current {
        text.push_str(&format!(
            "ISTEP1\tIQUANT\t{}\tStep 1 Current (A)\n",
            current
        ));
    }
    text.push_str("TSTEP1\tQUANT\t3600\tStep 1 Time (s)\n");
    text.push_str(&format!("CURVE\tTABLE\t{}\n", rows.len()));
    text.push_str("\tPt\tT\tVf\tIm\tVu\tSig\tAch\tIERange\tOver\n");
    text.push_str("\t#\ts\tV vs. Ref.\tA\tV\tV\tV\t#\tbits\n");
    for (point, (time, voltage, current)) in rows.iter().enumerate() {
        text.push_str(&format!(
            "\t{}\t{}\t{}\t{}\t0\t0\t0\t7\t...........\n",
            point, time, voltage, current
        ));
    }
    text
}

/// Constant-current rows with a linear voltage ramp
pub fn ramp(points: usize, current: f64) -> Vec<(f64, f64, f64)> {
    (0..points)
        .map(|i| {
            let t = i as f64;
            (t, 3.0 + current.signum() * t * 0.01, current)
        })
        .collect()
}

pub fn write_dta(dir: &Path, name: &str, step_current: Option<f64>, points: usize) -> PathBuf {
    let current = step_current.unwrap_or(if name.to_lowercase().contains("discharge") {
        -0.1
    } else {
        0.1
    });
    let path = dir.join(name);
    fs::write(&path, dta_content(step_current, &ramp(points, current))).unwrap();
    path
}

/// EC-Lab export; rows are `(time, voltage, current mA, flag)`
pub fn mpt_content(loops: &[(usize, usize)], rows: &[(f64, f64, f64, u8)]) -> String {
    let mut header = vec![
        "EC-Lab ASCII FILE".to_string(),
        "Nb header lines : 0".to_string(),
        String::new(),
        "Galvanostatic Cycling with Potential Limitation".to_string(),
        String::new(),
        "Run on channel : 1 (SN 0001)".to_string(),
    ];
    if !loops.is_empty() {
        header.push(format!("Number of loops : {}", loops.len()));
        for (index, (first, last)) in loops.iter().enumerate() {
            header.push(format!(
                "Loop {} from point number {} to {}",
                index, first, last
            ));
        }
        header.push(String::new());
    }
    header[1] = format!("Nb header lines : {}", header.len() + 1);
    header.push("mode\tox/red\terror\ttime/s\tEwe/V\tI/mA\tcycle number\t".to_string());

    let comma = |value: f64| format!("{}", value).replace('.', ",");
    let mut text = header.join("\n");
    text.push('\n');
    for (time, voltage, current, flag) in rows {
        text.push_str(&format!(
            "1\t{}\t0\t{}\t{}\t{}\t0\t\n",
            flag,
            comma(*time),
            comma(*voltage),
            comma(*current)
        ));
    }
    text
}

/// Rows switching flag every `run` rows, starting with charge
pub fn alternating_rows(count: usize, run: usize) -> Vec<(f64, f64, f64, u8)> {
    (0..count)
        .map(|i| {
            let flag = if (i / run) % 2 == 0 { 1 } else { 0 };
            let current = if flag == 1 { 100.0 } else { -100.0 };
            (i as f64, 3.5 + (i % run) as f64 * 0.001, current, flag)
        })
        .collect()
}

pub fn write_mpt(dir: &Path, name: &str, loops: &[(usize, usize)], rows: &[(f64, f64, f64, u8)]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, mpt_content(loops, rows)).unwrap();
    path
}
