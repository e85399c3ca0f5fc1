use criterion::{Criterion, black_box};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use echem_processor::capacity::trapezoid;
use echem_processor::config::{DtaConfig, MptConfig};
use echem_processor::reader::{read_dta_file, read_mpt_file};

const POINTS: usize = 20_000;

fn write_dta(dir: &Path) -> std::path::PathBuf {
    let mut text = String::from("EXPLAIN\nTAG\tCHRONOP\nISTEP1\tIQUANT\t0.01\tStep 1 Current (A)\n");
    writeln!(text, "CURVE\tTABLE\t{}", POINTS).unwrap();
    text.push_str("\tPt\tT\tVf\tIm\tVu\tSig\n\t#\ts\tV vs. Ref.\tA\tV\tV\n");
    for i in 0..POINTS {
        writeln!(text, "\t{}\t{}\t{:.6}\t0.01\t0\t0", i, i, 3.0 + i as f64 * 1e-5).unwrap();
    }
    let path = dir.join("Bench_Charge.DTA");
    fs::write(&path, text).unwrap();
    path
}

fn write_mpt(dir: &Path) -> std::path::PathBuf {
    let mut text = String::from("EC-Lab ASCII FILE\nNb header lines : 3\n\n");
    text.push_str("mode\tox/red\terror\ttime/s\tEwe/V\tI/mA\tcycle number\n");
    for i in 0..POINTS {
        let flag = (i / 1000) % 2;
        let current = if flag == 1 { "10,0" } else { "-10,0" };
        writeln!(text, "1\t{}\t0\t{},0\t3,{:04}\t{}\t0", 1 - flag, i, i % 10_000, current).unwrap();
    }
    let path = dir.join("bench.mpt");
    fs::write(&path, text).unwrap();
    path
}

fn readers(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let dta_path = write_dta(dir.path());
    let mpt_path = write_mpt(dir.path());
    let dta_config = DtaConfig::default();
    let mpt_config = MptConfig::default();

    c.bench_function("read_dta_file", |b| {
        b.iter(|| black_box(read_dta_file(&dta_path, &dta_config).unwrap().samples.len()))
    });

    c.bench_function("read_mpt_file", |b| {
        b.iter(|| black_box(read_mpt_file(&mpt_path, &mpt_config).unwrap().half_cycles.len()))
    });

    let time: Vec<f64> = (0..POINTS).map(|i| i as f64).collect();
    let current = vec![0.01; POINTS];
    c.bench_function("trapezoid", |b| {
        b.iter(|| black_box(trapezoid(&time, &current)))
    });
}

criterion::criterion_group!(benches, readers);
criterion::criterion_main!(benches);
