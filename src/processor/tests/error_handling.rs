//! Error handling integration tests

use super::{alternating_rows, dta_content, ramp, write_dta, write_mpt};
use crate::config::ProcessorConfig;
use crate::error::CyclerError;
use crate::models::{Polarity, SourceFormat};
use crate::processor::DatasetProcessor;
use std::fs;
use tempfile::TempDir;

#[tokio::test]
async fn test_nonexistent_data_directory() {
    let temp_dir = TempDir::new().unwrap();
    let nonexistent_path = temp_dir.path().join("nonexistent");

    let result = DatasetProcessor::new(nonexistent_path.clone(), ProcessorConfig::default());

    match result.unwrap_err() {
        CyclerError::DirectoryNotFound { path } => assert_eq!(path, nonexistent_path),
        other => panic!("Expected DirectoryNotFound error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_directory_removed_before_processing() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("cells");
    fs::create_dir_all(&data_dir).unwrap();

    let processor = DatasetProcessor::new(data_dir.clone(), ProcessorConfig::default()).unwrap();
    fs::remove_dir_all(&data_dir).unwrap();

    let result = processor.process().await;
    assert!(matches!(
        result,
        Err(CyclerError::DirectoryNotFound { .. })
    ));
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ProcessorConfig::default();
    config.dta.curve_marker = "  ".to_string();

    let result = DatasetProcessor::new(temp_dir.path().to_path_buf(), config);
    assert!(matches!(result, Err(CyclerError::Configuration { .. })));
}

#[tokio::test]
async fn test_missing_marker_skips_file_only() {
    let temp_dir = TempDir::new().unwrap();
    write_dta(temp_dir.path(), "Cell1_Charge.DTA", Some(0.1), 3);
    write_dta(temp_dir.path(), "Cell1_Discharge.DTA", Some(-0.1), 3);
    fs::write(
        temp_dir.path().join("Cell2_Charge.DTA"),
        "EXPLAIN\nTAG\tCHRONOP\nno table here\n",
    )
    .unwrap();

    let processor =
        DatasetProcessor::new(temp_dir.path().to_path_buf(), ProcessorConfig::default()).unwrap();
    let outcome = processor.process().await.unwrap();

    assert_eq!(outcome.cycles.len(), 1);
    assert_eq!(outcome.stats.files_processed, 2);
    assert_eq!(outcome.stats.files_failed, 1);

    let failed: Vec<_> = outcome.failed_reports().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].file_name(), "Cell2_Charge.DTA");
    assert_eq!(failed[0].format, SourceFormat::Dta);
    assert!(failed[0].failure.as_ref().unwrap().contains("CURVE"));
}

#[tokio::test]
async fn test_unclassifiable_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    write_dta(temp_dir.path(), "run_001.DTA", None, 3);

    let processor =
        DatasetProcessor::new(temp_dir.path().to_path_buf(), ProcessorConfig::default()).unwrap();
    let outcome = processor.process().await.unwrap();

    assert!(outcome.cycles.is_empty());
    assert_eq!(outcome.stats.files_failed, 1);
    assert!(
        outcome.reports[0]
            .failure
            .as_ref()
            .unwrap()
            .contains("polarity")
    );
}

#[tokio::test]
async fn test_polarity_conflict_excludes_cycle() {
    let temp_dir = TempDir::new().unwrap();
    // Both names reduce to the pair key "Cell1"
    write_dta(temp_dir.path(), "Cell1-charge.DTA", Some(0.1), 3);
    write_dta(temp_dir.path(), "Cell1_Charge.DTA", Some(0.1), 3);
    write_dta(temp_dir.path(), "Cell1_Discharge.DTA", Some(-0.1), 3);
    write_dta(temp_dir.path(), "Cell2_Charge.DTA", Some(0.1), 3);
    write_dta(temp_dir.path(), "Cell2_Discharge.DTA", Some(-0.1), 3);

    let processor =
        DatasetProcessor::new(temp_dir.path().to_path_buf(), ProcessorConfig::default()).unwrap();
    let outcome = processor.process().await.unwrap();

    assert_eq!(outcome.cycles.len(), 1);
    assert_eq!(outcome.cycles[0].index, 2);
    assert_eq!(outcome.conflicts.len(), 1);

    let conflict = &outcome.conflicts[0];
    assert_eq!(conflict.cycle_index, 1);
    assert_eq!(conflict.polarity, Polarity::Charge);
    assert_eq!(conflict.paths.len(), 2);
    assert_eq!(outcome.stats.conflicts, 1);
}

#[tokio::test]
async fn test_incomplete_pair_is_kept_and_counted() {
    let temp_dir = TempDir::new().unwrap();
    write_dta(temp_dir.path(), "Cell1_Charge.DTA", Some(0.1), 3);

    let processor =
        DatasetProcessor::new(temp_dir.path().to_path_buf(), ProcessorConfig::default()).unwrap();
    let outcome = processor.process().await.unwrap();

    assert_eq!(outcome.cycles.len(), 1);
    assert_eq!(outcome.cycles[0].missing(), Some(Polarity::Discharge));
    assert_eq!(outcome.complete_cycles().count(), 0);
    assert_eq!(outcome.stats.incomplete_cycles, 1);
}

#[tokio::test]
async fn test_truncated_table_keeps_rows_present() {
    let temp_dir = TempDir::new().unwrap();
    let content = dta_content(Some(0.1), &ramp(4, 0.1)).replace("CURVE\tTABLE\t4", "CURVE\tTABLE\t10");
    fs::write(temp_dir.path().join("Cell1_Charge.DTA"), content).unwrap();

    let processor =
        DatasetProcessor::new(temp_dir.path().to_path_buf(), ProcessorConfig::default()).unwrap();
    let outcome = processor.process().await.unwrap();

    assert_eq!(outcome.cycles[0].charge().unwrap().len(), 4);
    let report = &outcome.reports[0];
    assert!(!report.is_failed());
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.contains("declares 10 rows"))
    );
}

#[tokio::test]
async fn test_malformed_dta_row_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let content = dta_content(Some(-0.1), &ramp(4, -0.1)).replace("\t2\t2\t", "\t2\tabc\t");
    fs::write(temp_dir.path().join("Cell1_Discharge.DTA"), content).unwrap();

    let processor =
        DatasetProcessor::new(temp_dir.path().to_path_buf(), ProcessorConfig::default()).unwrap();
    let outcome = processor.process().await.unwrap();

    let report = &outcome.reports[0];
    assert_eq!(report.malformed_rows, 1);
    assert_eq!(report.rows_read, 4);
    assert_eq!(outcome.cycles[0].discharge().unwrap().len(), 3);
    assert_eq!(outcome.stats.malformed_rows, 1);
}

#[tokio::test]
async fn test_loop_beyond_table_fails_file_only() {
    let temp_dir = TempDir::new().unwrap();
    write_mpt(
        temp_dir.path(),
        "a_broken.mpt",
        &[(0, 20), (20, 80)],
        &alternating_rows(40, 5),
    );
    write_mpt(temp_dir.path(), "b_good.mpt", &[], &alternating_rows(20, 10));

    let processor =
        DatasetProcessor::new(temp_dir.path().to_path_buf(), ProcessorConfig::default()).unwrap();
    let outcome = processor.process().await.unwrap();

    assert_eq!(outcome.stats.files_failed, 1);
    assert_eq!(outcome.stats.files_processed, 1);
    assert_eq!(outcome.cycles.len(), 1);
    assert_eq!(outcome.cycles[0].origin, "b_good.mpt");

    let failure = outcome.reports[0].failure.as_ref().unwrap();
    assert!(failure.contains("loop 1"));
}

#[tokio::test]
async fn test_mpt_without_column_header_fails_file_only() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("empty.mpt"),
        "EC-Lab ASCII FILE\nNb header lines : 3\n\n",
    )
    .unwrap();

    let processor =
        DatasetProcessor::new(temp_dir.path().to_path_buf(), ProcessorConfig::default()).unwrap();
    let outcome = processor.process().await.unwrap();

    assert_eq!(outcome.stats.files_failed, 1);
    assert_eq!(outcome.reports[0].format, SourceFormat::Mpt);
    assert!(outcome.cycles.is_empty());
}
