use std::fs;
use std::path::PathBuf;

use rego_report_domain::{
    any_failed, parse_coverage_report, parse_test_records, process_coverage_report,
    process_test_results,
};
use rego_report_types::{ProcessedCoverageResult, TestStatus};

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {}", path.display(), e))
}

fn coverage_for<'a>(results: &'a [ProcessedCoverageResult], file: &str) -> &'a ProcessedCoverageResult {
    results
        .iter()
        .find(|r| r.file == file)
        .unwrap_or_else(|| panic!("no coverage row for {}", file))
}

// =============================================================================
// Test results
// =============================================================================

#[test]
fn parses_sample_test_output() {
    let records = parse_test_records(&fixture("sample_test_output.json")).unwrap();
    let results = process_test_results(&records);

    assert_eq!(results.len(), 8);
    assert_eq!(results[0].file, "tests/cancel-in-progress-runs_test.rego");
    assert_eq!(results[0].status, TestStatus::Pass);
    assert_eq!(results[0].passed, 2);
    assert_eq!(results[0].total, 2);
    assert_eq!(
        results[0].details,
        vec!["✅ test_cancel_runs_allowed", "✅ test_cancel_runs_denied"]
    );
}

#[test]
fn failed_test_marks_whole_file() {
    let records = parse_test_records(&fixture("sample_test_output.json")).unwrap();
    let results = process_test_results(&records);

    let row = &results[2];
    assert_eq!(row.file, "tests/enforce-module-use-policy_test.rego");
    assert_eq!(row.status, TestStatus::Fail);
    assert_eq!(row.passed, 3);
    assert_eq!(row.total, 4);
    assert_eq!(
        row.details,
        vec![
            "✅ test_deny_creation_of_controlled_resource_type",
            "✅ test_deny_update_of_controlled_resource_type",
            "❌ test_allow_deletion_of_controlled_resource_type",
            "✅ test_allow_creation_of_uncontrolled_resource_type",
        ]
    );
    assert!(any_failed(&results));
}

#[test]
fn empty_array_is_not_an_error() {
    let records = parse_test_records("[]").unwrap();
    assert!(process_test_results(&records).is_empty());
}

#[test]
fn malformed_test_output_is_parse_error() {
    let err = parse_test_records("{\"not\": \"an array\"}").unwrap_err();
    assert!(err.to_string().contains("parse error"));
}

// =============================================================================
// Coverage
// =============================================================================

#[test]
fn single_uncovered_line() {
    let report = parse_coverage_report(&fixture("sample_coverage_output.json")).unwrap();
    let results = process_coverage_report(&report);

    let row = coverage_for(&results, "cancel-in-progress-runs.rego");
    assert!((row.coverage.unwrap() - 83.33).abs() < 0.01);
    assert_eq!(row.not_covered_lines, "16");
}

#[test]
fn hyphenated_ranges_sorted_numerically() {
    let report = parse_coverage_report(&fixture("sample_coverage_output.json")).unwrap();
    let results = process_coverage_report(&report);

    let row = coverage_for(&results, "enforce-module-use-policy.rego");
    assert!((row.coverage.unwrap() - 47.826).abs() < 0.001);
    assert_eq!(
        row.not_covered_lines,
        "37, 42, 46, 52, 54, 57, 60-61, 64, 68, 78, 80"
    );
}

#[test]
fn comma_separated_single_lines() {
    let report = parse_coverage_report(&fixture("sample_coverage_output.json")).unwrap();
    let results = process_coverage_report(&report);

    let row = coverage_for(&results, "readers-writers-admins-teams.rego");
    assert_eq!(row.not_covered_lines, "16, 24, 28");
}

#[test]
fn undefined_coverage_keeps_uncovered_lines() {
    let report = parse_coverage_report(&fixture("sample_coverage_output.json")).unwrap();
    let results = process_coverage_report(&report);

    let row = coverage_for(&results, "drift-detection.rego");
    assert_eq!(row.coverage, None);
    assert_eq!(row.not_covered_lines, "3, 5, 8, 11");
}

#[test]
fn full_coverage_has_empty_uncovered_lines() {
    let report = parse_coverage_report(&fixture("sample_coverage_output.json")).unwrap();
    let results = process_coverage_report(&report);

    let row = coverage_for(&results, "tests/cancel-in-progress-runs_test.rego");
    assert_eq!(row.coverage, Some(100.0));
    assert_eq!(row.not_covered_lines, "");
}

#[test]
fn coverage_rows_follow_report_order() {
    let report = parse_coverage_report(&fixture("sample_coverage_output.json")).unwrap();
    let files: Vec<_> = process_coverage_report(&report)
        .into_iter()
        .map(|r| r.file)
        .collect();
    assert_eq!(
        files,
        vec![
            "cancel-in-progress-runs.rego",
            "drift-detection.rego",
            "enforce-module-use-policy.rego",
            "readers-writers-admins-teams.rego",
            "tests/cancel-in-progress-runs_test.rego",
        ]
    );
}

#[test]
fn empty_envelope_yields_no_rows() {
    let report = parse_coverage_report("{}").unwrap();
    assert!(process_coverage_report(&report).is_empty());
}
