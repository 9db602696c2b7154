//! Pure normalization: raw OPA records -> per-file report rows.
//!
//! No IO. Output order is part of the contract: files appear in the order they were
//! first seen, never re-sorted.

use indexmap::IndexMap;
use rego_report_types::{
    glyphs, ProcessedCoverageResult, ProcessedTestResult, RawCoverageReport, RawRange,
    RawTestRecord, RegoReportError, TestStatus,
};

/// Parse the stdout of `opa test --format=json`.
pub fn parse_test_records(json: &str) -> Result<Vec<RawTestRecord>, RegoReportError> {
    serde_json::from_str(json).map_err(|e| RegoReportError::Parse(format!("test results: {}", e)))
}

/// Parse the stdout of `opa test --format=json --coverage`.
pub fn parse_coverage_report(json: &str) -> Result<RawCoverageReport, RegoReportError> {
    serde_json::from_str(json).map_err(|e| RegoReportError::Parse(format!("coverage report: {}", e)))
}

/// Group records by file, preserving first-seen file order and record order within a file.
pub fn process_test_results(records: &[RawTestRecord]) -> Vec<ProcessedTestResult> {
    let mut by_file: IndexMap<&str, ProcessedTestResult> = IndexMap::new();

    for rec in records {
        let file = rec.location.file.as_str();
        let entry = by_file.entry(file).or_insert_with(|| ProcessedTestResult {
            file: file.to_string(),
            status: TestStatus::Pass,
            passed: 0,
            total: 0,
            details: vec![],
        });

        entry.total += 1;
        if rec.fail {
            entry.status = TestStatus::Fail;
            entry.details.push(format!("{} {}", glyphs::FAIL, rec.name));
        } else {
            entry.passed += 1;
            entry.details.push(format!("{} {}", glyphs::PASS, rec.name));
        }
    }

    by_file.into_values().collect()
}

/// One row per covered file, in report order.
///
/// An absent percentage stays absent; it is not the same as an empty gap list.
pub fn process_coverage_report(report: &RawCoverageReport) -> Vec<ProcessedCoverageResult> {
    report
        .files
        .iter()
        .map(|(path, data)| ProcessedCoverageResult {
            file: path.clone(),
            coverage: data.coverage,
            not_covered_lines: data
                .not_covered
                .as_deref()
                .map(compress_not_covered)
                .unwrap_or_default(),
        })
        .collect()
}

/// `[{16,16}, {9,9}, {60,61}]` -> `"9, 16, 60-61"`.
///
/// Ordered by numeric start row; sections sharing a start keep their input order.
pub fn compress_not_covered(sections: &[RawRange]) -> String {
    let mut sorted: Vec<&RawRange> = sections.iter().collect();
    sorted.sort_by_key(|s| s.start.row);

    sorted
        .into_iter()
        .map(|s| {
            if s.start.row == s.end.row {
                s.start.row.to_string()
            } else {
                format!("{}-{}", s.start.row, s.end.row)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Synthetic rows for a newline-separated list of files that have no test file.
pub fn no_test_results(list: &str) -> Vec<ProcessedTestResult> {
    list.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ProcessedTestResult::no_tests)
        .collect()
}

pub fn any_failed(results: &[ProcessedTestResult]) -> bool {
    results.iter().any(|r| r.status == TestStatus::Fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rego_report_types::{RawLocation, RawPosition};

    fn rec(file: &str, name: &str, fail: bool) -> RawTestRecord {
        RawTestRecord {
            location: RawLocation { file: file.into(), row: 1, col: 1 },
            package: "data.x".into(),
            name: name.into(),
            fail,
            duration: 0,
        }
    }

    fn range(start: u32, end: u32) -> RawRange {
        RawRange {
            start: RawPosition { row: start },
            end: RawPosition { row: end },
        }
    }

    #[test]
    fn groups_in_first_seen_order() {
        let records = vec![
            rec("z_test.rego", "t1", false),
            rec("a_test.rego", "t2", true),
            rec("z_test.rego", "t3", false),
        ];
        let out = process_test_results(&records);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].file, "z_test.rego");
        assert_eq!(out[0].details, vec!["✅ t1", "✅ t3"]);
        assert_eq!(out[1].file, "a_test.rego");
        assert_eq!(out[1].status, TestStatus::Fail);
        assert_eq!(out[1].details, vec!["❌ t2"]);
    }

    #[test]
    fn empty_records_yield_no_rows() {
        assert!(process_test_results(&[]).is_empty());
    }

    #[test]
    fn single_line_section() {
        assert_eq!(compress_not_covered(&[range(16, 16)]), "16");
    }

    #[test]
    fn sorts_numerically_not_lexicographically() {
        assert_eq!(compress_not_covered(&[range(10, 10), range(9, 9)]), "9, 10");
        assert_eq!(
            compress_not_covered(&[range(60, 61), range(37, 37), range(100, 104), range(42, 42)]),
            "37, 42, 60-61, 100-104"
        );
    }

    #[test]
    fn no_test_list_skips_blank_lines() {
        let rows = no_test_results("a.rego\n\n  b.rego  \n");
        let files: Vec<_> = rows.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(files, vec!["a.rego", "b.rego"]);
        assert!(rows.iter().all(|r| r.status == TestStatus::NoTests && r.total == 0));
    }

    #[test]
    fn any_failed_ignores_no_tests_rows() {
        let rows = no_test_results("a.rego");
        assert!(!any_failed(&rows));
        let rows = process_test_results(&[rec("a_test.rego", "t", true)]);
        assert!(any_failed(&rows));
    }
}
