//! Markdown renderer for rego-report.
//!
//! Rendering is pure and deterministic. Rows come out in input order; any grouping has
//! already happened in the normalizer.

use rego_report_types::{ProcessedCoverageResult, ProcessedTestResult, TestStatus, REGO_EXTENSION};

pub const TITLE: &str = "# 🧪 OPA Rego Policy Test Results";
pub const NO_TEST_FILE: &str = "No test file found";
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Adds the Coverage column.
    pub show_coverage: bool,
    /// Test-file suffix without extension, e.g. `_test`.
    pub test_suffix: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_coverage: false,
            test_suffix: "_test".to_string(),
        }
    }
}

/// Render the results table. Returns an empty string when there are no rows; the caller
/// decides what to show instead.
pub fn render_markdown(
    results: &[ProcessedTestResult],
    coverage: &[ProcessedCoverageResult],
    opts: &RenderOptions,
) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut lines = vec![TITLE.to_string(), String::new()];
    if opts.show_coverage {
        lines.push("| File | Status | Passed | Total | Coverage | Details |".to_string());
        lines.push("|------|--------|--------|-------|----------|---------|".to_string());
    } else {
        lines.push("| File | Status | Passed | Total | Details |".to_string());
        lines.push("|------|--------|--------|-------|---------|".to_string());
    }

    for r in results {
        let mut cells = vec![
            r.file.clone(),
            status_cell(r.status),
            r.passed.to_string(),
            r.total.to_string(),
        ];
        if opts.show_coverage {
            let matched = find_coverage(&r.file, coverage, &opts.test_suffix);
            cells.push(coverage_cell(matched));
        }
        cells.push(details_cell(r));

        lines.push(format!("| {} |", cells.join(" | ")));
    }

    lines.join("\n")
}

fn status_cell(status: TestStatus) -> String {
    format!("{} {}", status.glyph(), status.label())
}

fn details_cell(r: &ProcessedTestResult) -> String {
    let body = if r.details.is_empty() && r.status == TestStatus::NoTests {
        NO_TEST_FILE.to_string()
    } else {
        r.details.join("<br>")
    };
    collapsible("Show Details", &body)
}

fn coverage_cell(matched: Option<&ProcessedCoverageResult>) -> String {
    let Some(c) = matched else {
        return NOT_AVAILABLE.to_string();
    };

    let mut cell = match c.coverage {
        Some(pct) => format!("{:.2}%", pct),
        None => NOT_AVAILABLE.to_string(),
    };
    if !c.not_covered_lines.is_empty() {
        cell.push(' ');
        cell.push_str(&collapsible("Uncovered Lines", &c.not_covered_lines));
    }
    cell
}

fn collapsible(summary: &str, body: &str) -> String {
    format!("<details><summary>{}</summary>{}</details>", summary, body)
}

/// Find the coverage row for the implementation file a test file exercises.
///
/// `tests/foo_test.rego` matches `tests/foo.rego`, `foo.rego`, or `policies/foo.rego`
/// when the test lives in a `tests/` child of `policies/`. Exact matches win over
/// trailing-segment matches. A coverage path longer than the candidate must be the
/// only such match, otherwise the file has no coverage row.
pub fn find_coverage<'a>(
    test_file: &str,
    coverage: &'a [ProcessedCoverageResult],
    test_suffix: &str,
) -> Option<&'a ProcessedCoverageResult> {
    let candidates = implementation_candidates(test_file, test_suffix);
    let normalized: Vec<(String, &ProcessedCoverageResult)> =
        coverage.iter().map(|c| (normalize_path(&c.file), c)).collect();

    for cand in &candidates {
        if let Some((_, c)) = normalized.iter().find(|(p, _)| p == cand) {
            return Some(*c);
        }
    }
    for cand in &candidates {
        if let Some((_, c)) = normalized.iter().find(|(p, _)| ends_with_segments(cand, p)) {
            return Some(*c);
        }
        // A deeper coverage path only counts when it is the sole one ending in the candidate.
        let mut deeper = normalized.iter().filter(|(p, _)| ends_with_segments(p, cand));
        if let (Some((_, c)), None) = (deeper.next(), deeper.next()) {
            return Some(*c);
        }
    }
    None
}

fn implementation_candidates(test_file: &str, test_suffix: &str) -> Vec<String> {
    let ending = format!("{}{}", test_suffix, REGO_EXTENSION);
    let stripped = match test_file.strip_suffix(&ending) {
        Some(stem) if !test_suffix.is_empty() => format!("{}{}", stem, REGO_EXTENSION),
        _ => test_file.to_string(),
    };
    let stripped = normalize_path(&stripped);

    let mut out = vec![stripped.clone()];
    let segments: Vec<&str> = stripped.split('/').collect();
    if segments.len() >= 2 && segments[segments.len() - 2] == "tests" {
        let mut without = segments.clone();
        without.remove(segments.len() - 2);
        out.push(without.join("/"));
    }
    out
}

/// Lexically resolve `.` and `..` segments.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = vec![];
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(p) if *p != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }
    let joined = parts.join("/");
    if path.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// True when `tail` equals the last whole segments of `path`.
fn ends_with_segments(path: &str, tail: &str) -> bool {
    let tail = tail.trim_start_matches('/');
    if tail.is_empty() {
        return false;
    }
    path == tail || path.ends_with(&format!("/{}", tail))
}
