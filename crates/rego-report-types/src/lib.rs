//! Shared DTOs for rego-report.
//!
//! This crate is deliberately boring: it should be safe to depend on from
//! any layer (collector, normalizer, renderer, adapters).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const TOOL_NAME: &str = "rego-report";

/// Default policy-testing binary.
pub const DEFAULT_OPA_BIN: &str = "opa";

/// Extension shared by policy and policy-test files.
pub const REGO_EXTENSION: &str = ".rego";

pub mod glyphs {
    pub const PASS: &str = "✅";
    pub const FAIL: &str = "❌";
    pub const WARN: &str = "⚠️";
}

pub mod flags {
    // Keep these in sync with `opa test --help`.
    pub const TEST: &str = "test";
    pub const FORMAT_JSON: &str = "--format=json";
    pub const COVERAGE: &str = "--coverage";
    pub const V0_COMPATIBLE: &str = "--v0-compatible";
}

// =============================================================================
// Raw OPA payloads
// =============================================================================

/// One test case as emitted by `opa test --format=json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawTestRecord {
    pub location: RawLocation,
    #[serde(default)]
    pub package: String,
    pub name: String,
    /// Absent means the test passed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fail: bool,
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawLocation {
    pub file: String,
    #[serde(default)]
    pub row: u32,
    #[serde(default)]
    pub col: u32,
}

/// Envelope emitted by `opa test --format=json --coverage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RawCoverageReport {
    #[serde(default)]
    pub files: IndexMap<String, RawCoverageFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RawCoverageFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covered: Option<Vec<RawRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_covered: Option<Vec<RawRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covered_lines: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_covered_lines: Option<u64>,
    /// `None` when OPA did not compute a percentage for this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

/// Inclusive row range. `start.row == end.row` for a single line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawRange {
    pub start: RawPosition,
    pub end: RawPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawPosition {
    pub row: u32,
}

// =============================================================================
// Processed report rows
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TestStatus {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "NO TESTS")]
    NoTests,
}

impl TestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::NoTests => "NO TESTS",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            TestStatus::Pass => glyphs::PASS,
            TestStatus::Fail => glyphs::FAIL,
            TestStatus::NoTests => glyphs::WARN,
        }
    }
}

/// One file's grouped test outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessedTestResult {
    pub file: String,
    pub status: TestStatus,
    pub passed: usize,
    pub total: usize,
    /// `"✅ name"` / `"❌ name"`, in record order.
    pub details: Vec<String>,
}

impl ProcessedTestResult {
    /// Row for a file known to have no associated test file.
    pub fn no_tests(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            status: TestStatus::NoTests,
            passed: 0,
            total: 0,
            details: vec![],
        }
    }
}

/// One file's coverage, with not-covered rows compressed to `"3, 5-7, 10"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedCoverageResult {
    pub file: String,
    pub coverage: Option<f64>,
    pub not_covered_lines: String,
}

// =============================================================================
// Collection
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// One `opa test` invocation over the whole directory.
    Directory,
    /// One invocation per matched test/implementation pair.
    #[default]
    PerFile,
}

impl std::str::FromStr for RunMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directory" => Ok(RunMode::Directory),
            "per-file" | "individual" => Ok(RunMode::PerFile),
            other => Err(format!("invalid mode: {}", other)),
        }
    }
}

/// Raw stdout/stderr/exit bundle handed from the collector to the normalizer.
///
/// The coverage fields are `Some` iff coverage was requested.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectedOutput {
    pub output: String,
    pub error: String,
    pub exit_code: i32,
    pub coverage_output: Option<String>,
    pub coverage_exit_code: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegoReportError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}
