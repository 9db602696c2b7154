//! Per-file mode: pair every `*<suffix>.rego` test with its implementation file and
//! run `opa test` once per pair.
//!
//! `opa test <dir>` cannot always pair a test with the right sibling when the layout is
//! non-standard, so the pairing is done here explicitly. Failures are accumulated per file
//! and never abort the batch.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rego_report_types::{CollectedOutput, RawCoverageFile, RawTestRecord, REGO_EXTENSION};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{run_pass, Collector, CommandRunner, OpaCommand};

pub struct PerFileCollector<R: CommandRunner> {
    runner: R,
    cwd: PathBuf,
    base_path: String,
    test_suffix: String,
    opa: OpaCommand,
}

/// Running state threaded through the per-file loop.
#[derive(Debug, Default)]
struct Accumulator {
    records: Vec<RawTestRecord>,
    coverage: IndexMap<String, RawCoverageFile>,
    error: String,
    exit_code: i32,
    coverage_exit_code: i32,
}

impl Accumulator {
    fn push_error(&mut self, line: impl AsRef<str>) {
        self.error.push_str(line.as_ref());
        self.error.push('\n');
    }

    fn finish(mut self, run_coverage: bool) -> CollectedOutput {
        let output = match serde_json::to_string(&self.records) {
            Ok(s) => s,
            Err(e) => {
                self.push_error(format!("Error serializing test results: {}", e));
                self.exit_code = 1;
                "[]".to_string()
            }
        };

        let (coverage_output, coverage_exit_code) = if run_coverage {
            let envelope = serde_json::json!({ "files": self.coverage });
            (Some(envelope.to_string()), Some(self.coverage_exit_code))
        } else {
            (None, None)
        };

        CollectedOutput {
            output,
            error: self.error,
            exit_code: self.exit_code,
            coverage_output,
            coverage_exit_code,
        }
    }
}

impl<R: CommandRunner> PerFileCollector<R> {
    pub fn new(runner: R, cwd: &Path, base_path: &str, test_suffix: &str, opa: OpaCommand) -> Self {
        Self {
            runner,
            cwd: cwd.to_path_buf(),
            base_path: base_path.to_string(),
            test_suffix: test_suffix.to_string(),
            opa,
        }
    }

    fn test_file_ending(&self) -> String {
        format!("{}{}", self.test_suffix, REGO_EXTENSION)
    }

    /// Recursively find test files beneath the base path, in sorted order.
    ///
    /// Returned paths keep the base path's spelling, so `opa` reports them the way the
    /// user wrote them.
    fn discover_tests(&self, acc: &mut Accumulator) -> Vec<PathBuf> {
        let ending = self.test_file_ending();
        let root = self.cwd.join(&self.base_path);
        let mut found = vec![];

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    acc.push_error(format!("Error searching {}: {}", self.base_path, e));
                    acc.exit_code = 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .file_name()
                .to_str()
                .map(|name| name.ends_with(&ending))
                .unwrap_or(false);
            if !matches {
                continue;
            }
            let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            found.push(Path::new(&self.base_path).join(rel));
        }

        found
    }

    /// Look for `<base>.rego` next to the test, then one directory up.
    fn find_implementation(&self, test_file: &Path) -> Option<PathBuf> {
        let impl_name = implementation_name(test_file, &self.test_file_ending())?;
        let dir = test_file.parent().unwrap_or(Path::new(""));

        [dir.to_path_buf(), dir.join("..")]
            .into_iter()
            .map(|d| d.join(&impl_name))
            .find(|candidate| self.cwd.join(candidate).is_file())
    }

    fn collect_pair(&self, test: &str, implementation: &str, run_coverage: bool, acc: &mut Accumulator) {
        let argv = self.opa.test_argv(&[test, implementation], false);
        let pass = run_pass(&self.runner, &self.cwd, &argv);

        if pass.exit != 0 {
            acc.exit_code = pass.exit;
        }
        acc.error.push_str(&pass.stderr);

        match parse_test_records(&pass.stdout) {
            Ok(records) => {
                debug!(test, records = records.len(), "parsed test records");
                acc.records.extend(records);
            }
            Err(e) => {
                acc.push_error(format!("Error parsing test results for {}: {}", test, e));
                acc.exit_code = 1;
            }
        }

        if !run_coverage {
            return;
        }

        let argv = self.opa.test_argv(&[test, implementation], true);
        let cov = run_pass(&self.runner, &self.cwd, &argv);
        acc.coverage_exit_code = acc.coverage_exit_code.max(cov.exit);
        if !cov.stderr.is_empty() {
            acc.error.push_str(&format!("Coverage error for {}: {}", test, cov.stderr));
        }

        match parse_coverage_files(&cov.stdout) {
            // Pairs are disjoint, so collisions are not expected; last write wins.
            Ok(files) => acc.coverage.extend(files),
            Err(e) => {
                acc.push_error(format!("Error parsing coverage for {}: {}", test, e));
                acc.coverage_exit_code = acc.coverage_exit_code.max(1);
            }
        }
    }
}

impl<R: CommandRunner> Collector for PerFileCollector<R> {
    fn collect(&self, run_coverage: bool) -> CollectedOutput {
        let mut acc = Accumulator::default();

        for test_file in self.discover_tests(&mut acc) {
            let test = test_file.to_string_lossy().to_string();

            let Some(implementation) = self.find_implementation(&test_file) else {
                warn!(test = %test, "no implementation file found");
                acc.push_error(format!("Error: Implementation file not found for test: {}", test));
                acc.exit_code = 1;
                if run_coverage {
                    acc.coverage_exit_code = 1;
                }
                continue;
            };

            let implementation = implementation.to_string_lossy().to_string();
            self.collect_pair(&test, &implementation, run_coverage, &mut acc);
        }

        acc.finish(run_coverage)
    }
}

/// `tests/foo_test.rego` with ending `_test.rego` -> `foo.rego`.
fn implementation_name(test_file: &Path, ending: &str) -> Option<String> {
    let name = test_file.file_name()?.to_str()?;
    let base = name.strip_suffix(ending)?;
    Some(format!("{}{}", base, REGO_EXTENSION))
}

/// A JSON value that is not an array contributes no records.
fn parse_test_records(stdout: &str) -> Result<Vec<RawTestRecord>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(stdout)?;
    if value.is_array() {
        serde_json::from_value(value)
    } else {
        Ok(vec![])
    }
}

/// An object without `files` contributes nothing.
fn parse_coverage_files(stdout: &str) -> Result<IndexMap<String, RawCoverageFile>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(stdout)?;
    match value.get("files") {
        Some(files) => serde_json::from_value(files.clone()),
        None => Ok(IndexMap::new()),
    }
}
