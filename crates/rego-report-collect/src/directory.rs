//! Directory mode: one `opa test` over the whole tree, plus an optional coverage pass.

use std::path::{Path, PathBuf};

use rego_report_types::CollectedOutput;
use tracing::info;

use crate::{run_pass, Collector, CommandRunner, OpaCommand};

pub struct DirectoryCollector<R: CommandRunner> {
    runner: R,
    cwd: PathBuf,
    path: String,
    opa: OpaCommand,
}

impl<R: CommandRunner> DirectoryCollector<R> {
    pub fn new(runner: R, cwd: &Path, path: &str, opa: OpaCommand) -> Self {
        Self {
            runner,
            cwd: cwd.to_path_buf(),
            path: path.to_string(),
            opa,
        }
    }
}

impl<R: CommandRunner> Collector for DirectoryCollector<R> {
    /// Output is returned verbatim: no retry, no interpretation of exit codes.
    fn collect(&self, run_coverage: bool) -> CollectedOutput {
        let argv = self.opa.test_argv(&[&self.path], false);
        let test = run_pass(&self.runner, &self.cwd, &argv);

        let mut out = CollectedOutput {
            output: test.stdout,
            error: test.stderr,
            exit_code: test.exit,
            coverage_output: None,
            coverage_exit_code: None,
        };

        if run_coverage {
            let argv = self.opa.test_argv(&[&self.path], true);
            let cov = run_pass(&self.runner, &self.cwd, &argv);
            if !cov.stderr.is_empty() {
                out.error.push_str(&format!("\nCoverage: {}", cov.stderr));
            }
            out.coverage_output = Some(cov.stdout);
            out.coverage_exit_code = Some(cov.exit);
        } else {
            info!("coverage reporting skipped: coverage was not requested");
        }

        info!(path = %self.path, exit_code = out.exit_code, "OPA test commands completed");
        out
    }
}
