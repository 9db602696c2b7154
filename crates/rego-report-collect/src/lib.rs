//! Run `opa test` and gather its raw output.
//!
//! This crate is written as an adapter boundary: process execution lives behind a small
//! trait so the collectors can be tested without an `opa` binary on the host.

pub mod debug_log;
pub mod directory;
pub mod per_file;

use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use rego_report_types::{flags, CollectedOutput, RegoReportError, RunMode, DEFAULT_OPA_BIN};

pub use debug_log::{DebugLog, FileDebugLog, LoggingCommandRunner};
pub use directory::DirectoryCollector;
pub use per_file::PerFileCollector;

pub trait CommandRunner: Send + Sync {
    fn run(&self, cwd: &Path, argv: &[String]) -> Result<CmdOutput, RegoReportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdOutput {
    pub exit: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub struct OsCommandRunner;

impl CommandRunner for OsCommandRunner {
    fn run(&self, cwd: &Path, argv: &[String]) -> Result<CmdOutput, RegoReportError> {
        if argv.is_empty() {
            return Err(RegoReportError::Runtime("empty argv".into()));
        }

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd.current_dir(cwd);

        let out = cmd
            .output()
            .map_err(|e| RegoReportError::Runtime(format!("spawn {}: {}", argv[0], e)))?;
        Ok(CmdOutput {
            exit: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        })
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn run(&self, cwd: &Path, argv: &[String]) -> Result<CmdOutput, RegoReportError> {
        (**self).run(cwd, argv)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, cwd: &Path, argv: &[String]) -> Result<CmdOutput, RegoReportError> {
        (**self).run(cwd, argv)
    }
}

/// How to spell an `opa test` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaCommand {
    pub bin: String,
    pub v0_compatible: bool,
}

impl Default for OpaCommand {
    fn default() -> Self {
        Self {
            bin: DEFAULT_OPA_BIN.to_string(),
            v0_compatible: true,
        }
    }
}

impl OpaCommand {
    /// `opa test <targets..> --format=json [--coverage] [--v0-compatible]`
    pub fn test_argv(&self, targets: &[&str], coverage: bool) -> Vec<String> {
        let mut argv = vec![self.bin.clone(), flags::TEST.to_string()];
        argv.extend(targets.iter().map(|t| t.to_string()));
        argv.push(flags::FORMAT_JSON.to_string());
        if coverage {
            argv.push(flags::COVERAGE.to_string());
        }
        if self.v0_compatible {
            argv.push(flags::V0_COMPATIBLE.to_string());
        }
        argv
    }
}

/// Result of one blocking invocation, flattened so callers never branch on spawn errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PassOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit: i32,
}

pub(crate) fn run_pass<R: CommandRunner>(runner: &R, cwd: &Path, argv: &[String]) -> PassOutput {
    match runner.run(cwd, argv) {
        // No exit code means the process was killed by a signal.
        Ok(out) => PassOutput {
            stdout: out.stdout,
            stderr: out.stderr,
            exit: out.exit.unwrap_or(1),
        },
        Err(e) => PassOutput {
            stdout: String::new(),
            stderr: format!("{}\n", e),
            exit: 1,
        },
    }
}

/// The "collect raw results" capability. One implementation per [`RunMode`].
pub trait Collector {
    fn collect(&self, run_coverage: bool) -> CollectedOutput;
}

/// Everything a collector needs besides the runner.
#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub mode: RunMode,
    pub cwd: std::path::PathBuf,
    pub path: String,
    pub test_suffix: String,
    pub opa: OpaCommand,
}

/// Select the collector for `req.mode` and run it.
pub fn collect<R: CommandRunner>(runner: R, req: &CollectRequest, run_coverage: bool) -> CollectedOutput {
    match req.mode {
        RunMode::Directory => {
            DirectoryCollector::new(runner, &req.cwd, &req.path, req.opa.clone()).collect(run_coverage)
        }
        RunMode::PerFile => PerFileCollector::new(
            runner,
            &req.cwd,
            &req.path,
            &req.test_suffix,
            req.opa.clone(),
        )
        .collect(run_coverage),
    }
}

/// Fake/test adapters for use in other crates' tests.
pub mod fakes {
    use super::*;
    use std::collections::HashMap;

    /// A fake CommandRunner that answers by full argv (joined with spaces).
    ///
    /// Unknown commands answer like a shell would for a missing binary (exit 127).
    /// Every call is recorded so tests can assert which invocations happened.
    #[derive(Default)]
    pub struct FakeCommandRunner {
        responses: HashMap<String, Result<CmdOutput, String>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeCommandRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_response(mut self, argv: impl Into<String>, output: CmdOutput) -> Self {
            self.responses.insert(argv.into(), Ok(output));
            self
        }

        /// Convenience for the common case: exit 0 with the given stdout.
        pub fn with_stdout(self, argv: impl Into<String>, stdout: impl Into<String>) -> Self {
            self.with_response(
                argv,
                CmdOutput {
                    exit: Some(0),
                    stdout: stdout.into(),
                    stderr: String::new(),
                },
            )
        }

        /// Make the runner itself fail (as if the binary could not be spawned).
        pub fn with_error(mut self, argv: impl Into<String>, message: impl Into<String>) -> Self {
            self.responses.insert(argv.into(), Err(message.into()));
            self
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    impl CommandRunner for FakeCommandRunner {
        fn run(&self, _cwd: &Path, argv: &[String]) -> Result<CmdOutput, RegoReportError> {
            if argv.is_empty() {
                return Err(RegoReportError::Runtime("empty argv".into()));
            }
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(argv.to_vec());
            }
            match self.responses.get(&argv.join(" ")) {
                Some(Ok(out)) => Ok(out.clone()),
                Some(Err(msg)) => Err(RegoReportError::Runtime(msg.clone())),
                None => Ok(CmdOutput {
                    exit: Some(127),
                    stdout: String::new(),
                    stderr: format!("command not found: {}", argv[0]),
                }),
            }
        }
    }
}
