//! Side log of every `opa` invocation, for diagnosing CI runs.
//!
//! Each call becomes one numbered block:
//!
//! ```text
//! ## opa call 1 at 2026-01-01T00:00:00+00:00
//! $ opa test policies --format=json --v0-compatible
//! cwd: /repo
//! exit: 0
//! stdout: [{"location": ...
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rego_report_types::RegoReportError;

use crate::{CmdOutput, CommandRunner};

const PREVIEW_CHARS: usize = 200;

/// Destination for debug log blocks.
pub trait DebugLog: Send + Sync {
    fn record(&self, block: &str);
}

impl<L: DebugLog + ?Sized> DebugLog for &L {
    fn record(&self, block: &str) {
        (**self).record(block)
    }
}

/// Appends blocks to a file, flushing after each one so a crashed run still leaves a log.
pub struct FileDebugLog {
    file: Mutex<File>,
}

impl FileDebugLog {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            file: Mutex::new(File::create(path)?),
        })
    }
}

impl DebugLog for FileDebugLog {
    fn record(&self, block: &str) {
        let Ok(mut f) = self.file.lock() else {
            return;
        };
        // Best effort: write errors are dropped.
        let _ = f.write_all(block.as_bytes()).and_then(|_| f.flush());
    }
}

/// Runner decorator that logs each invocation before handing back the inner result unchanged.
pub struct LoggingCommandRunner<R, L> {
    inner: R,
    log: L,
    calls: AtomicUsize,
}

impl<R: CommandRunner, L: DebugLog> LoggingCommandRunner<R, L> {
    pub fn new(inner: R, log: L) -> Self {
        log.record(&format!(
            "# rego-report opa debug log, started {}\n\n",
            chrono::Utc::now().to_rfc3339()
        ));
        Self {
            inner,
            log,
            calls: AtomicUsize::new(0),
        }
    }
}

impl<R: CommandRunner, L: DebugLog> CommandRunner for LoggingCommandRunner<R, L> {
    fn run(&self, cwd: &Path, argv: &[String]) -> Result<CmdOutput, RegoReportError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let command = argv.join(" ");
        tracing::debug!(call = n, %command, "running opa");

        let result = self.inner.run(cwd, argv);

        let mut block = format!(
            "## opa call {} at {}\n$ {}\ncwd: {}\n",
            n,
            chrono::Utc::now().to_rfc3339(),
            command,
            cwd.display()
        );
        match &result {
            Ok(out) => {
                match out.exit {
                    Some(code) => block.push_str(&format!("exit: {}\n", code)),
                    None => block.push_str("exit: killed by signal\n"),
                }
                for (stream, text) in [("stdout", &out.stdout), ("stderr", &out.stderr)] {
                    let preview = one_line_preview(text, PREVIEW_CHARS);
                    if !preview.is_empty() {
                        block.push_str(&format!("{}: {}\n", stream, preview));
                    }
                }
            }
            Err(e) => block.push_str(&format!("spawn failed: {}\n", e)),
        }
        block.push('\n');
        self.log.record(&block);

        result
    }
}

/// Flatten line breaks and keep at most `max_chars` characters, marking the cut with `...`.
pub(crate) fn one_line_preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .trim()
        .chars()
        .map(|c| if matches!(c, '\n' | '\r') { ' ' } else { c })
        .collect();
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeCommandRunner;
    use proptest::prelude::*;

    #[derive(Default)]
    struct MemoryLog(Mutex<String>);

    impl MemoryLog {
        fn text(&self) -> String {
            self.0.lock().unwrap().clone()
        }
    }

    impl DebugLog for MemoryLog {
        fn record(&self, block: &str) {
            self.0.lock().unwrap().push_str(block);
        }
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn header_written_on_construction() {
        let log = MemoryLog::default();
        let _runner = LoggingCommandRunner::new(FakeCommandRunner::new(), &log);
        assert!(log.text().starts_with("# rego-report opa debug log, started "));
    }

    #[test]
    fn calls_are_numbered_with_command_and_output() {
        let inner = FakeCommandRunner::new()
            .with_stdout("opa test a_test.rego a.rego", "[{\"name\":\"t\"}]")
            .with_stdout("opa test b_test.rego b.rego", "[]");
        let log = MemoryLog::default();
        let runner = LoggingCommandRunner::new(inner, &log);

        runner.run(Path::new("/repo"), &argv(&["opa", "test", "a_test.rego", "a.rego"])).unwrap();
        runner.run(Path::new("/repo"), &argv(&["opa", "test", "b_test.rego", "b.rego"])).unwrap();

        let text = log.text();
        assert!(text.contains("## opa call 1 at "));
        assert!(text.contains("$ opa test a_test.rego a.rego\ncwd: /repo\nexit: 0\nstdout: [{\"name\":\"t\"}]\n"));
        assert!(text.contains("## opa call 2 at "));
        assert!(text.contains("$ opa test b_test.rego b.rego"));
    }

    #[test]
    fn spawn_failures_are_logged_and_returned() {
        let inner = FakeCommandRunner::new().with_error("opa", "spawn opa: not found");
        let log = MemoryLog::default();
        let runner = LoggingCommandRunner::new(inner, &log);

        assert!(runner.run(Path::new("/repo"), &argv(&["opa"])).is_err());
        assert!(log.text().contains("spawn failed: "));
        assert!(log.text().contains("not found"));
    }

    #[test]
    fn inner_result_passes_through() {
        let canned = CmdOutput {
            exit: Some(2),
            stdout: "out\nmore".to_string(),
            stderr: "err".to_string(),
        };
        let inner = FakeCommandRunner::new().with_response("opa", canned.clone());
        let log = MemoryLog::default();
        let runner = LoggingCommandRunner::new(inner, &log);

        assert_eq!(runner.run(Path::new("/repo"), &argv(&["opa"])).unwrap(), canned);
        assert!(log.text().contains("stdout: out more\nstderr: err\n"));
    }

    #[test]
    fn file_log_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("artifacts/rego-report/raw.log");
        let log = FileDebugLog::create(&path).unwrap();
        log.record("hello\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn preview_caps_by_chars_and_flattens() {
        assert_eq!(one_line_preview("  short  ", 200), "short");
        assert_eq!(one_line_preview(&"a".repeat(300), 200), format!("{}...", "a".repeat(200)));
        assert_eq!(one_line_preview("é".repeat(5).as_str(), 3), "ééé...");
        assert_eq!(one_line_preview("l1\nl2\r\nl3", 200), "l1 l2  l3");
    }

    proptest! {
        #[test]
        fn preview_is_single_line(s in ".*", max in 0usize..300) {
            let p = one_line_preview(&s, max);
            prop_assert!(!p.contains('\n') && !p.contains('\r'));
            prop_assert!(p.chars().count() <= max + 3);
        }
    }
}
