//! Composition root for rego-report.
//!
//! This crate wires config + collector + normalizer + renderer and writes artifacts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rego_report_collect::{
    collect, CollectRequest, CommandRunner, FileDebugLog, LoggingCommandRunner, OpaCommand,
    OsCommandRunner,
};
use rego_report_domain::{
    any_failed, no_test_results, parse_coverage_report, parse_test_records, process_coverage_report,
    process_test_results,
};
use rego_report_render::{render_markdown, RenderOptions};
use rego_report_types::{
    CollectedOutput, ProcessedCoverageResult, ProcessedTestResult, RegoReportError, RunMode,
    DEFAULT_OPA_BIN,
};
use serde::Deserialize;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "rego-report.toml";

/// Shown instead of the table whenever the pipeline produced nothing to render.
pub const FAILURE_MESSAGE: &str = "⛔️⛔️ An unknown error has occurred in generating the results, either from tests failing or an error running OPA or an issue with GitHub actions. View the logs for more information. ⛔️⛔️";

const GITHUB_OUTPUT_DELIMITER: &str = "REGO_REPORT_EOF";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: Option<RunMode>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub test_file_postfix: Option<String>,
    #[serde(default)]
    pub run_coverage_report: Option<bool>,
    #[serde(default)]
    pub report_untested_files: Option<bool>,
    #[serde(default)]
    pub no_test_files: Option<String>,
    #[serde(default)]
    pub opa_bin: Option<String>,
    #[serde(default)]
    pub v0_compatible: Option<bool>,
}

/// Values from flags/environment. `None` and `false` defer to the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    /// Raw `test_mode` input; see [`mode_from_input`].
    pub mode: Option<String>,
    pub path: Option<String>,
    pub test_file_postfix: Option<String>,
    pub run_coverage_report: bool,
    pub report_untested_files: bool,
    pub no_test_files: Option<String>,
    pub opa_bin: Option<String>,
    pub no_v0_compatible: bool,
}

/// Fully resolved options for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub mode: RunMode,
    pub path: String,
    pub test_file_postfix: String,
    pub run_coverage_report: bool,
    pub report_untested_files: bool,
    pub no_test_files: Option<String>,
    pub opa: OpaCommand,
}

impl ReportOptions {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            show_coverage: self.run_coverage_report,
            test_suffix: self.test_file_postfix.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub cwd: PathBuf,
    pub config_path: Option<PathBuf>,
    /// Raw `opa` invocation log. Side artifact only.
    pub debug_log_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub markdown: String,
    pub tests_failed: bool,
    pub results: Vec<ProcessedTestResult>,
    pub coverage: Vec<ProcessedCoverageResult>,
    /// `None` when rendering from saved files.
    pub collected: Option<CollectedOutput>,
}

impl ReportOutput {
    pub fn exit_code(&self) -> i32 {
        if self.tests_failed {
            2
        } else {
            0
        }
    }
}

pub fn load_config(cwd: &Path, config_path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = cwd.join(CONFIG_FILE);
            if p.exists() {
                p
            } else {
                return Ok(AppConfig::default());
            }
        }
    };

    let text = fs::read_to_string(&path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Merge config and overrides. Fails before any collection when required values are missing.
pub fn resolve_options(cfg: AppConfig, ov: RunOverrides) -> Result<ReportOptions, RegoReportError> {
    let path = ov.path.or(cfg.path).filter(|p| !p.trim().is_empty());
    let postfix = ov
        .test_file_postfix
        .or(cfg.test_file_postfix)
        .filter(|p| !p.trim().is_empty());

    let (Some(path), Some(test_file_postfix)) = (path, postfix) else {
        return Err(RegoReportError::Config(
            "both 'path' and 'test_file_postfix' must be set".into(),
        ));
    };

    let v0_compatible = !ov.no_v0_compatible && cfg.v0_compatible.unwrap_or(true);

    Ok(ReportOptions {
        mode: ov.mode.as_deref().and_then(mode_from_input).or(cfg.mode).unwrap_or_default(),
        path,
        test_file_postfix,
        run_coverage_report: ov.run_coverage_report || cfg.run_coverage_report.unwrap_or(false),
        report_untested_files: ov.report_untested_files || cfg.report_untested_files.unwrap_or(false),
        no_test_files: ov.no_test_files.or(cfg.no_test_files),
        opa: OpaCommand {
            bin: ov.opa_bin.or(cfg.opa_bin).unwrap_or_else(|| DEFAULT_OPA_BIN.to_string()),
            v0_compatible,
        },
    })
}

/// Interpret the Action's `test_mode` input.
///
/// Blank means unset. Anything other than a known mode runs per file.
pub fn mode_from_input(raw: &str) -> Option<RunMode> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<RunMode>() {
        Ok(mode) => Some(mode),
        Err(_) => {
            warn!(mode = raw, "unknown test mode, running per file");
            Some(RunMode::PerFile)
        }
    }
}

/// Run rego-report end-to-end against the real `opa` binary.
pub fn run_report(ctx: &RunContext, overrides: RunOverrides) -> anyhow::Result<ReportOutput> {
    let cfg = load_config(&ctx.cwd, ctx.config_path.as_deref())?;
    let opts = resolve_options(cfg, overrides)?;

    match &ctx.debug_log_path {
        Some(log_path) => {
            let writer = FileDebugLog::create(log_path)
                .with_context(|| format!("create debug log {}", log_path.display()))?;
            let runner = LoggingCommandRunner::new(OsCommandRunner, writer);
            run_report_with_runner(runner, &ctx.cwd, &opts)
        }
        None => run_report_with_runner(OsCommandRunner, &ctx.cwd, &opts),
    }
}

pub fn run_report_with_runner<R: CommandRunner>(
    runner: R,
    cwd: &Path,
    opts: &ReportOptions,
) -> anyhow::Result<ReportOutput> {
    let req = CollectRequest {
        mode: opts.mode,
        cwd: cwd.to_path_buf(),
        path: opts.path.clone(),
        test_suffix: opts.test_file_postfix.clone(),
        opa: opts.opa.clone(),
    };

    info!(mode = ?opts.mode, path = %opts.path, coverage = opts.run_coverage_report, "collecting");
    let collected = collect(runner, &req, opts.run_coverage_report);
    if collected.exit_code != 0 {
        warn!(exit_code = collected.exit_code, "opa test reported failures");
    }

    build_report(collected, opts)
}

/// Normalize and render already-collected output.
pub fn build_report(collected: CollectedOutput, opts: &ReportOptions) -> anyhow::Result<ReportOutput> {
    let records = parse_test_records(&collected.output).context("parse opa test output")?;

    let coverage_json = if opts.run_coverage_report {
        collected.coverage_output.as_deref()
    } else {
        None
    };
    let coverage = parse_coverage(coverage_json)?;

    let mut out = assemble(
        process_test_results(&records),
        coverage,
        opts.report_untested_files,
        opts.no_test_files.as_deref(),
        &opts.render_options(),
    );
    out.collected = Some(collected);
    Ok(out)
}

/// Render from raw JSON files saved from earlier `opa test` runs.
pub fn render_from_files(
    tests_path: &Path,
    coverage_path: Option<&Path>,
    no_test_files: Option<&str>,
    render: &RenderOptions,
) -> anyhow::Result<ReportOutput> {
    let tests = fs::read_to_string(tests_path).with_context(|| format!("read {}", tests_path.display()))?;
    let records = parse_test_records(&tests).with_context(|| format!("parse {}", tests_path.display()))?;

    let coverage_text = match coverage_path {
        Some(p) => Some(fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?),
        None => None,
    };
    let coverage = parse_coverage(coverage_text.as_deref())?;

    Ok(assemble(
        process_test_results(&records),
        coverage,
        no_test_files.is_some(),
        no_test_files,
        render,
    ))
}

fn parse_coverage(json: Option<&str>) -> anyhow::Result<Vec<ProcessedCoverageResult>> {
    match json {
        Some(text) if !text.trim().is_empty() => {
            let report = parse_coverage_report(text).context("parse opa coverage output")?;
            Ok(process_coverage_report(&report))
        }
        _ => Ok(vec![]),
    }
}

fn assemble(
    mut results: Vec<ProcessedTestResult>,
    coverage: Vec<ProcessedCoverageResult>,
    report_untested_files: bool,
    no_test_files: Option<&str>,
    render: &RenderOptions,
) -> ReportOutput {
    if report_untested_files {
        if let Some(list) = no_test_files {
            results.extend(no_test_results(list));
        }
    }

    let mut markdown = render_markdown(&results, &coverage, render);
    if markdown.is_empty() {
        markdown = FAILURE_MESSAGE.to_string();
    }

    ReportOutput {
        tests_failed: any_failed(&results),
        markdown,
        results,
        coverage,
        collected: None,
    }
}

/// `$GITHUB_OUTPUT` entries for the report and the failure flag.
pub fn github_outputs(markdown: &str, tests_failed: bool) -> String {
    format!(
        "parsed_results<<{d}\n{md}\n{d}\ntests_failed={tf}\n",
        d = GITHUB_OUTPUT_DELIMITER,
        md = markdown,
        tf = tests_failed
    )
}

pub fn append_github_outputs(path: &Path, markdown: &str, tests_failed: bool) -> anyhow::Result<()> {
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    f.write_all(github_outputs(markdown, tests_failed).as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    Ok(())
}

/// Write a file atomically: write temp + rename.
///
/// This avoids partial artifacts in CI.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
