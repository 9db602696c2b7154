use std::path::PathBuf;

use anyhow::Context;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser, Subcommand};
use rego_report_app::{
    append_github_outputs, render_from_files, run_report, write_atomic, ReportOutput, RunContext,
    RunOverrides, FAILURE_MESSAGE,
};
use rego_report_render::RenderOptions;

#[derive(Parser, Debug)]
#[command(
    name = "rego-report",
    version,
    about = "Summarize OPA policy test and coverage results as a markdown table"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run `opa test`, normalize its JSON output, and render the results table.
    ///
    /// Every option can also come from rego-report.toml or from the environment
    /// variables used by the GitHub Action.
    #[command(
        after_help = "EXAMPLES:\n    rego-report run --path policies --test-file-postfix _test\n    rego-report run --mode directory --path policies --test-file-postfix _test --coverage --md comment.md"
    )]
    Run {
        /// directory|per-file (blank is unset; unknown values run per file)
        #[arg(long, env = "test_mode")]
        mode: Option<String>,

        /// Directory holding the policies and their tests
        #[arg(long, env = "path")]
        path: Option<String>,

        /// Test file suffix before `.rego`, e.g. `_test`
        #[arg(long, env = "test_file_postfix")]
        test_file_postfix: Option<String>,

        /// Also run `opa test --coverage` and add a Coverage column
        #[arg(long, env = "run_coverage_report", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
        coverage: bool,

        /// Append a NO TESTS row for every file listed in --no-test-files
        #[arg(long, env = "report_untested_files", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
        report_untested_files: bool,

        /// Newline-separated list of files that have no test file
        #[arg(long, env = "no_test_files")]
        no_test_files: Option<String>,

        /// Optional rego-report.toml path
        #[arg(long)]
        config: Option<PathBuf>,

        /// OPA binary to invoke
        #[arg(long)]
        opa_bin: Option<String>,

        /// Do not pass --v0-compatible to opa
        #[arg(long)]
        no_v0_compatible: bool,

        /// Working directory for opa invocations
        #[arg(long, default_value = ".")]
        cwd: PathBuf,

        /// Markdown output path (stdout when omitted)
        #[arg(long)]
        md: Option<PathBuf>,

        /// Append `parsed_results` and `tests_failed` to this GitHub Actions output file
        #[arg(long, env = "GITHUB_OUTPUT")]
        github_output: Option<PathBuf>,

        /// Log every opa invocation to artifacts/rego-report/raw.log.
        /// This is a side artifact that does NOT affect the report.
        #[arg(long)]
        debug: bool,

        /// Custom debug log file path (implies --debug).
        #[arg(long, env = "REGO_REPORT_DEBUG_LOG")]
        log_file: Option<PathBuf>,
    },

    /// Render the results table from saved `opa test --format=json` output.
    #[command(
        after_help = "EXAMPLES:\n    rego-report render --tests results.json\n    rego-report render --tests results.json --coverage-json coverage.json --md comment.md"
    )]
    Render {
        /// Output of `opa test --format=json`
        #[arg(long, value_name = "FILE")]
        tests: PathBuf,

        /// Output of `opa test --format=json --coverage`; adds the Coverage column
        #[arg(long, value_name = "FILE")]
        coverage_json: Option<PathBuf>,

        /// Test file suffix before `.rego`, used to match coverage rows
        #[arg(long, default_value = "_test")]
        test_file_postfix: String,

        /// Newline-separated list of files that have no test file
        #[arg(long)]
        no_test_files: Option<String>,

        /// Markdown output path (stdout when omitted)
        #[arg(long)]
        md: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Run {
            mode,
            path,
            test_file_postfix,
            coverage,
            report_untested_files,
            no_test_files,
            config,
            opa_bin,
            no_v0_compatible,
            cwd,
            md,
            github_output,
            debug,
            log_file,
        } => {
            let debug_log_path = if let Some(path) = log_file {
                Some(path)
            } else if debug {
                Some(PathBuf::from("artifacts/rego-report/raw.log"))
            } else {
                None
            };

            let ctx = RunContext {
                cwd,
                config_path: config,
                debug_log_path,
            };
            let overrides = RunOverrides {
                mode,
                path,
                test_file_postfix,
                run_coverage_report: coverage,
                report_untested_files,
                no_test_files,
                opa_bin,
                no_v0_compatible,
            };

            match run_report(&ctx, overrides).with_context(|| "run rego-report") {
                Ok(output) => {
                    if let Some(collected) = &output.collected {
                        if !collected.error.trim().is_empty() {
                            eprintln!("{}", collected.error.trim_end());
                        }
                    }
                    publish(&output.markdown, output.tests_failed, md.as_ref(), github_output.as_ref())?;
                    finish(&output)
                }
                Err(err) => {
                    publish(FAILURE_MESSAGE, false, md.as_ref(), github_output.as_ref())?;
                    eprintln!("rego-report: {:#}", err);
                    std::process::exit(1);
                }
            }
        }
        Command::Render {
            tests,
            coverage_json,
            test_file_postfix,
            no_test_files,
            md,
        } => {
            let render = RenderOptions {
                show_coverage: coverage_json.is_some(),
                test_suffix: test_file_postfix,
            };
            let output = render_from_files(&tests, coverage_json.as_deref(), no_test_files.as_deref(), &render)?;
            publish(&output.markdown, output.tests_failed, md.as_ref(), None)?;
            finish(&output)
        }
    }
}

fn publish(
    markdown: &str,
    tests_failed: bool,
    md: Option<&PathBuf>,
    github_output: Option<&PathBuf>,
) -> anyhow::Result<()> {
    match md {
        Some(path) => write_atomic(path, markdown.as_bytes())?,
        None => println!("{}", markdown),
    }
    if let Some(path) = github_output {
        append_github_outputs(path, markdown, tests_failed)?;
    }
    Ok(())
}

fn finish(output: &ReportOutput) -> anyhow::Result<()> {
    if output.tests_failed {
        eprintln!("rego-report: One or more OPA tests failed");
    }
    std::process::exit(output.exit_code());
}
