//! Gherkin-style BDD tests for the rego-report CLI.
//!
//! We run these as a standalone test binary (harness = false) so cucumber can
//! own `main()` and exit codes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use cucumber::{given, then, when, World};

#[derive(World, Debug, Default)]
struct ReportWorld {
    tmp: Option<tempfile::TempDir>,
    tests_json: Option<PathBuf>,
    coverage_json: Option<PathBuf>,
    no_test_files: Option<String>,
    exit_code: Option<i32>,
    markdown: Option<String>,
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[given(expr = "saved test output {string}")]
async fn given_tests(world: &mut ReportWorld, name: String) {
    world.tmp = Some(tempfile::tempdir().expect("tempdir"));
    world.tests_json = Some(fixture(&name));
    world.coverage_json = None;
    world.no_test_files = None;
    world.exit_code = None;
    world.markdown = None;
}

#[given(expr = "saved coverage output {string}")]
async fn given_coverage(world: &mut ReportWorld, name: String) {
    world.coverage_json = Some(fixture(&name));
}

#[given(expr = "files without tests {string}")]
async fn given_untested(world: &mut ReportWorld, files: String) {
    world.no_test_files = Some(files);
}

#[when("I render the report")]
async fn when_render(world: &mut ReportWorld) {
    let tmp = world.tmp.as_ref().expect("temp dir");
    let md_path = tmp.path().join("artifacts/rego-report/comment.md");

    let exe = env!("CARGO_BIN_EXE_rego-report");
    let mut cmd = Command::new(exe);
    cmd.arg("render")
        .arg("--tests")
        .arg(world.tests_json.as_ref().expect("tests fixture"))
        .arg("--md")
        .arg(&md_path);

    if let Some(cov) = &world.coverage_json {
        cmd.arg("--coverage-json").arg(cov);
    }
    if let Some(files) = &world.no_test_files {
        cmd.arg("--no-test-files").arg(files);
    }

    let out = cmd.output().expect("run rego-report");
    world.exit_code = out.status.code();

    if md_path.exists() {
        world.markdown = fs::read_to_string(&md_path).ok();
    }
}

#[then(expr = "the exit code is {int}")]
async fn then_exit_code(world: &mut ReportWorld, expected: i32) {
    assert_eq!(
        world.exit_code,
        Some(expected),
        "expected exit code {expected}, got {:?}",
        world.exit_code
    );
}

#[then(expr = "the markdown contains {string}")]
async fn then_markdown_contains(world: &mut ReportWorld, expected: String) {
    let markdown = world.markdown.as_ref().expect("markdown output should exist");
    assert!(
        markdown.contains(&expected),
        "expected markdown to contain '{}', got:\n{}",
        expected,
        markdown
    );
}

#[then(expr = "the markdown does not contain {string}")]
async fn then_markdown_lacks(world: &mut ReportWorld, unexpected: String) {
    let markdown = world.markdown.as_ref().expect("markdown output should exist");
    assert!(
        !markdown.contains(&unexpected),
        "expected markdown not to contain '{}', got:\n{}",
        unexpected,
        markdown
    );
}

#[tokio::main]
async fn main() {
    let features = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../features");

    ReportWorld::run(features).await;
}
