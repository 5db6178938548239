//! Runs that write to a real working tree and run real test commands.

use camino::Utf8PathBuf;
use coda::job::{
    adapters::{filesystem::FsWorkspace, memory::ScriptedGenerator},
    domain::{CodePatch, GenerationResult, JobStatus, PatchOperation},
    services::{CreateJobRequest, ExecutionOutcome},
};
use eyre::{Result, ensure};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::helpers::{WorldBuilder, has_log};

struct Checkout {
    _dir: TempDir,
    root: Utf8PathBuf,
}

#[fixture]
fn checkout() -> Checkout {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
    std::fs::write(root.join("README.md"), "# Demo\n").expect("seed README");
    std::fs::write(root.join("obsolete.txt"), "remove me").expect("seed file");
    Checkout { _dir: dir, root }
}

fn generation(test_command: &str) -> GenerationResult {
    GenerationResult {
        patches: vec![
            CodePatch::new("README.md", "# Demo\n\nNow with docs.\n", PatchOperation::Modify),
            CodePatch::new("docs/usage.md", "Run `demo`.\n", PatchOperation::Create),
            CodePatch::new("obsolete.txt", "", PatchOperation::Delete),
        ],
        explanation: "Documents usage".to_owned(),
        test_commands: vec![test_command.to_owned()],
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn patches_land_on_disk_and_tests_run_in_the_tree(checkout: Checkout) -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(generation(
        "grep -q 'Now with docs' README.md && test -f docs/usage.md",
    ))))
    .workspace(FsWorkspace::new(checkout.root.clone()))
    .build();

    let (_job, handle) = world
        .service
        .submit(CreateJobRequest::new(
            "Document usage",
            checkout.root.as_str(),
        ))
        .await?;
    let outcome = handle.await?;

    ensure!(
        matches!(outcome, ExecutionOutcome::Completed(_)),
        "run completes: {outcome:?}"
    );
    ensure!(
        std::fs::read_to_string(checkout.root.join("docs/usage.md"))? == "Run `demo`.\n",
        "new file written"
    );
    ensure!(
        !checkout.root.join("obsolete.txt").exists(),
        "deleted file removed"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failing_command_output_is_kept_in_the_log(checkout: Checkout) -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(generation(
        "echo 'assertion failed: docs missing' >&2; exit 1",
    ))))
    .workspace(FsWorkspace::new(checkout.root.clone()))
    .build();

    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new(
            "Document usage",
            checkout.root.as_str(),
        ))
        .await?;
    handle.await?;

    let stored = world.service.get_job(job.id()).await?;
    ensure!(stored.status() == JobStatus::Failed, "job fails");
    ensure!(stored.error() == Some("tests failed"), "test failure recorded");
    ensure!(
        stored
            .logs()
            .iter()
            .any(|entry| entry.contains("assertion failed: docs missing")),
        "command output logged"
    );
    ensure!(has_log(stored.logs(), "Error: tests failed"), "error logged");
    Ok(())
}
