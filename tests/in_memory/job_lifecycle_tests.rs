//! Stage progression through the public service API.

use super::helpers::{WorldBuilder, badge_result, has_log, main_branch, test_config};
use coda::config::RunnerConfig;
use coda::job::{
    adapters::memory::{InMemoryVersionControl, ScriptedGenerator, VcsOperation},
    domain::{CodePatch, GenerationResult, JobStatus, PatchOperation},
    ports::{JobRepository, ProviderError},
    services::{CreateJobRequest, ExecutionOutcome},
};
use eyre::{Result, ensure};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn job_moves_from_queued_to_review_request() -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(badge_result()))).build();

    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    let outcome = handle.await?;

    let ExecutionOutcome::Completed(done) = outcome else {
        eyre::bail!("expected completion, got {outcome:?}");
    };
    ensure!(
        world.repository.status_history(job.id())
            == vec![
                JobStatus::Queued,
                JobStatus::Coding,
                JobStatus::Patching,
                JobStatus::Testing,
                JobStatus::PrOpened,
            ],
        "every stage is visited in order"
    );
    ensure!(done.pr_url().is_some(), "review URL recorded");
    ensure!(done.error().is_none(), "no error recorded");
    ensure!(
        has_log(done.logs(), "Changes committed: feat: Add README badge"),
        "commit type inferred from the task"
    );
    ensure!(
        world.vcs.checked_out() == main_branch(),
        "original branch restored"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dry_run_completes_without_publishing() -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(badge_result()))).build();

    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo").with_dry_run(true))
        .await?;
    handle.await?;

    let stored = world.service.get_job(job.id()).await?;
    ensure!(stored.status() == JobStatus::PrOpened, "dry run completes");
    ensure!(stored.pr_url().is_none(), "no review URL");
    ensure!(world.vcs.count(VcsOperation::Push) == 0, "nothing pushed");
    ensure!(
        world.vcs.count(VcsOperation::OpenReviewRequest) == 0,
        "no review request"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn oversized_generation_is_rejected_by_guardrails() -> Result<()> {
    let patches = (0..3)
        .map(|index| CodePatch::new(format!("src/file_{index}.rs"), "// generated", PatchOperation::Create))
        .collect();
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(GenerationResult {
        patches,
        ..badge_result()
    })))
    .config(RunnerConfig {
        max_changed_files: 2,
        ..test_config()
    })
    .build();

    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Split the parser", "/srv/demo"))
        .await?;
    let outcome = handle.await?;

    ensure!(matches!(outcome, ExecutionOutcome::Failed(_)), "job fails");
    let stored = world.service.get_job(job.id()).await?;
    ensure!(stored.status() == JobStatus::Failed, "failure persisted");
    let error = stored.error().unwrap_or_default();
    ensure!(error.contains("limit of 2"), "error names the limit: {error}");
    ensure!(
        world.vcs.count(VcsOperation::CreateBranch) == 0,
        "repository untouched"
    );
    ensure!(
        world.notifier.statuses().last() == Some(&JobStatus::Failed),
        "failure announced"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn diff_budget_scales_with_the_multiplier() -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(GenerationResult {
        patches: vec![CodePatch::new("big.txt", "x".repeat(31), PatchOperation::Create)],
        ..badge_result()
    })))
    .config(RunnerConfig {
        max_diff_size: 3,
        diff_size_multiplier: 10,
        ..test_config()
    })
    .build();

    let (_job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add a big file", "/srv/demo"))
        .await?;
    let outcome = handle.await?;

    let failed = outcome.job().ok_or_else(|| eyre::eyre!("job should finish"))?;
    ensure!(
        failed
            .error()
            .is_some_and(|error| error.contains("31 characters exceeds the limit of 30")),
        "diff budget enforced"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn version_control_failure_fails_the_job() -> Result<()> {
    let vcs = InMemoryVersionControl::new(main_branch()).failing_on(VcsOperation::Commit);
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(badge_result())))
        .vcs(vcs)
        .build();

    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    handle.await?;

    let stored = world
        .repository
        .find_by_id(job.id())
        .await?
        .ok_or_else(|| eyre::eyre!("job exists"))?;
    ensure!(stored.status() == JobStatus::Failed, "job failed");
    ensure!(
        has_log(stored.logs(), "Error: git Commit failed: injected failure"),
        "failure logged"
    );
    ensure!(world.vcs.count(VcsOperation::Push) == 0, "nothing pushed");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listings_reflect_finished_runs() -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::new([
        Ok(badge_result()),
        Err(ProviderError::Failed("quota".to_owned())),
    ]))
    .build();

    let (first, first_handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    first_handle.await?;
    let (second, second_handle) = world
        .service
        .submit(CreateJobRequest::new("Add changelog", "/srv/demo"))
        .await?;
    second_handle.await?;

    let failed = world.service.list_jobs_by_status(JobStatus::Failed).await?;
    let opened = world.service.list_jobs_by_status(JobStatus::PrOpened).await?;
    ensure!(
        failed.iter().map(|job| job.id()).eq([second.id()]),
        "failed listing"
    );
    ensure!(
        opened.iter().map(|job| job.id()).eq([first.id()]),
        "completed listing"
    );
    ensure!(
        world.service.list_jobs_by_repo("/srv/demo").await?.len() == 2,
        "repository listing"
    );
    Ok(())
}
