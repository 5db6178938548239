//! Automatic and operator-requested retries.

use super::helpers::{WorldBuilder, badge_result, has_log, main_branch, retrying_config};
use coda::config::RunnerConfig;
use coda::job::{
    adapters::memory::{InMemoryVersionControl, ScriptedGenerator, VcsOperation},
    domain::JobStatus,
    ports::ProviderError,
    services::{CreateJobRequest, ExecutionOutcome},
};
use eyre::{Result, ensure};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transient_failure_recovers_on_automatic_retry() -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::new([
        Err(ProviderError::Failed("socket hang up".to_owned())),
        Ok(badge_result()),
    ]))
    .config(retrying_config())
    .build();

    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    let outcome = handle.await?;

    let done = outcome
        .job()
        .ok_or_else(|| eyre::eyre!("job should finish"))?;
    ensure!(done.status() == JobStatus::PrOpened, "retry succeeds");
    ensure!(done.retry_count() == 1, "one retry consumed");
    ensure!(has_log(done.logs(), "Auto-retrying..."), "retry logged");
    ensure!(
        world.notifier.statuses().contains(&JobStatus::Failed),
        "intermediate failure announced"
    );
    ensure!(
        world.repository.status_history(job.id()).iter().filter(|status| **status == JobStatus::Coding).count() == 2,
        "generation ran twice"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn persistent_failure_stops_after_one_retry() -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::always(Err(ProviderError::Failed(
        "model unavailable".to_owned(),
    ))))
    .config(RunnerConfig {
        max_automatic_retries: 3,
        ..retrying_config()
    })
    .build();

    let (_job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    let outcome = handle.await?;

    let ExecutionOutcome::Failed(failed) = outcome else {
        eyre::bail!("expected failure, got {outcome:?}");
    };
    ensure!(failed.retry_count() == 1, "retries capped at one");
    ensure!(world.generator.requests().len() == 2, "two attempts made");
    ensure!(
        failed.error() == Some("code generation failed: model unavailable"),
        "last error kept"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabled_auto_retry_fails_immediately() -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::always(Err(ProviderError::NotConfigured))).build();

    let (_job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    let outcome = handle.await?;

    let failed = outcome.job().ok_or_else(|| eyre::eyre!("job should finish"))?;
    ensure!(failed.retry_count() == 0, "no retry consumed");
    ensure!(!has_log(failed.logs(), "Auto-retrying..."), "no retry logged");
    ensure!(world.generator.requests().len() == 1, "single attempt");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn manual_retry_after_the_cause_is_fixed() -> Result<()> {
    let vcs = InMemoryVersionControl::new(main_branch()).failing_on(VcsOperation::Push);
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(badge_result())))
        .vcs(vcs)
        .build();
    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    ensure!(
        matches!(handle.await?, ExecutionOutcome::Failed(_)),
        "push failure fails the job"
    );

    world.vcs.recover(VcsOperation::Push);
    let (requeued, retry_handle) = world.service.resubmit(job.id()).await?;
    let outcome = retry_handle.await?;

    ensure!(requeued.status() == JobStatus::Queued, "job re-queued");
    let done = outcome.job().ok_or_else(|| eyre::eyre!("job should finish"))?;
    ensure!(done.status() == JobStatus::PrOpened, "retry completes");
    ensure!(done.retry_count() == 1, "manual retry counted");
    ensure!(
        world.vcs.count(VcsOperation::CreateBranch) == 2,
        "branch recreated for the retry"
    );
    ensure!(has_log(done.logs(), "Job retry requested"), "retry logged");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn manual_retry_consumes_the_automatic_budget() -> Result<()> {
    let world = WorldBuilder::new(ScriptedGenerator::always(Err(ProviderError::TimedOut(5))))
        .config(retrying_config())
        .build();
    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    handle.await?;
    ensure!(world.generator.requests().len() == 2, "one automatic retry");

    let (_requeued, retry_handle) = world.service.resubmit(job.id()).await?;
    let outcome = retry_handle.await?;

    let failed = outcome.job().ok_or_else(|| eyre::eyre!("job should finish"))?;
    ensure!(failed.retry_count() == 2, "manual retry counted");
    ensure!(
        world.generator.requests().len() == 3,
        "no further automatic retry"
    );
    Ok(())
}
