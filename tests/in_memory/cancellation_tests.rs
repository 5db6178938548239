//! Cancellation before and during execution.

use std::sync::Arc;

use super::helpers::{WorldBuilder, badge_result, has_log, main_branch, retrying_config};
use coda::job::{
    adapters::memory::{
        InMemoryVersionControl, InMemoryWorkspace, ScriptedGenerator, StageGate, VcsOperation,
    },
    domain::JobStatus,
    services::{CreateJobRequest, ExecutionOutcome},
};
use eyre::{Result, ensure};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancellation_during_tests_wins_over_the_run() -> Result<()> {
    let gate = Arc::new(StageGate::new());
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(badge_result())))
        .workspace(InMemoryWorkspace::new().with_test_gate(Arc::clone(&gate)))
        .build();

    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    gate.wait_started().await;
    ensure!(
        world.service.get_job(job.id()).await?.status() == JobStatus::Testing,
        "job is testing"
    );

    let cancelled = world.service.cancel_job(job.id()).await?;
    gate.release();
    let outcome = handle.await?;

    ensure!(cancelled.status() == JobStatus::Cancelled, "cancel accepted");
    ensure!(
        outcome == ExecutionOutcome::Cancelled(job.id()),
        "run abandoned"
    );
    let stored = world.service.get_job(job.id()).await?;
    ensure!(stored.status() == JobStatus::Cancelled, "status stays cancelled");
    ensure!(has_log(stored.logs(), "Job cancelled"), "cancel logged");
    ensure!(world.vcs.count(VcsOperation::Push) == 0, "nothing pushed");
    ensure!(world.vcs.checked_out() == main_branch(), "branch restored");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancellation_during_generation_stops_before_patching() -> Result<()> {
    let gate = Arc::new(StageGate::new());
    let workspace = InMemoryWorkspace::new();
    let world = WorldBuilder::new(
        ScriptedGenerator::always(Ok(badge_result())).with_gate(Arc::clone(&gate)),
    )
    .workspace(workspace.clone())
    .config(retrying_config())
    .build();

    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    gate.wait_started().await;
    ensure!(
        world.service.get_job(job.id()).await?.status() == JobStatus::Coding,
        "job is coding"
    );

    world.service.cancel_job(job.id()).await?;
    gate.release();
    let outcome = handle.await?;

    ensure!(
        outcome == ExecutionOutcome::Cancelled(job.id()),
        "run abandoned"
    );
    ensure!(
        world.repository.status_history(job.id())
            == [JobStatus::Queued, JobStatus::Coding, JobStatus::Cancelled],
        "status path ends at cancelled"
    );
    ensure!(
        world.generator.requests().len() == 1,
        "generation finished once and was not retried"
    );
    ensure!(workspace.apply_calls() == 0, "no patch applied");
    for operation in [
        VcsOperation::CreateBranch,
        VcsOperation::Commit,
        VcsOperation::Push,
        VcsOperation::OpenReviewRequest,
    ] {
        ensure!(world.vcs.count(operation) == 0, "{:?} not called", operation);
    }
    ensure!(world.vcs.checked_out() == main_branch(), "branch restored");
    let stored = world.service.get_job(job.id()).await?;
    ensure!(stored.status() == JobStatus::Cancelled, "status stays cancelled");
    ensure!(stored.retry_count() == 0, "no retry consumed");
    ensure!(
        !world.notifier.statuses().contains(&JobStatus::Failed),
        "no failure announced"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancellation_during_push_opens_no_review_request() -> Result<()> {
    let gate = Arc::new(StageGate::new());
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(badge_result())))
        .vcs(
            InMemoryVersionControl::new(main_branch())
                .gated_on(VcsOperation::Push, Arc::clone(&gate)),
        )
        .config(retrying_config())
        .build();

    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    gate.wait_started().await;

    world.service.cancel_job(job.id()).await?;
    gate.release();
    let outcome = handle.await?;

    ensure!(
        outcome == ExecutionOutcome::Cancelled(job.id()),
        "run abandoned"
    );
    ensure!(
        world.repository.status_history(job.id())
            == [
                JobStatus::Queued,
                JobStatus::Coding,
                JobStatus::Patching,
                JobStatus::Testing,
                JobStatus::Cancelled,
            ],
        "status path ends at cancelled"
    );
    ensure!(world.vcs.count(VcsOperation::Push) == 1, "held push completed");
    ensure!(
        world.vcs.count(VcsOperation::OpenReviewRequest) == 0,
        "no review request opened"
    );
    ensure!(world.generator.requests().len() == 1, "no retry attempted");
    let stored = world.service.get_job(job.id()).await?;
    ensure!(stored.status() == JobStatus::Cancelled, "status stays cancelled");
    ensure!(stored.pr_url().is_none(), "no review request recorded");
    ensure!(stored.error().is_none(), "no failure recorded");
    ensure!(world.vcs.checked_out() == main_branch(), "branch restored");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_twice_returns_the_same_record() -> Result<()> {
    let gate = Arc::new(StageGate::new());
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(badge_result())))
        .workspace(InMemoryWorkspace::new().with_test_gate(Arc::clone(&gate)))
        .build();
    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    gate.wait_started().await;

    let first = world.service.cancel_job(job.id()).await?;
    let second = world.service.cancel_job(job.id()).await?;
    gate.release();
    handle.await?;

    ensure!(first.status() == JobStatus::Cancelled, "first cancel applies");
    ensure!(second.status() == JobStatus::Cancelled, "second cancel is a no-op");
    ensure!(
        second
            .logs()
            .iter()
            .filter(|entry| entry.ends_with("Job cancelled"))
            .count()
            == 1,
        "cancellation logged once"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_job_can_be_retried() -> Result<()> {
    let gate = Arc::new(StageGate::new());
    let world = WorldBuilder::new(ScriptedGenerator::always(Ok(badge_result())))
        .workspace(InMemoryWorkspace::new().with_test_gate(Arc::clone(&gate)))
        .build();
    let (job, handle) = world
        .service
        .submit(CreateJobRequest::new("Add README badge", "/srv/demo"))
        .await?;
    gate.wait_started().await;
    world.service.cancel_job(job.id()).await?;
    gate.release();
    handle.await?;

    let (_requeued, retry_handle) = world.service.resubmit(job.id()).await?;
    gate.wait_started().await;
    gate.release();
    let outcome = retry_handle.await?;

    ensure!(
        outcome.job().is_some_and(|done| done.status() == JobStatus::PrOpened),
        "retried run completes"
    );
    Ok(())
}
