//! The lifecycle service running over `SQLite` storage.

use std::sync::Arc;
use std::time::Duration;

use super::helpers::{Database, database, job_for};
use coda::config::{ConfigHandle, RunnerConfig};
use coda::job::{
    adapters::{
        memory::{
            InMemoryVersionControl, InMemoryWorkspace, RecordingNotifier, ScriptedGenerator,
            StaticPipelineFactory,
        },
        sqlite::SqliteJobRepository,
    },
    domain::{BranchName, CodePatch, GenerationResult, JobStatus, PatchOperation},
    ports::{JobRepository, Pipeline, ProviderError},
    services::{CreateJobRequest, ExecutionOutcome, JobService},
};
use eyre::{Result, ensure};
use mockable::DefaultClock;
use rstest::rstest;

type SqliteService = JobService<SqliteJobRepository, StaticPipelineFactory, DefaultClock>;

fn service_over(
    database: &Database,
    generator: ScriptedGenerator,
    config: RunnerConfig,
) -> SqliteService {
    let factory = StaticPipelineFactory::new(Pipeline {
        generator: Arc::new(generator),
        vcs: Arc::new(InMemoryVersionControl::new(
            BranchName::new("main").expect("valid branch"),
        )),
        workspace: Arc::new(InMemoryWorkspace::new()),
        notifier: Arc::new(RecordingNotifier::new()),
    });
    JobService::new(
        Arc::new(database.repository.clone()),
        Arc::new(factory),
        ConfigHandle::new(config),
        Arc::new(DefaultClock),
    )
}

fn changelog_result() -> GenerationResult {
    GenerationResult {
        patches: vec![CodePatch::new(
            "CHANGELOG.md",
            "## Unreleased\n\n- Document the retry flag\n",
            PatchOperation::Create,
        )],
        explanation: "Starts a changelog".to_owned(),
        test_commands: vec!["make check".to_owned()],
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completed_run_is_persisted(database: Database) -> Result<()> {
    let service = service_over(
        &database,
        ScriptedGenerator::always(Ok(changelog_result())),
        RunnerConfig {
            auto_retry: false,
            ..RunnerConfig::default()
        },
    );

    let (job, handle) = service
        .submit(CreateJobRequest::new("document the retry flag", "/srv/demo"))
        .await?;
    let outcome = handle.await?;
    ensure!(matches!(outcome, ExecutionOutcome::Completed(_)), "run completes");

    let stored = service.get_job(job.id()).await?;
    ensure!(stored.status() == JobStatus::PrOpened, "final status stored");
    ensure!(
        stored.pr_url() == Some("https://git.example.test/pulls/1"),
        "review URL stored"
    );
    ensure!(
        stored.logs().iter().any(|entry| entry.ends_with("Review request opened: https://git.example.test/pulls/1")),
        "review request logged"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn automatic_retry_is_persisted(database: Database) -> Result<()> {
    let service = service_over(
        &database,
        ScriptedGenerator::new([
            Err(ProviderError::Failed("rate limited".to_owned())),
            Ok(changelog_result()),
        ]),
        RunnerConfig {
            retry_delay: Duration::ZERO,
            ..RunnerConfig::default()
        },
    );

    let (job, handle) = service
        .submit(CreateJobRequest::new("document the retry flag", "/srv/demo"))
        .await?;
    handle.await?;

    let stored = service.get_job(job.id()).await?;
    ensure!(stored.status() == JobStatus::PrOpened, "second attempt completes");
    ensure!(stored.retry_count() == 1, "retry counted");
    ensure!(stored.error().is_none(), "error cleared by the retry");
    ensure!(
        stored.logs().iter().any(|entry| entry.contains("rate limited")),
        "first failure kept in the log"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_job_is_never_run(database: Database) -> Result<()> {
    let generator = ScriptedGenerator::always(Ok(changelog_result()));
    let service = service_over(&database, generator.clone(), RunnerConfig::default());
    let job = job_for("document the retry flag", "/srv/demo");
    database.repository.create(&job).await?;

    let cancelled = service.cancel_job(job.id()).await?;
    let outcome = service.executor().execute(job.id()).await;

    ensure!(cancelled.status() == JobStatus::Cancelled, "job cancelled");
    ensure!(outcome == ExecutionOutcome::Cancelled(job.id()), "run abandoned");
    ensure!(generator.requests().is_empty(), "nothing generated");
    let listed = service.list_jobs_by_status(JobStatus::Cancelled).await?;
    ensure!(
        listed.iter().map(|stored| stored.id()).collect::<Vec<_>>() == vec![job.id()],
        "listing reflects the stored status"
    );
    Ok(())
}
