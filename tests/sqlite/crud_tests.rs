//! Create, read, update and delete behaviour of the `SQLite` repository.

use super::helpers::{Database, database, job_for};
use coda::job::{
    adapters::sqlite::SqliteJobRepository,
    domain::{JobId, JobStatus, RepositoryPath},
    ports::{ExpectedState, JobRepository, JobRepositoryError},
};
use eyre::{Result, ensure};
use mockable::DefaultClock;
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stored_job_reads_back_with_every_field(database: Database) -> Result<()> {
    let job = job_for("add README badge", "/srv/demo");

    database.repository.create(&job).await?;
    let found = database
        .repository
        .find_by_id(job.id())
        .await?
        .ok_or_else(|| eyre::eyre!("job missing"))?;

    ensure!(found.id() == job.id(), "id round trips");
    ensure!(found.task() == job.task(), "task round trips");
    ensure!(found.repo() == job.repo(), "repo round trips");
    ensure!(found.branch() == job.branch(), "branch round trips");
    ensure!(found.base_branch() == job.base_branch(), "base branch round trips");
    ensure!(found.status() == JobStatus::Queued, "status round trips");
    ensure!(found.dry_run() && !found.skip_tests(), "flags round trip");
    ensure!(found.skills() == job.skills(), "skills round trip");
    ensure!(found.retry_count() == 0, "retry count round trips");
    ensure!(
        found.created_at().timestamp_micros() == job.created_at().timestamp_micros(),
        "creation time kept to the microsecond"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_job_is_absent(database: Database) -> Result<()> {
    ensure!(
        database.repository.find_by_id(JobId::new()).await?.is_none(),
        "nothing stored"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_identifiers_are_rejected(database: Database) -> Result<()> {
    let job = job_for("add README badge", "/srv/demo");
    database.repository.create(&job).await?;

    let result = database.repository.create(&job).await;

    ensure!(
        matches!(result, Err(JobRepositoryError::DuplicateJob(id)) if id == job.id()),
        "duplicate create rejected: {result:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listings_are_newest_first_and_filtered(database: Database) -> Result<()> {
    let first = job_for("first task", "/srv/demo");
    let second = job_for("second task", "/srv/other");
    let mut third = job_for("third task", "/srv/demo");
    ensure!(third.cancel(&DefaultClock), "queued job cancels");
    for job in [&first, &second, &third] {
        database.repository.create(job).await?;
    }

    let all: Vec<JobId> = database
        .repository
        .list()
        .await?
        .iter()
        .map(|job| job.id())
        .collect();
    ensure!(
        all == vec![third.id(), second.id(), first.id()],
        "newest first: {all:?}"
    );

    let queued: Vec<JobId> = database
        .repository
        .list_by_status(JobStatus::Queued)
        .await?
        .iter()
        .map(|job| job.id())
        .collect();
    ensure!(queued == vec![second.id(), first.id()], "status filter");

    let demo: Vec<JobId> = database
        .repository
        .list_by_repo(&RepositoryPath::new("/srv/demo")?)
        .await?
        .iter()
        .map(|job| job.id())
        .collect();
    ensure!(demo == vec![third.id(), first.id()], "repository filter");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn update_replaces_status_and_outcome(database: Database) -> Result<()> {
    let mut job = job_for("add README badge", "/srv/demo");
    database.repository.create(&job).await?;

    job.transition_to(JobStatus::Coding, &DefaultClock)?;
    job.transition_to(JobStatus::Patching, &DefaultClock)?;
    job.complete(Some("https://git.example.test/pulls/7".to_owned()), &DefaultClock)?;
    database.repository.update(&job).await?;

    let stored = database
        .repository
        .find_by_id(job.id())
        .await?
        .ok_or_else(|| eyre::eyre!("job missing"))?;
    ensure!(stored.status() == JobStatus::PrOpened, "status written");
    ensure!(
        stored.pr_url() == Some("https://git.example.test/pulls/7"),
        "review URL written"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn updating_a_missing_job_is_not_found(database: Database) {
    let job = job_for("add README badge", "/srv/demo");

    let result = database.repository.update(&job).await;

    assert!(matches!(result, Err(JobRepositoryError::NotFound(id)) if id == job.id()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn guarded_update_rejects_a_changed_record(database: Database) -> Result<()> {
    let job = job_for("add README badge", "/srv/demo");
    database.repository.create(&job).await?;
    let expected = ExpectedState::of(&job);

    let mut cancelled = job.clone();
    ensure!(cancelled.cancel(&DefaultClock), "queued job cancels");
    database.repository.update_guarded(&cancelled, expected).await?;

    let mut coding = job.clone();
    coding.transition_to(JobStatus::Coding, &DefaultClock)?;
    let result = database.repository.update_guarded(&coding, expected).await;

    ensure!(
        matches!(
            result,
            Err(JobRepositoryError::StatusConflict {
                expected: JobStatus::Queued,
                actual: JobStatus::Cancelled,
                ..
            })
        ),
        "stale writer rejected: {result:?}"
    );
    let stored = database
        .repository
        .find_by_id(job.id())
        .await?
        .ok_or_else(|| eyre::eyre!("job missing"))?;
    ensure!(stored.status() == JobStatus::Cancelled, "cancellation kept");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn guarded_update_notices_a_retry(database: Database) -> Result<()> {
    let mut job = job_for("add README badge", "/srv/demo");
    job.transition_to(JobStatus::Coding, &DefaultClock)?;
    database.repository.create(&job).await?;
    let expected = ExpectedState::of(&job);

    let mut requeued = job.clone();
    requeued.requeue_manually(&DefaultClock);
    database.repository.update(&requeued).await?;
    let mut restarted = requeued.clone();
    restarted.transition_to(JobStatus::Coding, &DefaultClock)?;
    database.repository.update(&restarted).await?;

    let mut stale = job.clone();
    stale.transition_to(JobStatus::Patching, &DefaultClock)?;
    let result = database.repository.update_guarded(&stale, expected).await;

    ensure!(
        matches!(result, Err(JobRepositoryError::StatusConflict { .. })),
        "same status with a newer attempt is still a conflict"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn delete_reports_whether_a_row_was_removed(database: Database) -> Result<()> {
    let job = job_for("add README badge", "/srv/demo");
    database.repository.create(&job).await?;

    ensure!(database.repository.delete(job.id()).await?, "first delete removes");
    ensure!(!database.repository.delete(job.id()).await?, "second delete is a no-op");
    ensure!(
        database.repository.find_by_id(job.id()).await?.is_none(),
        "job gone"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reopening_keeps_jobs_and_schema(database: Database) -> Result<()> {
    let job = job_for("add README badge", "/srv/demo");
    database.repository.create(&job).await?;

    let reopened = SqliteJobRepository::open(&database.path)?;
    reopened.migrate()?;

    ensure!(
        reopened.find_by_id(job.id()).await?.is_some(),
        "job survives reopening"
    );
    Ok(())
}
