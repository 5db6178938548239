//! Log append and reconciliation behaviour of the `SQLite` repository.

use std::sync::Arc;

use super::helpers::{Database, database, job_for};
use chrono::{Duration, Utc};
use coda::job::{
    domain::{JobId, JobStatus},
    ports::{JobRepository, JobRepositoryError},
};
use eyre::{Result, ensure};
use mockable::DefaultClock;
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn appended_entries_are_timestamped_in_order(database: Database) -> Result<()> {
    let job = job_for("add README badge", "/srv/demo");
    database.repository.create(&job).await?;
    let at = Utc::now();

    database.repository.append_log(job.id(), "Generating code", at).await?;
    let updated = database
        .repository
        .append_log(job.id(), "Applying 1 patches", at + Duration::seconds(1))
        .await?;

    ensure!(updated.logs().len() == 2, "two entries");
    ensure!(updated.logs()[0].ends_with("] Generating code"), "first entry");
    ensure!(updated.logs()[1].ends_with("] Applying 1 patches"), "second entry");
    ensure!(
        updated.updated_at().timestamp_micros() >= (at + Duration::seconds(1)).timestamp_micros(),
        "updated_at follows the latest entry"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn appending_to_a_missing_job_is_not_found(database: Database) {
    let result = database
        .repository
        .append_log(JobId::new(), "orphan", Utc::now())
        .await;

    assert!(matches!(result, Err(JobRepositoryError::NotFound(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_update_keeps_entries_appended_meanwhile(database: Database) -> Result<()> {
    let job = job_for("add README badge", "/srv/demo");
    database.repository.create(&job).await?;
    let snapshot = database
        .repository
        .append_log(job.id(), "Starting job", Utc::now())
        .await?;

    database
        .repository
        .append_log(job.id(), "Job cancelled", Utc::now())
        .await?;
    let mut stale = snapshot.clone();
    stale.transition_to(JobStatus::Coding, &DefaultClock)?;
    stale.append_log("Generating code", Utc::now());
    let written = database.repository.update(&stale).await?;

    let messages: Vec<&str> = written
        .logs()
        .iter()
        .filter_map(|entry| entry.split_once("] ").map(|(_, message)| message))
        .collect();
    ensure!(
        messages == ["Starting job", "Job cancelled", "Generating code"],
        "log never loses entries: {messages:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_appends_are_all_kept(database: Database) -> Result<()> {
    let job = job_for("add README badge", "/srv/demo");
    database.repository.create(&job).await?;
    let repository = Arc::new(database.repository.clone());

    let writers = (0..8).map(|index| {
        let shared = Arc::clone(&repository);
        let id = job.id();
        tokio::spawn(async move {
            shared
                .append_log(id, &format!("entry {index}"), Utc::now())
                .await
        })
    });
    for writer in writers.collect::<Vec<_>>() {
        writer.await??;
    }

    let stored = repository
        .find_by_id(job.id())
        .await?
        .ok_or_else(|| eyre::eyre!("job missing"))?;
    ensure!(stored.logs().len() == 8, "every append persisted");
    Ok(())
}
