//! In-memory job repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::job::{
    domain::{Job, JobId, JobStatus, RepositoryPath},
    ports::{ExpectedState, JobRepository, JobRepositoryError, JobRepositoryResult},
};

/// Thread-safe in-memory job repository.
///
/// Besides the records themselves it keeps the sequence of statuses each job
/// was written with, which tests use to check state-machine paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    state: Arc<RwLock<InMemoryJobState>>,
}

#[derive(Debug, Default)]
struct InMemoryJobState {
    jobs: HashMap<JobId, StoredJob>,
    next_sequence: u64,
}

#[derive(Debug)]
struct StoredJob {
    job: Job,
    sequence: u64,
    status_history: Vec<JobStatus>,
}

impl InMemoryJobRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every status the job has been stored with, in write order.
    ///
    /// Consecutive writes with the same status are recorded once.
    #[must_use]
    pub fn status_history(&self, id: JobId) -> Vec<JobStatus> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .jobs
            .get(&id)
            .map(|stored| stored.status_history.clone())
            .unwrap_or_default()
    }

    fn read(&self) -> JobRepositoryResult<RwLockReadGuard<'_, InMemoryJobState>> {
        self.state.read().map_err(|err| {
            JobRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> JobRepositoryResult<RwLockWriteGuard<'_, InMemoryJobState>> {
        self.state.write().map_err(|err| {
            JobRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn collect_newest_first(&self, keep: impl Fn(&Job) -> bool) -> JobRepositoryResult<Vec<Job>> {
        let state = self.read()?;
        let mut matching: Vec<&StoredJob> = state
            .jobs
            .values()
            .filter(|stored| keep(&stored.job))
            .collect();
        matching.sort_by(|left, right| {
            right
                .job
                .created_at()
                .cmp(&left.job.created_at())
                .then(right.sequence.cmp(&left.sequence))
        });
        Ok(matching.into_iter().map(|stored| stored.job.clone()).collect())
    }
}

/// Writes `job` over `stored`, keeping every stored log entry.
fn replace_stored(stored: &mut StoredJob, job: &Job) -> Job {
    let mut merged = job.clone();
    merged.reconcile_logs_with(stored.job.logs());
    if stored.status_history.last() != Some(&merged.status()) {
        stored.status_history.push(merged.status());
    }
    stored.job = merged.clone();
    merged
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &Job) -> JobRepositoryResult<Job> {
        let mut state = self.write()?;
        if state.jobs.contains_key(&job.id()) {
            return Err(JobRepositoryError::DuplicateJob(job.id()));
        }

        let sequence = state.next_sequence;
        state.next_sequence = sequence.saturating_add(1);
        state.jobs.insert(
            job.id(),
            StoredJob {
                job: job.clone(),
                sequence,
                status_history: vec![job.status()],
            },
        );
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: JobId) -> JobRepositoryResult<Option<Job>> {
        let state = self.read()?;
        Ok(state.jobs.get(&id).map(|stored| stored.job.clone()))
    }

    async fn list(&self) -> JobRepositoryResult<Vec<Job>> {
        self.collect_newest_first(|_| true)
    }

    async fn list_by_status(&self, status: JobStatus) -> JobRepositoryResult<Vec<Job>> {
        self.collect_newest_first(|job| job.status() == status)
    }

    async fn list_by_repo(&self, repo: &RepositoryPath) -> JobRepositoryResult<Vec<Job>> {
        self.collect_newest_first(|job| job.repo() == repo)
    }

    async fn update(&self, job: &Job) -> JobRepositoryResult<Job> {
        let mut state = self.write()?;
        let stored = state
            .jobs
            .get_mut(&job.id())
            .ok_or(JobRepositoryError::NotFound(job.id()))?;
        Ok(replace_stored(stored, job))
    }

    async fn update_guarded(&self, job: &Job, expected: ExpectedState) -> JobRepositoryResult<Job> {
        let mut state = self.write()?;
        let stored = state
            .jobs
            .get_mut(&job.id())
            .ok_or(JobRepositoryError::NotFound(job.id()))?;

        if !expected.matches(&stored.job) {
            return Err(JobRepositoryError::StatusConflict {
                id: job.id(),
                expected: expected.status,
                actual: stored.job.status(),
            });
        }
        Ok(replace_stored(stored, job))
    }

    async fn append_log(
        &self,
        id: JobId,
        message: &str,
        at: DateTime<Utc>,
    ) -> JobRepositoryResult<Job> {
        let mut state = self.write()?;
        let stored = state
            .jobs
            .get_mut(&id)
            .ok_or(JobRepositoryError::NotFound(id))?;
        stored.job.append_log(message, at);
        Ok(stored.job.clone())
    }

    async fn delete(&self, id: JobId) -> JobRepositoryResult<bool> {
        let mut state = self.write()?;
        Ok(state.jobs.remove(&id).is_some())
    }
}
