//! Repository port for durable job storage.

use crate::job::domain::{Job, JobId, JobStatus, RepositoryPath};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for job repository operations.
pub type JobRepositoryResult<T> = Result<T, JobRepositoryError>;

/// Job persistence contract.
///
/// Every operation is atomic from the caller's point of view. Writes for
/// different job identifiers never interfere with each other.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Stores a new job.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::DuplicateJob`] when the identifier is
    /// already stored.
    async fn create(&self, job: &Job) -> JobRepositoryResult<Job>;

    /// Finds a job by identifier.
    ///
    /// Returns `None` when the job does not exist.
    async fn find_by_id(&self, id: JobId) -> JobRepositoryResult<Option<Job>>;

    /// Returns every job, newest created first.
    async fn list(&self) -> JobRepositoryResult<Vec<Job>>;

    /// Returns jobs in the given status, newest created first.
    async fn list_by_status(&self, status: JobStatus) -> JobRepositoryResult<Vec<Job>>;

    /// Returns jobs targeting the given repository, newest created first.
    async fn list_by_repo(&self, repo: &RepositoryPath) -> JobRepositoryResult<Vec<Job>>;

    /// Replaces the stored record and returns what was written.
    ///
    /// The stored log is never truncated: entries present in storage but
    /// missing from `job` are kept (see
    /// [`reconcile_logs`](crate::job::domain::reconcile_logs)).
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] when the job does not exist.
    async fn update(&self, job: &Job) -> JobRepositoryResult<Job>;

    /// Replaces the stored record only if it still matches `expected`.
    ///
    /// The retry count identifies the run that read the record, so a run
    /// superseded by a retry cannot overwrite its successor.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::StatusConflict`] when the stored record
    /// changed, or [`JobRepositoryError::NotFound`] when it does not exist.
    async fn update_guarded(&self, job: &Job, expected: ExpectedState) -> JobRepositoryResult<Job>;

    /// Appends a timestamped log entry, bumps `updated_at`, and returns the
    /// updated job.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] when the job does not exist.
    async fn append_log(
        &self,
        id: JobId,
        message: &str,
        at: DateTime<Utc>,
    ) -> JobRepositoryResult<Job>;

    /// Deletes a job. Returns whether a record was removed.
    async fn delete(&self, id: JobId) -> JobRepositoryResult<bool>;
}

/// Stored state a guarded update expects to replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedState {
    /// Status the caller read.
    pub status: JobStatus,
    /// Retry count the caller read.
    pub retry_count: u32,
}

impl ExpectedState {
    /// Captures the guard for a job as it was read.
    #[must_use]
    pub const fn of(job: &Job) -> Self {
        Self {
            status: job.status(),
            retry_count: job.retry_count(),
        }
    }

    /// Returns whether `stored` still matches the captured state.
    #[must_use]
    pub fn matches(&self, stored: &Job) -> bool {
        stored.status() == self.status && stored.retry_count() == self.retry_count
    }
}

/// Errors returned by job repository implementations.
#[derive(Debug, Clone, Error)]
pub enum JobRepositoryError {
    /// A job with the same identifier already exists.
    #[error("duplicate job identifier: {0}")]
    DuplicateJob(JobId),

    /// The job was not found.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// A guarded update found a different stored state.
    #[error("job {id} changed concurrently: expected {expected}, found {actual}")]
    StatusConflict {
        /// Job whose update was rejected.
        id: JobId,
        /// Status the caller expected.
        expected: JobStatus,
        /// Status currently stored.
        actual: JobStatus,
    },

    /// A stored row could not be converted into a domain value.
    #[error("invalid persisted job data: {0}")]
    InvalidPersistedData(String),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl JobRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
