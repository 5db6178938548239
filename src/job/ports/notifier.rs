//! Status notification port.

use crate::job::domain::{Job, JobStatus, RepositoryPath, StatusMetadata, TaskDescription};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Status change announced to external channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Job task.
    pub task: TaskDescription,
    /// Job repository.
    pub repo: RepositoryPath,
    /// Status reached.
    pub status: JobStatus,
    /// Review-request URL, when one was opened.
    pub pr_url: Option<String>,
}

impl StatusUpdate {
    /// Builds an update from a job's current state.
    #[must_use]
    pub fn for_job(job: &Job) -> Self {
        Self {
            task: job.task().clone(),
            repo: job.repo().clone(),
            status: job.status(),
            pr_url: job.pr_url().map(str::to_owned),
        }
    }

    /// Returns the canonical presentation of the status.
    #[must_use]
    pub const fn metadata(&self) -> StatusMetadata {
        self.status.metadata()
    }
}

/// Best-effort status announcements.
///
/// Callers log and swallow failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobNotifier: Send + Sync {
    /// Announces a status change.
    async fn notify_status(&self, update: &StatusUpdate) -> Result<(), NotifyError>;
}

/// Errors returned by notifiers.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// The channel rejected the message.
    #[error("notification rejected with status {0}")]
    Rejected(u16),

    /// Transport failure.
    #[error("notification transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl NotifyError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
