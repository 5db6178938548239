//! Error types for job domain validation and parsing.

use super::{JobId, JobStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating domain job values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobDomainError {
    /// The task description is empty after trimming.
    #[error("task must not be empty")]
    EmptyTask,

    /// The repository path is empty after trimming.
    #[error("repository must not be empty")]
    EmptyRepository,

    /// The branch name is not a usable Git ref name.
    #[error("invalid branch name '{0}'")]
    InvalidBranchName(String),

    /// The job identifier is not a UUID.
    #[error("invalid job identifier '{0}'")]
    InvalidJobId(String),

    /// The skill name is empty after trimming.
    #[error("skill name must not be empty")]
    EmptySkillName,

    /// The patch path is absolute, empty, or escapes the repository root.
    #[error("invalid patch path '{0}', expected a relative path inside the repository")]
    InvalidPatchPath(String),

    /// The requested status change is not an edge of the job state machine.
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Job whose transition was rejected.
        job_id: JobId,
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },
}

/// Error returned while parsing job statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

/// Error returned while parsing a generation provider name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown generation provider: {0}")]
pub struct ParseProviderKindError(pub String);
