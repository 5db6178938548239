//! Version-control port.

use crate::job::domain::BranchName;
use async_trait::async_trait;
use thiserror::Error;

/// Review (pull/merge) request to open for a pushed branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    /// Branch carrying the change.
    pub branch: BranchName,
    /// Branch the change should merge into, when known.
    pub base: Option<BranchName>,
    /// Request title.
    pub title: String,
    /// Request body.
    pub body: String,
}

/// Drives the repository working tree and its hosting service.
///
/// Implementations are bound to a single repository.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Returns the branch currently checked out.
    async fn current_branch(&self) -> Result<BranchName, GitError>;

    /// Resolves the repository's default branch.
    async fn default_branch(&self) -> Result<BranchName, GitError>;

    /// Creates `name` from `base` and checks it out.
    ///
    /// Stale local and remote branches with the same name are removed first,
    /// so the call is idempotent across attempts.
    async fn create_branch(&self, name: &BranchName, base: &BranchName) -> Result<(), GitError>;

    /// Stages every change in the working tree and commits it.
    async fn commit(&self, message: &str) -> Result<(), GitError>;

    /// Pushes the branch upstream.
    async fn push(&self, name: &BranchName) -> Result<(), GitError>;

    /// Opens a review request and returns its URL.
    async fn open_review_request(&self, request: &ReviewRequest) -> Result<String, GitError>;

    /// Checks out an existing branch.
    async fn checkout(&self, name: &BranchName) -> Result<(), GitError>;
}

/// Version-control failure carrying a human-readable cause.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitError {
    /// A command exited unsuccessfully.
    #[error("git {operation} failed: {message}")]
    CommandFailed {
        /// Operation that failed, for example `push`.
        operation: String,
        /// Captured error output.
        message: String,
    },

    /// The command could not be started.
    #[error("failed to run {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying cause.
        message: String,
    },

    /// Command output could not be interpreted.
    #[error("unexpected git output: {0}")]
    UnexpectedOutput(String),
}

impl GitError {
    /// Builds a [`GitError::CommandFailed`].
    pub fn command_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
