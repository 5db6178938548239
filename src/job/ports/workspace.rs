//! Patch application and test execution port.

use crate::job::domain::{CodePatch, GuardrailError, Guardrails, JobDomainError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Outcome of running test commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    /// Whether every command exited successfully.
    pub success: bool,
    /// Transcript of every command run and its output.
    pub output: String,
}

/// Applies patches to a repository working tree and runs test commands in
/// it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Checks patches against the guardrails without touching the tree.
    ///
    /// # Errors
    ///
    /// Returns [`GuardrailError`] naming the exceeded limit.
    fn validate(&self, patches: &[CodePatch], guardrails: &Guardrails) -> Result<(), GuardrailError> {
        guardrails.check(patches)
    }

    /// Writes, overwrites or deletes files, creating parent directories as
    /// needed. Deleting a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PatchApplyError`] on unsafe paths or I/O failures.
    async fn apply(&self, patches: &[CodePatch]) -> Result<(), PatchApplyError>;

    /// Runs commands in order, stopping at the first failure.
    ///
    /// A command that exceeds `timeout` or cannot be started counts as a
    /// failed command.
    async fn run_tests(&self, commands: &[String], timeout: Duration) -> TestReport;
}

/// Errors returned while applying patches.
#[derive(Debug, Clone, Error)]
pub enum PatchApplyError {
    /// The patch path is absolute or escapes the repository.
    #[error(transparent)]
    UnsafePath(#[from] JobDomainError),

    /// The repository directory could not be opened.
    #[error("failed to open repository '{path}': {source}")]
    OpenRepository {
        /// Repository path.
        path: String,
        /// Underlying I/O error.
        source: Arc<std::io::Error>,
    },

    /// A file operation failed.
    #[error("failed to {operation} '{path}': {source}")]
    Io {
        /// Operation attempted.
        operation: &'static str,
        /// Repository-relative path.
        path: String,
        /// Underlying I/O error.
        source: Arc<std::io::Error>,
    },
}

impl PatchApplyError {
    /// Builds a [`PatchApplyError::Io`].
    pub fn io(operation: &'static str, path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
