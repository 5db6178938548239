//! Per-run collaborator assembly.

use super::{CodeGenerator, JobNotifier, VersionControl, Workspace};
use crate::config::RunnerConfig;
use crate::job::domain::Job;
use std::sync::Arc;

/// Collaborators driving one execution attempt.
#[derive(Clone)]
pub struct Pipeline {
    /// Content generator.
    pub generator: Arc<dyn CodeGenerator>,
    /// Version-control driver bound to the job repository.
    pub vcs: Arc<dyn VersionControl>,
    /// Patch applier and test runner bound to the job repository.
    pub workspace: Arc<dyn Workspace>,
    /// Status notifier.
    pub notifier: Arc<dyn JobNotifier>,
}

/// Builds the collaborators for an attempt from a configuration snapshot.
///
/// Construction happens once per attempt, so a configuration reload takes
/// effect on the next attempt without touching runs in flight.
pub trait PipelineFactory: Send + Sync {
    /// Assembles the collaborators for `job`.
    fn assemble(&self, job: &Job, config: &RunnerConfig) -> Pipeline;
}
