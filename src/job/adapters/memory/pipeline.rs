//! Pipeline factory handing out a fixed collaborator set.

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::RunnerConfig;
use crate::job::{
    domain::{Job, JobId},
    ports::{Pipeline, PipelineFactory},
};

/// Factory returning the same collaborators for every attempt.
///
/// Records which job and configuration each attempt was assembled with.
#[derive(Clone)]
pub struct StaticPipelineFactory {
    pipeline: Pipeline,
    assembled: Arc<Mutex<Vec<(JobId, RunnerConfig)>>>,
}

impl StaticPipelineFactory {
    /// Wraps a collaborator set.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            assembled: Arc::default(),
        }
    }

    /// Returns the job and configuration of every assembled attempt.
    #[must_use]
    pub fn assembled(&self) -> Vec<(JobId, RunnerConfig)> {
        self.assembled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PipelineFactory for StaticPipelineFactory {
    fn assemble(&self, job: &Job, config: &RunnerConfig) -> Pipeline {
        self.assembled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((job.id(), config.clone()));
        self.pipeline.clone()
    }
}
