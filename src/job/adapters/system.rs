//! Production collaborator assembly.

use camino::Utf8PathBuf;
use std::sync::Arc;

use super::{
    filesystem::FsWorkspace, git::GitCli, process_generator::ProcessGenerator,
    webhook::WebhookNotifier,
};
use crate::config::RunnerConfig;
use crate::job::{
    domain::Job,
    ports::{NotifyError, Pipeline, PipelineFactory},
};

/// Binds the command-line, filesystem and webhook adapters to a job's
/// repository.
#[derive(Debug, Clone)]
pub struct SystemPipelineFactory {
    http: reqwest::Client,
}

impl SystemPipelineFactory {
    /// Creates the factory and its shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn new() -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(NotifyError::transport)?;
        Ok(Self { http })
    }
}

impl PipelineFactory for SystemPipelineFactory {
    fn assemble(&self, job: &Job, config: &RunnerConfig) -> Pipeline {
        let repo = Utf8PathBuf::from(job.repo().as_str());
        Pipeline {
            generator: Arc::new(ProcessGenerator::new(
                config.generator_command.clone(),
                config.generator_timeout,
            )),
            vcs: Arc::new(
                GitCli::new(repo.clone(), config.git_remote.clone())
                    .with_token(config.github_token.clone())
                    .with_timeout(config.git_timeout),
            ),
            workspace: Arc::new(FsWorkspace::new(repo)),
            notifier: Arc::new(WebhookNotifier::with_client(
                self.http.clone(),
                config.slack_webhook_url.clone(),
            )),
        }
    }
}
