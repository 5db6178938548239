//! Shared wiring for in-memory lifecycle tests.

use std::sync::Arc;
use std::time::Duration;

use coda::config::{ConfigHandle, RunnerConfig};
use coda::job::{
    adapters::memory::{
        InMemoryJobRepository, InMemoryVersionControl, InMemoryWorkspace, RecordingNotifier,
        ScriptedGenerator, StaticPipelineFactory,
    },
    domain::{BranchName, CodePatch, GenerationResult, PatchOperation},
    ports::{Pipeline, Workspace},
    services::JobService,
};
use mockable::DefaultClock;

/// Service type used throughout the in-memory suite.
pub type Service = JobService<InMemoryJobRepository, StaticPipelineFactory, DefaultClock>;

/// A wired service plus handles on every collaborator.
pub struct World {
    pub service: Service,
    pub repository: Arc<InMemoryJobRepository>,
    pub generator: ScriptedGenerator,
    pub vcs: InMemoryVersionControl,
    pub notifier: RecordingNotifier,
}

/// Builder for [`World`].
pub struct WorldBuilder {
    generator: ScriptedGenerator,
    vcs: InMemoryVersionControl,
    workspace: Arc<dyn Workspace>,
    config: RunnerConfig,
}

impl WorldBuilder {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self {
            generator,
            vcs: InMemoryVersionControl::new(main_branch()),
            workspace: Arc::new(InMemoryWorkspace::new()),
            config: test_config(),
        }
    }

    pub fn vcs(mut self, vcs: InMemoryVersionControl) -> Self {
        self.vcs = vcs;
        self
    }

    pub fn workspace(mut self, workspace: impl Workspace + 'static) -> Self {
        self.workspace = Arc::new(workspace);
        self
    }

    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> World {
        let notifier = RecordingNotifier::new();
        let repository = Arc::new(InMemoryJobRepository::new());
        let factory = StaticPipelineFactory::new(Pipeline {
            generator: Arc::new(self.generator.clone()),
            vcs: Arc::new(self.vcs.clone()),
            workspace: self.workspace,
            notifier: Arc::new(notifier.clone()),
        });
        let service = JobService::new(
            Arc::clone(&repository),
            Arc::new(factory),
            ConfigHandle::new(self.config),
            Arc::new(DefaultClock),
        );
        World {
            service,
            repository,
            generator: self.generator,
            vcs: self.vcs,
            notifier,
        }
    }
}

/// Configuration without automatic retries or delays.
pub fn test_config() -> RunnerConfig {
    RunnerConfig {
        auto_retry: false,
        retry_delay: Duration::ZERO,
        ..RunnerConfig::default()
    }
}

/// [`test_config`] with automatic retries enabled.
pub fn retrying_config() -> RunnerConfig {
    RunnerConfig {
        auto_retry: true,
        ..test_config()
    }
}

pub fn main_branch() -> BranchName {
    BranchName::new("main").expect("valid branch")
}

/// Generation result adding a badge to the README, verified by one command.
pub fn badge_result() -> GenerationResult {
    GenerationResult {
        patches: vec![CodePatch::new(
            "README.md",
            "# Demo\n\n![build](badge.svg)\n",
            PatchOperation::Modify,
        )],
        explanation: "Adds a build badge".to_owned(),
        test_commands: vec!["make test".to_owned()],
    }
}

/// Returns whether some log entry ends with `message`.
pub fn has_log(logs: &[String], message: &str) -> bool {
    logs.iter().any(|entry| entry.ends_with(message))
}
