//! Job executor: drives one job through the pipeline stages.
//!
//! Every status change goes through a guarded repository update, so a job
//! cancelled or retried while a stage is in flight is never overwritten by
//! the stale run. Cancellation is cooperative: the executor re-reads the job
//! after each collaborator call and abandons the run when it has been
//! cancelled.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::{conventions, retry::RetryPolicy};
use crate::config::{ConfigHandle, RunnerConfig};
use crate::job::{
    domain::{
        BranchName, GenerationRequest, GuardrailError, Job, JobDomainError, JobId, JobStatus,
        SkillContext,
    },
    ports::{
        ExpectedState, GitError, JobRepository, JobRepositoryError, PatchApplyError, Pipeline,
        PipelineFactory, ProviderError, ReviewRequest, StatusUpdate,
    },
};

/// A test stage that ended with a failing command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("tests failed")]
pub struct TestFailure {
    /// Transcript of the commands run.
    pub output: String,
}

/// Errors that end an attempt early.
#[derive(Debug, Error)]
pub enum StageError {
    /// Generation failed or returned unusable output.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Generated patches exceed the configured limits.
    #[error(transparent)]
    Guardrail(#[from] GuardrailError),
    /// A version-control operation failed.
    #[error(transparent)]
    Git(#[from] GitError),
    /// Patches could not be written.
    #[error(transparent)]
    Patch(#[from] PatchApplyError),
    /// A test command failed or timed out.
    #[error(transparent)]
    Tests(#[from] TestFailure),
    /// The review-request body could not be rendered.
    #[error("failed to render review request: {0}")]
    Render(#[from] minijinja::Error),
    /// Reading or writing the job failed.
    #[error(transparent)]
    Repository(#[from] JobRepositoryError),
    /// The job refused a status change.
    #[error(transparent)]
    Domain(#[from] JobDomainError),
    /// The job was cancelled while the attempt was running.
    #[error("job cancelled")]
    Cancelled,
    /// A newer attempt took over the job.
    #[error("job superseded by a newer attempt")]
    Superseded,
}

/// How a spawned execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The job reached `pr_opened`.
    Completed(Job),
    /// The job ended `failed` with no automatic retry left.
    Failed(Job),
    /// The job was cancelled before or during the run.
    Cancelled(JobId),
    /// Nothing ran: the job was missing, not queued, or taken over by a
    /// newer attempt.
    Skipped(JobId),
}

impl ExecutionOutcome {
    /// Returns the identifier of the job the outcome refers to.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::Completed(job) | Self::Failed(job) => job.id(),
            Self::Cancelled(id) | Self::Skipped(id) => *id,
        }
    }

    /// Returns the final job record when the run finished it.
    #[must_use]
    pub const fn job(&self) -> Option<&Job> {
        match self {
            Self::Completed(job) | Self::Failed(job) => Some(job),
            Self::Cancelled(_) | Self::Skipped(_) => None,
        }
    }
}

enum Attempt {
    Finished(ExecutionOutcome),
    RetryAfter(Duration),
}

/// Runs queued jobs through generation, patching, testing and review.
pub struct JobExecutor<R, F, C>
where
    R: JobRepository + 'static,
    F: PipelineFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    repository: Arc<R>,
    factory: Arc<F>,
    config: ConfigHandle,
    clock: Arc<C>,
}

impl<R, F, C> Clone for JobExecutor<R, F, C>
where
    R: JobRepository + 'static,
    F: PipelineFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            factory: Arc::clone(&self.factory),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R, F, C> JobExecutor<R, F, C>
where
    R: JobRepository + 'static,
    F: PipelineFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an executor.
    #[must_use]
    pub const fn new(
        repository: Arc<R>,
        factory: Arc<F>,
        config: ConfigHandle,
        clock: Arc<C>,
    ) -> Self {
        Self {
            repository,
            factory,
            config,
            clock,
        }
    }

    /// Runs the job on its own task.
    pub fn spawn(&self, id: JobId) -> JoinHandle<ExecutionOutcome> {
        let executor = self.clone();
        tokio::spawn(async move { executor.execute(id).await })
    }

    /// Runs the job until it completes, fails without retry, or is
    /// cancelled.
    ///
    /// Each attempt reads a fresh configuration snapshot. Automatic retries
    /// run on the same task after the configured delay.
    pub async fn execute(&self, id: JobId) -> ExecutionOutcome {
        loop {
            let config = self.config.snapshot();
            match self.attempt(id, &config).await {
                Attempt::Finished(outcome) => return outcome,
                Attempt::RetryAfter(delay) => {
                    tracing::info!(job_id = %id, delay_ms = delay.as_millis(), "retrying job");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, id: JobId, config: &RunnerConfig) -> Attempt {
        let mut job = match self.repository.find_by_id(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %id, "job not found, nothing to run");
                return Attempt::Finished(ExecutionOutcome::Skipped(id));
            }
            Err(error) => {
                tracing::error!(job_id = %id, %error, "failed to load job");
                return Attempt::Finished(ExecutionOutcome::Skipped(id));
            }
        };
        match job.status() {
            JobStatus::Queued => {}
            JobStatus::Cancelled => return Attempt::Finished(ExecutionOutcome::Cancelled(id)),
            status => {
                tracing::debug!(job_id = %id, %status, "job is not queued, skipping");
                return Attempt::Finished(ExecutionOutcome::Skipped(id));
            }
        }

        let pipeline = self.factory.assemble(&job, config);
        let original_branch = match pipeline.vcs.current_branch().await {
            Ok(branch) => Some(branch),
            Err(error) => {
                tracing::warn!(job_id = %id, %error, "cannot read current branch, it will not be restored");
                None
            }
        };

        let result = self.run_stages(&mut job, &pipeline, config).await;
        let attempt = match result {
            Ok(()) => Attempt::Finished(ExecutionOutcome::Completed(self.refreshed(job).await)),
            Err(StageError::Cancelled) => {
                tracing::info!(job_id = %id, "job cancelled, abandoning run");
                Attempt::Finished(ExecutionOutcome::Cancelled(id))
            }
            Err(StageError::Superseded) => {
                tracing::info!(job_id = %id, "job taken over by a newer attempt");
                Attempt::Finished(ExecutionOutcome::Skipped(id))
            }
            Err(error) => self.handle_failure(&pipeline, job, &error, config).await,
        };

        if let Some(branch) = original_branch {
            restore_branch(&pipeline, id, &branch).await;
        }
        attempt
    }

    async fn run_stages(
        &self,
        job: &mut Job,
        pipeline: &Pipeline,
        config: &RunnerConfig,
    ) -> Result<(), StageError> {
        let id = job.id();

        self.advance(job, JobStatus::Coding).await?;
        self.log(id, "Starting code generation...").await?;
        notify(pipeline, job).await;

        let request = GenerationRequest {
            task: job.task().clone(),
            repo: job.repo().clone(),
            provider: config.preferred_provider,
            skills: job.skills().to_vec(),
        };
        let generated = pipeline.generator.generate(&request).await?;
        self.checkpoint(job).await?;
        self.log(id, &format!("Generated {} patches", generated.patches.len()))
            .await?;
        if !job.skills().is_empty() {
            let names: Vec<&str> = job.skills().iter().map(SkillContext::name).collect();
            self.log(
                id,
                &format!("Applied {} skills: {}", names.len(), names.join(", ")),
            )
            .await?;
        }
        self.log(id, &format!("Explanation: {}", generated.explanation))
            .await?;

        pipeline
            .workspace
            .validate(&generated.patches, &config.guardrails())?;
        self.log(id, "Patches validated").await?;

        let base = match job.base_branch() {
            Some(base) => base.clone(),
            None => pipeline.vcs.default_branch().await?,
        };
        pipeline.vcs.create_branch(job.branch(), &base).await?;
        self.checkpoint(job).await?;
        let origin = if job.base_branch().is_some() {
            ""
        } else {
            " (default branch)"
        };
        self.log(
            id,
            &format!("Created branch {} from {base}{origin}", job.branch()),
        )
        .await?;

        self.advance(job, JobStatus::Patching).await?;
        self.log(id, "Applying patches...").await?;
        pipeline.workspace.apply(&generated.patches).await?;
        self.checkpoint(job).await?;
        self.log(id, "Patches applied").await?;

        let message = conventions::commit_message(job.task());
        pipeline.vcs.commit(&message).await?;
        self.checkpoint(job).await?;
        self.log(id, &format!("Changes committed: {message}")).await?;

        if job.skip_tests() {
            self.log(id, "Tests skipped").await?;
        } else if !generated.test_commands.is_empty() {
            self.advance(job, JobStatus::Testing).await?;
            self.log(id, "Running tests...").await?;
            notify(pipeline, job).await;

            let report = pipeline
                .workspace
                .run_tests(&generated.test_commands, config.test_timeout)
                .await;
            self.checkpoint(job).await?;
            self.log(id, &report.output).await?;
            if !report.success {
                return Err(TestFailure {
                    output: report.output,
                }
                .into());
            }
            self.log(id, "Tests passed").await?;
        }

        if job.dry_run() {
            self.finish(job, None).await?;
            self.log(id, "Dry run complete, no review request opened")
                .await?;
            notify(pipeline, job).await;
            return Ok(());
        }

        self.log(id, "Pushing to remote...").await?;
        pipeline.vcs.push(job.branch()).await?;
        self.checkpoint(job).await?;
        self.log(id, "Pushed to remote").await?;

        self.log(id, "Opening review request...").await?;
        let review = ReviewRequest {
            branch: job.branch().clone(),
            base: Some(base),
            title: conventions::review_title(job.task()),
            body: conventions::review_body(&generated.explanation, job.task(), job.skills())?,
        };
        let url = pipeline.vcs.open_review_request(&review).await?;
        self.finish(job, Some(url.clone())).await?;
        self.log(id, &format!("Review request opened: {url}")).await?;
        notify(pipeline, job).await;
        Ok(())
    }

    async fn handle_failure(
        &self,
        pipeline: &Pipeline,
        job: Job,
        error: &StageError,
        config: &RunnerConfig,
    ) -> Attempt {
        let id = job.id();
        let message = error.to_string();
        tracing::warn!(job_id = %id, status = %job.status(), error = %message, "job attempt failed");

        let expected = ExpectedState::of(&job);
        let mut failing = job.clone();
        if let Err(transition) = failing.record_failure(message.clone(), &*self.clock) {
            tracing::error!(job_id = %id, error = %transition, "cannot record failure");
            return Attempt::Finished(ExecutionOutcome::Failed(job));
        }
        let failed = match self.write_guarded(&failing, expected).await {
            Ok(stored) => stored,
            Err(StageError::Cancelled) => return Attempt::Finished(ExecutionOutcome::Cancelled(id)),
            Err(StageError::Superseded) => return Attempt::Finished(ExecutionOutcome::Skipped(id)),
            Err(write_error) => {
                tracing::error!(job_id = %id, error = %write_error, "cannot persist failure");
                return Attempt::Finished(ExecutionOutcome::Failed(failing));
            }
        };
        self.log_best_effort(id, &format!("Error: {message}")).await;
        notify(pipeline, &failed).await;

        let policy = RetryPolicy::from_config(config);
        if !policy.should_retry(&failed) {
            return Attempt::Finished(ExecutionOutcome::Failed(self.refreshed(failed).await));
        }

        self.log_best_effort(id, "Auto-retrying...").await;
        let mut requeued = failed.clone();
        if let Err(transition) = requeued.requeue_for_automatic_retry(&*self.clock) {
            tracing::error!(job_id = %id, error = %transition, "cannot requeue job");
            return Attempt::Finished(ExecutionOutcome::Failed(failed));
        }
        match self
            .write_guarded(&requeued, ExpectedState::of(&failed))
            .await
        {
            Ok(_) => Attempt::RetryAfter(policy.delay()),
            Err(StageError::Cancelled | StageError::Superseded) => {
                Attempt::Finished(ExecutionOutcome::Skipped(id))
            }
            Err(write_error) => {
                tracing::error!(job_id = %id, error = %write_error, "cannot persist retry");
                Attempt::Finished(ExecutionOutcome::Failed(failed))
            }
        }
    }

    async fn advance(&self, job: &mut Job, target: JobStatus) -> Result<(), StageError> {
        let expected = ExpectedState::of(job);
        let mut next = job.clone();
        next.transition_to(target, &*self.clock)?;
        *job = self.write_guarded(&next, expected).await?;
        tracing::info!(job_id = %job.id(), status = %target, "job advanced");
        Ok(())
    }

    async fn finish(&self, job: &mut Job, pr_url: Option<String>) -> Result<(), StageError> {
        let expected = ExpectedState::of(job);
        let mut next = job.clone();
        next.complete(pr_url, &*self.clock)?;
        *job = self.write_guarded(&next, expected).await?;
        tracing::info!(job_id = %job.id(), pr_url = job.pr_url(), "job completed");
        Ok(())
    }

    async fn write_guarded(&self, job: &Job, expected: ExpectedState) -> Result<Job, StageError> {
        match self.repository.update_guarded(job, expected).await {
            Ok(stored) => Ok(stored),
            Err(JobRepositoryError::StatusConflict {
                actual: JobStatus::Cancelled,
                ..
            }) => Err(StageError::Cancelled),
            Err(JobRepositoryError::StatusConflict { .. }) => Err(StageError::Superseded),
            Err(other) => Err(other.into()),
        }
    }

    /// Fails with `Cancelled` or `Superseded` when the stored job moved on
    /// since this run last wrote it.
    async fn checkpoint(&self, job: &Job) -> Result<(), StageError> {
        let stored = self
            .repository
            .find_by_id(job.id())
            .await?
            .ok_or(JobRepositoryError::NotFound(job.id()))?;
        if stored.status() == JobStatus::Cancelled {
            return Err(StageError::Cancelled);
        }
        if !ExpectedState::of(job).matches(&stored) {
            return Err(StageError::Superseded);
        }
        Ok(())
    }

    async fn log(&self, id: JobId, message: &str) -> Result<(), StageError> {
        self.repository
            .append_log(id, message, self.clock.utc())
            .await?;
        Ok(())
    }

    async fn log_best_effort(&self, id: JobId, message: &str) {
        if let Err(error) = self.log(id, message).await {
            tracing::warn!(job_id = %id, %error, "failed to append job log");
        }
    }

    async fn refreshed(&self, job: Job) -> Job {
        match self.repository.find_by_id(job.id()).await {
            Ok(Some(stored)) => stored,
            Ok(None) | Err(_) => job,
        }
    }
}

async fn notify(pipeline: &Pipeline, job: &Job) {
    let update = StatusUpdate::for_job(job);
    if let Err(error) = pipeline.notifier.notify_status(&update).await {
        tracing::warn!(job_id = %job.id(), status = %job.status(), %error, "status notification failed");
    }
}

async fn restore_branch(pipeline: &Pipeline, id: JobId, branch: &BranchName) {
    if let Err(error) = pipeline.vcs.checkout(branch).await {
        tracing::warn!(job_id = %id, %branch, %error, "failed to restore original branch");
    }
}
