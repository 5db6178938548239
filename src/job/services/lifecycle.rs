//! Service layer for job creation, retry, cancellation and retrieval.

use crate::config::{ConfigError, ConfigHandle, ConfigSummary, RunnerConfig};
use crate::job::{
    domain::{
        BranchName, Job, JobDomainError, JobId, JobStatus, NewJob, RepositoryPath, SkillContext,
        TaskDescription,
    },
    ports::{ExpectedState, JobRepository, JobRepositoryError, PipelineFactory},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::executor::{ExecutionOutcome, JobExecutor};

/// Attempts made by retry and cancel before reporting a conflict.
const MAX_CONFLICT_ATTEMPTS: usize = 3;

/// Request payload for creating a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJobRequest {
    task: String,
    repo: String,
    base_branch: Option<String>,
    dry_run: bool,
    skip_tests: Option<bool>,
    skills: Vec<(String, String)>,
}

impl CreateJobRequest {
    /// Creates a request with the required task and repository.
    #[must_use]
    pub fn new(task: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            repo: repo.into(),
            base_branch: None,
            dry_run: false,
            skip_tests: None,
            skills: Vec::new(),
        }
    }

    /// Sets the branch to branch from.
    #[must_use]
    pub fn with_base_branch(mut self, base_branch: impl Into<String>) -> Self {
        self.base_branch = Some(base_branch.into());
        self
    }

    /// Stops the run before pushing or opening a review request.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Overrides the configured skip-tests default.
    #[must_use]
    pub const fn with_skip_tests(mut self, skip_tests: bool) -> Self {
        self.skip_tests = Some(skip_tests);
        self
    }

    /// Adds a skill passed to the generator.
    #[must_use]
    pub fn with_skill(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.skills.push((name.into(), content.into()));
        self
    }
}

/// Service-level errors for job lifecycle operations.
#[derive(Debug, Error)]
pub enum JobServiceError {
    /// Request validation failed; no job was created.
    #[error(transparent)]
    Validation(#[from] JobDomainError),
    /// The job does not exist.
    #[error("job not found: {0}")]
    NotFound(JobId),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(JobRepositoryError),
    /// The job kept changing while the request was being applied.
    #[error("job {0} changed concurrently, try again")]
    Conflict(JobId),
}

impl From<JobRepositoryError> for JobServiceError {
    fn from(err: JobRepositoryError) -> Self {
        match err {
            JobRepositoryError::NotFound(id) => Self::NotFound(id),
            other => Self::Repository(other),
        }
    }
}

/// Result type for job service operations.
pub type JobServiceResult<T> = Result<T, JobServiceError>;

/// Job lifecycle facade.
///
/// Creation and retry persist the job and hand it to the executor without
/// waiting for any stage to run.
pub struct JobService<R, F, C>
where
    R: JobRepository + 'static,
    F: PipelineFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    repository: Arc<R>,
    executor: JobExecutor<R, F, C>,
    config: ConfigHandle,
    clock: Arc<C>,
}

impl<R, F, C> JobService<R, F, C>
where
    R: JobRepository + 'static,
    F: PipelineFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a service and its executor.
    #[must_use]
    pub fn new(repository: Arc<R>, factory: Arc<F>, config: ConfigHandle, clock: Arc<C>) -> Self {
        let executor = JobExecutor::new(
            Arc::clone(&repository),
            factory,
            config.clone(),
            Arc::clone(&clock),
        );
        Self {
            repository,
            executor,
            config,
            clock,
        }
    }

    /// Returns the executor running this service's jobs.
    #[must_use]
    pub const fn executor(&self) -> &JobExecutor<R, F, C> {
        &self.executor
    }

    /// Validates and stores a job, then starts it.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError::Validation`] when the task, repository,
    /// base branch or a skill name is invalid, or
    /// [`JobServiceError::Repository`] when the job cannot be stored.
    pub async fn create_job(&self, request: CreateJobRequest) -> JobServiceResult<Job> {
        let (job, _handle) = self.submit(request).await?;
        Ok(job)
    }

    /// Like [`JobService::create_job`], also returning the handle of the
    /// spawned execution.
    ///
    /// # Errors
    ///
    /// See [`JobService::create_job`].
    pub async fn submit(
        &self,
        request: CreateJobRequest,
    ) -> JobServiceResult<(Job, JoinHandle<ExecutionOutcome>)> {
        let job = self.build_job(request)?;
        let stored = self.repository.create(&job).await?;
        tracing::info!(
            job_id = %stored.id(),
            repo = %stored.repo(),
            branch = %stored.branch(),
            "job created"
        );
        let handle = self.executor.spawn(stored.id());
        Ok((stored, handle))
    }

    fn build_job(&self, request: CreateJobRequest) -> JobServiceResult<Job> {
        let CreateJobRequest {
            task: raw_task,
            repo: raw_repo,
            base_branch: raw_base_branch,
            dry_run,
            skip_tests: skip_tests_override,
            skills: raw_skills,
        } = request;

        let task = TaskDescription::new(raw_task)?;
        let repo = RepositoryPath::new(raw_repo)?;
        let base_branch = raw_base_branch
            .filter(|name| !name.trim().is_empty())
            .map(BranchName::new)
            .transpose()?;
        let skills = raw_skills
            .into_iter()
            .map(|(name, content)| SkillContext::new(name, content))
            .collect::<Result<Vec<_>, _>>()?;
        let skip_tests = skip_tests_override
            .unwrap_or_else(|| self.config.snapshot().skip_tests_by_default);
        let branch = BranchName::derive_from_task(task.as_str());

        Ok(Job::new(
            NewJob {
                task,
                repo,
                base_branch,
                branch,
                dry_run,
                skip_tests,
                skills,
            },
            &*self.clock,
        ))
    }

    /// Returns a job by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError::NotFound`] for an unknown identifier.
    pub async fn get_job(&self, id: JobId) -> JobServiceResult<Job> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(JobServiceError::NotFound(id))
    }

    /// Returns every job, newest created first.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError::Repository`] when the lookup fails.
    pub async fn list_jobs(&self) -> JobServiceResult<Vec<Job>> {
        Ok(self.repository.list().await?)
    }

    /// Returns jobs in `status`, newest created first.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError::Repository`] when the lookup fails.
    pub async fn list_jobs_by_status(&self, status: JobStatus) -> JobServiceResult<Vec<Job>> {
        Ok(self.repository.list_by_status(status).await?)
    }

    /// Returns jobs targeting `repo`, newest created first.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError::Validation`] for an empty repository, or
    /// [`JobServiceError::Repository`] when the lookup fails.
    pub async fn list_jobs_by_repo(&self, repo: &str) -> JobServiceResult<Vec<Job>> {
        let path = RepositoryPath::new(repo)?;
        Ok(self.repository.list_by_repo(&path).await?)
    }

    /// Re-queues a job from any status and starts it again.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError::NotFound`] for an unknown identifier, or
    /// [`JobServiceError::Conflict`] when the job keeps changing underneath
    /// the request.
    pub async fn retry_job(&self, id: JobId) -> JobServiceResult<Job> {
        let (job, _handle) = self.resubmit(id).await?;
        Ok(job)
    }

    /// Like [`JobService::retry_job`], also returning the handle of the
    /// spawned execution.
    ///
    /// # Errors
    ///
    /// See [`JobService::retry_job`].
    pub async fn resubmit(&self, id: JobId) -> JobServiceResult<(Job, JoinHandle<ExecutionOutcome>)> {
        for _ in 0..MAX_CONFLICT_ATTEMPTS {
            let current = self.get_job(id).await?;
            let mut requeued = current.clone();
            requeued.requeue_manually(&*self.clock);

            match self
                .repository
                .update_guarded(&requeued, ExpectedState::of(&current))
                .await
            {
                Ok(_) => {
                    let job = self
                        .repository
                        .append_log(id, "Job retry requested", self.clock.utc())
                        .await?;
                    tracing::info!(job_id = %id, retry_count = job.retry_count(), "job retry requested");
                    let handle = self.executor.spawn(id);
                    return Ok((job, handle));
                }
                Err(JobRepositoryError::StatusConflict { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Err(JobServiceError::Conflict(id))
    }

    /// Cancels a job that has not finished yet.
    ///
    /// A job that is already terminal or failed is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`JobServiceError::NotFound`] for an unknown identifier, or
    /// [`JobServiceError::Conflict`] when the job keeps changing underneath
    /// the request.
    pub async fn cancel_job(&self, id: JobId) -> JobServiceResult<Job> {
        for _ in 0..MAX_CONFLICT_ATTEMPTS {
            let current = self.get_job(id).await?;
            let mut cancelled = current.clone();
            if !cancelled.cancel(&*self.clock) {
                return Ok(current);
            }

            match self
                .repository
                .update_guarded(&cancelled, ExpectedState::of(&current))
                .await
            {
                Ok(_) => {
                    let job = self
                        .repository
                        .append_log(id, "Job cancelled", self.clock.utc())
                        .await?;
                    tracing::info!(job_id = %id, from = %current.status(), "job cancelled");
                    return Ok(job);
                }
                Err(JobRepositoryError::StatusConflict { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Err(JobServiceError::Conflict(id))
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> Arc<RunnerConfig> {
        self.config.snapshot()
    }

    /// Returns the redacted view of the current configuration.
    #[must_use]
    pub fn config_summary(&self) -> ConfigSummary {
        self.config.snapshot().summary()
    }

    /// Replaces the configuration used by attempts started from now on.
    pub fn update_config(&self, config: RunnerConfig) {
        self.config.replace(config);
    }

    /// Reloads the configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is malformed; the previous
    /// configuration stays in effect.
    pub fn reload_config(&self) -> Result<Arc<RunnerConfig>, ConfigError> {
        self.config.reload_from_env()
    }
}
