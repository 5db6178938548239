//! Job aggregate root.

use super::{
    BranchName, JobDomainError, JobId, JobStatus, RepositoryPath, SkillContext, TaskDescription,
};
use chrono::{DateTime, SecondsFormat, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Job aggregate root.
///
/// Status changes go through the transition methods, which enforce the edges
/// of [`JobStatus::can_transition_to`]. The log only ever grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    id: JobId,
    task: TaskDescription,
    repo: RepositoryPath,
    base_branch: Option<BranchName>,
    branch: BranchName,
    status: JobStatus,
    pr_url: Option<String>,
    error: Option<String>,
    logs: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    dry_run: bool,
    skip_tests: bool,
    retry_count: u32,
    skills: Vec<SkillContext>,
}

/// Parameter object for creating a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    /// Validated task description.
    pub task: TaskDescription,
    /// Target repository.
    pub repo: RepositoryPath,
    /// Explicit base branch, if any.
    pub base_branch: Option<BranchName>,
    /// Branch the job will commit to.
    pub branch: BranchName,
    /// Whether push and review-request creation are skipped.
    pub dry_run: bool,
    /// Whether the testing stage is skipped.
    pub skip_tests: bool,
    /// Skills injected into the generation request.
    pub skills: Vec<SkillContext>,
}

/// Parameter object for reconstructing a persisted job aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedJobData {
    /// Persisted job identifier.
    pub id: JobId,
    /// Persisted task description.
    pub task: TaskDescription,
    /// Persisted repository.
    pub repo: RepositoryPath,
    /// Persisted base branch, if any.
    pub base_branch: Option<BranchName>,
    /// Persisted job branch.
    pub branch: BranchName,
    /// Persisted status.
    pub status: JobStatus,
    /// Persisted review-request URL, if any.
    pub pr_url: Option<String>,
    /// Persisted failure message, if any.
    pub error: Option<String>,
    /// Persisted log entries.
    pub logs: Vec<String>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Persisted dry-run flag.
    pub dry_run: bool,
    /// Persisted skip-tests flag.
    pub skip_tests: bool,
    /// Persisted retry counter.
    pub retry_count: u32,
    /// Persisted skills.
    pub skills: Vec<SkillContext>,
}

impl Job {
    /// Creates a queued job with a fresh identifier.
    #[must_use]
    pub fn new(data: NewJob, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: JobId::new(),
            task: data.task,
            repo: data.repo,
            base_branch: data.base_branch,
            branch: data.branch,
            status: JobStatus::Queued,
            pr_url: None,
            error: None,
            logs: Vec::new(),
            created_at: timestamp,
            updated_at: timestamp,
            dry_run: data.dry_run,
            skip_tests: data.skip_tests,
            retry_count: 0,
            skills: data.skills,
        }
    }

    /// Reconstructs a job from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedJobData) -> Self {
        Self {
            id: data.id,
            task: data.task,
            repo: data.repo,
            base_branch: data.base_branch,
            branch: data.branch,
            status: data.status,
            pr_url: data.pr_url,
            error: data.error,
            logs: data.logs,
            created_at: data.created_at,
            updated_at: data.updated_at,
            dry_run: data.dry_run,
            skip_tests: data.skip_tests,
            retry_count: data.retry_count,
            skills: data.skills,
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Returns the task description.
    #[must_use]
    pub const fn task(&self) -> &TaskDescription {
        &self.task
    }

    /// Returns the target repository.
    #[must_use]
    pub const fn repo(&self) -> &RepositoryPath {
        &self.repo
    }

    /// Returns the explicit base branch, if any.
    #[must_use]
    pub const fn base_branch(&self) -> Option<&BranchName> {
        self.base_branch.as_ref()
    }

    /// Returns the job branch.
    #[must_use]
    pub const fn branch(&self) -> &BranchName {
        &self.branch
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Returns the review-request URL, if one was opened.
    #[must_use]
    pub fn pr_url(&self) -> Option<&str> {
        self.pr_url.as_deref()
    }

    /// Returns the last failure message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the log entries in append order.
    #[must_use]
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest mutation timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether the job stops before pushing.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Returns whether the testing stage is skipped.
    #[must_use]
    pub const fn skip_tests(&self) -> bool {
        self.skip_tests
    }

    /// Returns the number of retries consumed.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the skills injected into generation.
    #[must_use]
    pub fn skills(&self) -> &[SkillContext] {
        &self.skills
    }

    /// Moves the job along an edge of the state machine.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] when `target` is not
    /// reachable from the current status.
    pub fn transition_to(
        &mut self,
        target: JobStatus,
        clock: &impl Clock,
    ) -> Result<(), JobDomainError> {
        self.ensure_edge(target)?;
        self.status = target;
        self.touch(clock);
        Ok(())
    }

    /// Marks the job failed and records the failure message.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is in a
    /// working stage.
    pub fn record_failure(
        &mut self,
        message: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), JobDomainError> {
        self.ensure_edge(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
        self.touch(clock);
        Ok(())
    }

    /// Completes the job, recording the review-request URL when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// patching or testing.
    pub fn complete(
        &mut self,
        pr_url: Option<String>,
        clock: &impl Clock,
    ) -> Result<(), JobDomainError> {
        self.ensure_edge(JobStatus::PrOpened)?;
        self.status = JobStatus::PrOpened;
        self.pr_url = pr_url;
        self.touch(clock);
        Ok(())
    }

    /// Cancels the job if it is still cancellable.
    ///
    /// Returns `false`, leaving the job untouched, when the status is already
    /// past the point of cancellation.
    pub fn cancel(&mut self, clock: &impl Clock) -> bool {
        if !self.status.is_cancellable() {
            return false;
        }
        self.status = JobStatus::Cancelled;
        self.touch(clock);
        true
    }

    /// Re-queues a failed job through the automatic retry path.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job failed.
    pub fn requeue_for_automatic_retry(&mut self, clock: &impl Clock) -> Result<(), JobDomainError> {
        self.ensure_edge(JobStatus::Queued)?;
        self.status = JobStatus::Queued;
        self.error = None;
        self.retry_count = self.retry_count.saturating_add(1);
        self.touch(clock);
        Ok(())
    }

    /// Re-queues the job on operator request, from any status.
    ///
    /// The error and any previous review-request URL are cleared because the
    /// next run produces its own outcome.
    pub fn requeue_manually(&mut self, clock: &impl Clock) {
        self.status = JobStatus::Queued;
        self.error = None;
        self.pr_url = None;
        self.retry_count = self.retry_count.saturating_add(1);
        self.touch(clock);
    }

    /// Appends a timestamped log entry and refreshes `updated_at`.
    pub fn append_log(&mut self, message: &str, at: DateTime<Utc>) {
        self.logs.push(format_log_entry(message, at));
        if at > self.updated_at {
            self.updated_at = at;
        }
    }

    /// Replaces the log with the monotonic merge of `stored` and the local
    /// entries.
    ///
    /// Used by repositories so that writing back a stale copy of the job
    /// never drops entries appended concurrently.
    pub fn reconcile_logs_with(&mut self, stored: &[String]) {
        let local = std::mem::take(&mut self.logs);
        self.logs = reconcile_logs(stored, local);
    }

    fn ensure_edge(&self, target: JobStatus) -> Result<(), JobDomainError> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(JobDomainError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: target,
            })
        }
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}

/// Formats a log entry as `[<RFC 3339 UTC>] <message>`.
#[must_use]
pub fn format_log_entry(message: &str, at: DateTime<Utc>) -> String {
    format!("[{}] {message}", at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Merges two views of the same job log without losing entries.
///
/// `incoming` normally extends `stored`. When it was derived from an older
/// snapshot, the entries it shares with `stored` are skipped and only the new
/// tail is appended after everything already stored.
#[must_use]
pub fn reconcile_logs(stored: &[String], incoming: Vec<String>) -> Vec<String> {
    let shared = stored
        .iter()
        .zip(&incoming)
        .take_while(|(left, right)| left == right)
        .count();

    if shared == stored.len() {
        return incoming;
    }

    let mut merged = stored.to_vec();
    merged.extend(incoming.into_iter().skip(shared));
    merged
}
