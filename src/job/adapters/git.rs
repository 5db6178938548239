//! Version-control driver backed by the `git` and `gh` command-line tools.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::time::Duration;
use tokio::process::Command;

use super::process::{CommandOutput, ProcessError, run_captured};
use crate::job::{
    domain::BranchName,
    ports::{GitError, ReviewRequest, VersionControl},
};

const FALLBACK_DEFAULT_BRANCHES: [&str; 2] = ["main", "master"];
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Drives one repository working tree through `git`, and opens review
/// requests through `gh`.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: Utf8PathBuf,
    remote: String,
    token: Option<String>,
    timeout: Duration,
}

impl GitCli {
    /// Creates a driver for the working tree at `repo`.
    #[must_use]
    pub fn new(repo: impl Into<Utf8PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            remote: remote.into(),
            token: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Sets the token passed to `gh` as `GH_TOKEN`.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Bounds every `git` and `gh` invocation.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the working tree path.
    #[must_use]
    pub fn repo(&self) -> &Utf8Path {
        &self.repo
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, GitError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(self.repo.as_std_path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GH_PROMPT_DISABLED", "1");
        if let Some(token) = self.token.as_ref().filter(|_| program == "gh") {
            command.env("GH_TOKEN", token);
        }
        run_captured(&mut command, None, Some(self.timeout))
            .await
            .map_err(|err| spawn_error(program, &err))
    }

    async fn git(&self, operation: &str, args: &[&str]) -> Result<String, GitError> {
        let output = self.run("git", args).await?;
        if !output.success() {
            return Err(GitError::command_failed(operation, output.diagnostic()));
        }
        Ok(output.stdout.trim().to_owned())
    }

    /// Runs a git command whose failure is tolerated.
    async fn git_best_effort(&self, operation: &str, args: &[&str]) {
        if let Err(error) = self.git(operation, args).await {
            tracing::debug!(repo = %self.repo, operation, %error, "ignoring git failure");
        }
    }

    async fn ref_exists(&self, reference: &str) -> Result<bool, GitError> {
        let output = self
            .run("git", &["rev-parse", "--verify", "--quiet", reference])
            .await?;
        Ok(output.success())
    }
}

fn spawn_error(program: &str, err: &ProcessError) -> GitError {
    GitError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    }
}

fn parse_branch(raw: &str) -> Result<BranchName, GitError> {
    BranchName::new(raw).map_err(|err| GitError::UnexpectedOutput(err.to_string()))
}

/// Extracts the first URL printed by `gh pr create`.
fn extract_url(output: &str) -> Option<&str> {
    output
        .split_whitespace()
        .find(|token| token.starts_with("https://") || token.starts_with("http://"))
}

#[async_trait]
impl VersionControl for GitCli {
    async fn current_branch(&self) -> Result<BranchName, GitError> {
        let name = self
            .git("rev-parse", &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        parse_branch(&name)
    }

    async fn default_branch(&self) -> Result<BranchName, GitError> {
        let remote_head = format!("refs/remotes/{}/HEAD", self.remote);
        if let Ok(symbolic) = self
            .git("symbolic-ref", &["symbolic-ref", "--short", &remote_head])
            .await
        {
            let prefix = format!("{}/", self.remote);
            let name = symbolic.strip_prefix(&prefix).unwrap_or(&symbolic);
            return parse_branch(name);
        }

        for candidate in FALLBACK_DEFAULT_BRANCHES {
            if self.ref_exists(&format!("refs/heads/{candidate}")).await? {
                return parse_branch(candidate);
            }
        }

        Err(GitError::command_failed(
            "default-branch",
            "could not resolve the default branch",
        ))
    }

    async fn create_branch(&self, name: &BranchName, base: &BranchName) -> Result<(), GitError> {
        let branch = name.as_str();
        let remote = self.remote.as_str();
        self.git_best_effort("fetch", &["fetch", remote]).await;

        // Leave the branch before deleting it in case a previous attempt
        // left it checked out.
        if self.current_branch().await.ok().as_ref() == Some(name) {
            self.git_best_effort("checkout", &["checkout", base.as_str()])
                .await;
        }
        self.git_best_effort("branch", &["branch", "-D", branch]).await;
        self.git_best_effort("push", &["push", remote, "--delete", branch])
            .await;

        let remote_base = format!("{remote}/{}", base.as_str());
        let start_point = if self.ref_exists(&format!("refs/heads/{base}")).await? {
            base.as_str().to_owned()
        } else {
            remote_base
        };
        self.git("checkout", &["checkout", "-B", branch, &start_point])
            .await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.git("add", &["add", "-A"]).await?;
        self.git("commit", &["commit", "-m", message]).await?;
        Ok(())
    }

    async fn push(&self, name: &BranchName) -> Result<(), GitError> {
        self.git(
            "push",
            &["push", "--set-upstream", &self.remote, name.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn open_review_request(&self, request: &ReviewRequest) -> Result<String, GitError> {
        let mut args = vec![
            "pr",
            "create",
            "--head",
            request.branch.as_str(),
            "--title",
            request.title.as_str(),
            "--body",
            request.body.as_str(),
        ];
        if let Some(base) = &request.base {
            args.extend(["--base", base.as_str()]);
        }

        let output = self.run("gh", &args).await?;
        if !output.success() {
            return Err(GitError::command_failed("pr create", output.diagnostic()));
        }
        extract_url(&output.stdout)
            .map(str::to_owned)
            .ok_or_else(|| GitError::UnexpectedOutput(output.stdout.trim().to_owned()))
    }

    async fn checkout(&self, name: &BranchName) -> Result<(), GitError> {
        self.git("checkout", &["checkout", name.as_str()]).await?;
        Ok(())
    }
}
