//! Code generator that delegates to an external command.
//!
//! The command is run through `sh -c` in the repository directory. It
//! receives one JSON document on standard input:
//!
//! ```json
//! {"provider": "anthropic", "systemPrompt": "...", "userPrompt": "..."}
//! ```
//!
//! and must print the provider's raw response on standard output. The
//! response is parsed with [`GenerationResult::from_response_text`].

use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::Serialize;
use std::time::Duration;
use tokio::process::Command;

use super::filesystem::gather_repo_context;
use super::process::{ProcessError, run_captured};
use crate::job::{
    domain::{GenerationRequest, GenerationResult, ProviderKind},
    ports::{CodeGenerator, ProviderError},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneratorInput<'a> {
    provider: ProviderKind,
    system_prompt: &'a str,
    user_prompt: &'a str,
}

/// Runs a configured shell command to generate patches.
#[derive(Debug, Clone)]
pub struct ProcessGenerator {
    command: Option<String>,
    timeout: Duration,
}

impl ProcessGenerator {
    /// Creates a generator for `command`; `None` yields
    /// [`ProviderError::NotConfigured`] on every call.
    #[must_use]
    pub const fn new(command: Option<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl CodeGenerator for ProcessGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, ProviderError> {
        let command_line = self
            .command
            .as_deref()
            .filter(|command| !command.trim().is_empty())
            .ok_or(ProviderError::NotConfigured)?;

        let repo = Utf8PathBuf::from(request.repo.as_str());
        let context_root = repo.clone();
        let repo_context = tokio::task::spawn_blocking(move || gather_repo_context(&context_root))
            .await
            .map_err(ProviderError::transport)?;

        let system_prompt = request.system_prompt().map_err(ProviderError::transport)?;
        let user_prompt = request
            .user_prompt(&repo_context)
            .map_err(ProviderError::transport)?;
        let input = serde_json::to_vec(&GeneratorInput {
            provider: request.provider,
            system_prompt: &system_prompt,
            user_prompt: &user_prompt,
        })
        .map_err(ProviderError::transport)?;

        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line);
        if repo.is_dir() {
            command.current_dir(repo.as_std_path());
        }

        tracing::debug!(repo = %repo, provider = %request.provider, "invoking generator command");
        let output = run_captured(&mut command, Some(input), Some(self.timeout))
            .await
            .map_err(|err| match err {
                ProcessError::TimedOut(limit) => ProviderError::TimedOut(limit.as_secs()),
                other => ProviderError::transport(other),
            })?;

        if !output.success() {
            return Err(ProviderError::Failed(format!(
                "generator exited with {}: {}",
                output.status,
                output.diagnostic()
            )));
        }

        Ok(GenerationResult::from_response_text(&output.stdout)?)
    }
}
