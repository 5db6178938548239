//! Generation request and result types, prompt rendering, and guardrails.

use super::{CodePatch, ParseProviderKindError, RepositoryPath, SkillContext, TaskDescription};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are an expert software engineer. You will receive a task description and information about a codebase.
Your job is to generate code patches to complete the task.

IMPORTANT: Respond ONLY with valid JSON in this exact format:
{
  "patches": [
    {
      "filePath": "relative/path/to/file",
      "content": "full file content here",
      "operation": "create" | "modify" | "delete"
    }
  ],
  "explanation": "Brief explanation of changes",
  "testCommands": ["commands that verify the change"]
}

Rules:
- Always provide the COMPLETE file content for modifications, not just the changed parts
- Use relative paths from the repository root
- Keep changes minimal and focused on the task
- Follow existing code style and patterns
- Include test commands if applicable
{%- if skills %}

---

# Applied Skills

The following skills and guidelines must be followed:
{% for skill in skills %}
## {{ skill.name }}
{{ skill.content }}
{% endfor %}
{%- endif %}"#;

const USER_PROMPT_TEMPLATE: &str = "Task: {{ task }}

Repository: {{ repo }}

Repository context:
{{ repo_context }}

Generate the necessary code patches to complete this task.";

/// Content-generation provider preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic models.
    #[default]
    Anthropic,
    /// OpenAI models.
    OpenAi,
}

impl ProviderKind {
    /// Returns the canonical provider name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderKind {
    type Error = ParseProviderKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            _ => Err(ParseProviderKindError(value.to_owned())),
        }
    }
}

/// Everything a generator needs to produce patches for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    /// Task to implement.
    pub task: TaskDescription,
    /// Repository the patches target.
    pub repo: RepositoryPath,
    /// Preferred provider.
    pub provider: ProviderKind,
    /// Skills the generator must follow.
    pub skills: Vec<SkillContext>,
}

impl GenerationRequest {
    /// Renders the system prompt, appending an "Applied Skills" section when
    /// skills are present.
    ///
    /// # Errors
    ///
    /// Returns the template engine error if rendering fails.
    pub fn system_prompt(&self) -> Result<String, minijinja::Error> {
        Environment::new().render_str(SYSTEM_PROMPT_TEMPLATE, context! { skills => &self.skills })
    }

    /// Renders the user prompt around the gathered repository context.
    ///
    /// # Errors
    ///
    /// Returns the template engine error if rendering fails.
    pub fn user_prompt(&self, repo_context: &str) -> Result<String, minijinja::Error> {
        Environment::new().render_str(
            USER_PROMPT_TEMPLATE,
            context! {
                task => self.task.as_str(),
                repo => self.repo.as_str(),
                repo_context => repo_context,
            },
        )
    }
}

/// Patches, explanation and verification commands returned by a generator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// File changes to apply.
    pub patches: Vec<CodePatch>,
    /// Human-readable summary of the change.
    pub explanation: String,
    /// Commands that verify the change, run in order.
    pub test_commands: Vec<String>,
}

/// Error returned when a provider response does not contain a usable result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResponseParseError {
    /// The response contains no JSON object.
    #[error("no JSON found in generator response")]
    MissingJson,
    /// The JSON object does not match the expected shape.
    #[error("failed to parse generator response: {0}")]
    InvalidJson(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGenerationResult {
    #[serde(default)]
    patches: Option<Vec<CodePatch>>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default, alias = "test_commands")]
    test_commands: Option<Vec<String>>,
}

impl GenerationResult {
    /// Extracts the result from raw provider text.
    ///
    /// The span from the first `{` to the last `}` is parsed as JSON, so
    /// prose or code fences around the object are tolerated. Missing fields
    /// default to empty values.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseParseError`] when no object is found or it does not
    /// deserialize.
    pub fn from_response_text(text: &str) -> Result<Self, ResponseParseError> {
        let start = text.find('{').ok_or(ResponseParseError::MissingJson)?;
        let end = text.rfind('}').ok_or(ResponseParseError::MissingJson)?;
        let candidate = text
            .get(start..=end)
            .ok_or(ResponseParseError::MissingJson)?;

        let raw: RawGenerationResult = serde_json::from_str(candidate)
            .map_err(|error| ResponseParseError::InvalidJson(error.to_string()))?;

        Ok(Self {
            patches: raw.patches.unwrap_or_default(),
            explanation: raw.explanation.unwrap_or_default(),
            test_commands: raw.test_commands.unwrap_or_default(),
        })
    }
}

/// Error returned when generated patches exceed the configured limits.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardrailError {
    /// More files changed than allowed.
    #[error("too many files changed: {count} exceeds the limit of {limit}")]
    TooManyFiles {
        /// Number of patches generated.
        count: usize,
        /// Configured maximum.
        limit: usize,
    },
    /// Aggregate content exceeds the character budget.
    #[error("diff too large: {size} characters exceeds the limit of {limit}")]
    DiffTooLarge {
        /// Aggregate content size in characters.
        size: usize,
        /// Configured character ceiling.
        limit: usize,
    },
}

/// Limits applied to generated patches before anything touches the
/// repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guardrails {
    max_changed_files: usize,
    max_diff_chars: usize,
}

impl Guardrails {
    /// Creates guardrails from the configured file limit and diff budget.
    ///
    /// The diff budget is expressed in lines and scaled by `multiplier` into
    /// an approximate character ceiling.
    #[must_use]
    pub const fn new(max_changed_files: usize, max_diff_size: usize, multiplier: usize) -> Self {
        Self {
            max_changed_files,
            max_diff_chars: max_diff_size.saturating_mul(multiplier),
        }
    }

    /// Returns the maximum number of changed files.
    #[must_use]
    pub const fn max_changed_files(&self) -> usize {
        self.max_changed_files
    }

    /// Returns the aggregate character ceiling.
    #[must_use]
    pub const fn max_diff_chars(&self) -> usize {
        self.max_diff_chars
    }

    /// Checks the patch set against both limits.
    ///
    /// # Errors
    ///
    /// Returns [`GuardrailError`] naming the exceeded limit.
    pub fn check(&self, patches: &[CodePatch]) -> Result<(), GuardrailError> {
        if patches.len() > self.max_changed_files {
            return Err(GuardrailError::TooManyFiles {
                count: patches.len(),
                limit: self.max_changed_files,
            });
        }

        let size = patches
            .iter()
            .map(CodePatch::content_len)
            .fold(0_usize, usize::saturating_add);
        if size > self.max_diff_chars {
            return Err(GuardrailError::DiffTooLarge {
                size,
                limit: self.max_diff_chars,
            });
        }
        Ok(())
    }
}
