//! Runner configuration.
//!
//! Configuration is an explicit value. The service holds the current value in
//! a [`ConfigHandle`]; every execution attempt captures a snapshot when it
//! starts, so reloading never changes a run already in progress.

use crate::job::domain::{Guardrails, ProviderKind};
use camino::Utf8PathBuf;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Default maximum number of files a generation may change.
pub const DEFAULT_MAX_CHANGED_FILES: usize = 10;
/// Default diff budget, in lines.
pub const DEFAULT_MAX_DIFF_SIZE: usize = 5000;
/// Default factor turning the line budget into a character ceiling.
pub const DEFAULT_DIFF_SIZE_MULTIPLIER: usize = 100;
/// Upper bound on automatic retries per job.
pub const MAX_AUTOMATIC_RETRIES_CAP: u32 = 1;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_GENERATOR_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_GIT_REMOTE: &str = "origin";

/// Errors returned while loading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable holds a value that cannot be interpreted.
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        /// Environment key.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Settings consumed by the executor and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// SQLite database file.
    pub database_path: Utf8PathBuf,
    /// Provider requested from the generator.
    pub preferred_provider: ProviderKind,
    /// Maximum files one generation may change.
    pub max_changed_files: usize,
    /// Diff budget, in lines.
    pub max_diff_size: usize,
    /// Factor turning `max_diff_size` into a character ceiling.
    pub diff_size_multiplier: usize,
    /// Whether failed jobs are retried automatically.
    pub auto_retry: bool,
    /// Automatic retries allowed per job, never above
    /// [`MAX_AUTOMATIC_RETRIES_CAP`].
    pub max_automatic_retries: u32,
    /// Delay before an automatic retry.
    pub retry_delay: Duration,
    /// Default for `skip_tests` when a request leaves it unset.
    pub skip_tests_by_default: bool,
    /// Per-command test timeout.
    pub test_timeout: Duration,
    /// Shell command implementing the generator protocol.
    pub generator_command: Option<String>,
    /// Time budget for one generation.
    pub generator_timeout: Duration,
    /// Token passed to the review-request tool.
    pub github_token: Option<String>,
    /// Slack-compatible webhook for status notifications.
    pub slack_webhook_url: Option<String>,
    /// Remote used for fetch, push and default-branch discovery.
    pub git_remote: String,
    /// Time budget for one `git` or `gh` invocation.
    pub git_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(None),
            preferred_provider: ProviderKind::default(),
            max_changed_files: DEFAULT_MAX_CHANGED_FILES,
            max_diff_size: DEFAULT_MAX_DIFF_SIZE,
            diff_size_multiplier: DEFAULT_DIFF_SIZE_MULTIPLIER,
            auto_retry: true,
            max_automatic_retries: MAX_AUTOMATIC_RETRIES_CAP,
            retry_delay: DEFAULT_RETRY_DELAY,
            skip_tests_by_default: false,
            test_timeout: DEFAULT_TEST_TIMEOUT,
            generator_command: None,
            generator_timeout: DEFAULT_GENERATOR_TIMEOUT,
            github_token: None,
            slack_webhook_url: None,
            git_remote: DEFAULT_GIT_REMOTE.to_owned(),
            git_timeout: DEFAULT_GIT_TIMEOUT,
        }
    }
}

impl RunnerConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a numeric or provider value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// Unset and blank keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a numeric or provider value
    /// cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let database_path = get("CODA_DATABASE_PATH").map_or_else(
            || default_database_path(get("HOME").as_deref()),
            Utf8PathBuf::from,
        );
        let preferred_provider = get("PREFERRED_PROVIDER")
            .map(|value| {
                ProviderKind::try_from(value.as_str()).map_err(|err| ConfigError::Invalid {
                    key: "PREFERRED_PROVIDER",
                    value,
                    reason: err.to_string(),
                })
            })
            .transpose()?
            .unwrap_or(defaults.preferred_provider);

        let max_automatic_retries = parse_number("MAX_AUTOMATIC_RETRIES", get("MAX_AUTOMATIC_RETRIES"))?
            .unwrap_or(defaults.max_automatic_retries)
            .min(MAX_AUTOMATIC_RETRIES_CAP);

        Ok(Self {
            database_path,
            preferred_provider,
            max_changed_files: parse_number("MAX_CHANGED_FILES", get("MAX_CHANGED_FILES"))?
                .unwrap_or(defaults.max_changed_files),
            max_diff_size: parse_number("MAX_DIFF_SIZE", get("MAX_DIFF_SIZE"))?
                .unwrap_or(defaults.max_diff_size),
            diff_size_multiplier: parse_number("DIFF_SIZE_MULTIPLIER", get("DIFF_SIZE_MULTIPLIER"))?
                .unwrap_or(defaults.diff_size_multiplier),
            auto_retry: get("AUTO_RETRY").is_none_or(|value| !is_false(&value)),
            max_automatic_retries,
            retry_delay: parse_number("RETRY_DELAY_MS", get("RETRY_DELAY_MS"))?
                .map_or(defaults.retry_delay, Duration::from_millis),
            skip_tests_by_default: get("SKIP_TESTS_BY_DEFAULT").is_some_and(|value| is_true(&value)),
            test_timeout: parse_number("TEST_TIMEOUT_SECS", get("TEST_TIMEOUT_SECS"))?
                .map_or(defaults.test_timeout, Duration::from_secs),
            generator_command: get("CODA_GENERATOR_COMMAND"),
            generator_timeout: parse_number("GENERATOR_TIMEOUT_SECS", get("GENERATOR_TIMEOUT_SECS"))?
                .map_or(defaults.generator_timeout, Duration::from_secs),
            github_token: get("GITHUB_TOKEN"),
            slack_webhook_url: get("SLACK_WEBHOOK_URL"),
            git_remote: get("CODA_GIT_REMOTE").unwrap_or(defaults.git_remote),
            git_timeout: parse_number("GIT_TIMEOUT_SECS", get("GIT_TIMEOUT_SECS"))?
                .map_or(defaults.git_timeout, Duration::from_secs),
        })
    }

    /// Returns the patch guardrails derived from this configuration.
    #[must_use]
    pub const fn guardrails(&self) -> Guardrails {
        Guardrails::new(
            self.max_changed_files,
            self.max_diff_size,
            self.diff_size_multiplier,
        )
    }

    /// Returns a view with secrets redacted.
    #[must_use]
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            database_path: self.database_path.to_string(),
            preferred_provider: self.preferred_provider,
            generator: presence(self.generator_command.as_ref()),
            github_token: presence(self.github_token.as_ref()),
            slack_webhook_url: presence(self.slack_webhook_url.as_ref()),
            max_changed_files: self.max_changed_files,
            max_diff_size: self.max_diff_size,
            auto_retry: self.auto_retry,
            skip_tests_by_default: self.skip_tests_by_default,
            test_timeout_secs: self.test_timeout.as_secs(),
            git_remote: self.git_remote.clone(),
        }
    }
}

/// Redacted configuration view for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    /// SQLite database file.
    pub database_path: String,
    /// Preferred provider.
    pub preferred_provider: ProviderKind,
    /// Generator command presence.
    pub generator: &'static str,
    /// Token presence.
    pub github_token: &'static str,
    /// Webhook presence.
    pub slack_webhook_url: &'static str,
    /// Maximum changed files.
    pub max_changed_files: usize,
    /// Diff budget, in lines.
    pub max_diff_size: usize,
    /// Automatic retry flag.
    pub auto_retry: bool,
    /// Default skip-tests flag.
    pub skip_tests_by_default: bool,
    /// Per-command test timeout.
    pub test_timeout_secs: u64,
    /// Git remote.
    pub git_remote: String,
}

/// Process-wide current configuration with atomic reload.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<RunnerConfig>>>,
}

impl ConfigHandle {
    /// Wraps an initial configuration.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Returns the configuration in effect now.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RunnerConfig> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaces the configuration for subsequent attempts.
    pub fn replace(&self, config: RunnerConfig) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(config);
    }

    /// Reloads from the process environment, keeping the current value on
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the environment is invalid.
    pub fn reload_from_env(&self) -> Result<Arc<RunnerConfig>, ConfigError> {
        let config = RunnerConfig::from_env()?;
        self.replace(config);
        Ok(self.snapshot())
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

/// Loads a `.env` file from the working directory when one exists.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
        Err(error) if error.not_found() => {}
        Err(error) => tracing::warn!(%error, "failed to load .env file"),
    }
}

fn default_database_path(home: Option<&str>) -> Utf8PathBuf {
    let mut path = home.map_or_else(Utf8PathBuf::new, Utf8PathBuf::from);
    path.push(".coda");
    path.push("jobs.db");
    path
}

fn parse_number<T>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value.parse::<T>().map_err(|err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
            value,
        })
    })
    .transpose()
}

fn is_true(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn is_false(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off")
}

const fn presence<T>(value: Option<&T>) -> &'static str {
    if value.is_some() { "configured" } else { "not set" }
}
