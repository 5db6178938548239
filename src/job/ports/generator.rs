//! Code-generation port.

use crate::job::domain::{GenerationRequest, GenerationResult, ResponseParseError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Produces file patches for a task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generates patches, an explanation and optional test commands.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the provider is unavailable or its
    /// output is missing or malformed.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, ProviderError>;
}

/// Errors returned by code generators.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No generator is configured for this runner.
    #[error("no code generator configured")]
    NotConfigured,

    /// The provider output did not contain a usable result.
    #[error(transparent)]
    MalformedResponse(#[from] ResponseParseError),

    /// The provider exceeded its time budget.
    #[error("code generation timed out after {0} seconds")]
    TimedOut(u64),

    /// The provider reported a failure.
    #[error("code generation failed: {0}")]
    Failed(String),

    /// Transport or process failure while talking to the provider.
    #[error("code generation error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
