//! Scripted code generator for deterministic runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use super::StageGate;
use crate::job::{
    domain::{GenerationRequest, GenerationResult},
    ports::{CodeGenerator, ProviderError},
};

/// Generator that replays queued responses in order.
///
/// Once the queue is exhausted the fallback response, if any, is returned
/// for every further call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    state: Arc<Mutex<ScriptedState>>,
    gate: Option<Arc<StageGate>>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    queued: VecDeque<Result<GenerationResult, ProviderError>>,
    fallback: Option<Result<GenerationResult, ProviderError>>,
    requests: Vec<GenerationRequest>,
}

impl ScriptedGenerator {
    /// Creates a generator returning `responses` in order.
    #[must_use]
    pub fn new(responses: impl IntoIterator<Item = Result<GenerationResult, ProviderError>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedState {
                queued: responses.into_iter().collect(),
                ..ScriptedState::default()
            })),
            gate: None,
        }
    }

    /// Creates a generator returning `response` on every call.
    #[must_use]
    pub fn always(response: Result<GenerationResult, ProviderError>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedState {
                fallback: Some(response),
                ..ScriptedState::default()
            })),
            gate: None,
        }
    }

    /// Holds every generation call at `gate` until it is released.
    ///
    /// The call completes normally once released.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<StageGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .clone()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, ProviderError> {
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.requests.push(request.clone());
        match state.queued.pop_front() {
            Some(response) => response,
            None => state.fallback.clone().unwrap_or_else(|| {
                Err(ProviderError::Failed("no scripted response left".to_owned()))
            }),
        }
    }
}
