//! In-memory working tree and scripted test runner.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::StageGate;
use crate::job::{
    domain::{CodePatch, PatchOperation},
    ports::{PatchApplyError, TestReport, Workspace},
};

/// Working tree kept as a path-to-content map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkspace {
    state: Arc<Mutex<WorkspaceState>>,
    gate: Option<Arc<StageGate>>,
}

#[derive(Debug, Default)]
struct WorkspaceState {
    files: BTreeMap<String, String>,
    apply_calls: usize,
    commands_run: Vec<String>,
    failing_commands: HashSet<String>,
}

impl InMemoryWorkspace {
    /// Creates an empty working tree whose test commands all pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `command` exit unsuccessfully.
    #[must_use]
    pub fn failing_command(self, command: impl Into<String>) -> Self {
        self.lock().failing_commands.insert(command.into());
        self
    }

    /// Holds test runs at `gate` until it is released.
    #[must_use]
    pub fn with_test_gate(mut self, gate: Arc<StageGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Returns the current content of `path`.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    /// Returns how many times patches were applied.
    #[must_use]
    pub fn apply_calls(&self) -> usize {
        self.lock().apply_calls
    }

    /// Returns every test command run, in order.
    #[must_use]
    pub fn commands_run(&self) -> Vec<String> {
        self.lock().commands_run.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WorkspaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Workspace for InMemoryWorkspace {
    async fn apply(&self, patches: &[CodePatch]) -> Result<(), PatchApplyError> {
        let checked = patches
            .iter()
            .map(|patch| -> Result<_, PatchApplyError> { Ok((patch.checked_path()?, patch)) })
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.lock();
        state.apply_calls = state.apply_calls.saturating_add(1);
        for (path, patch) in checked {
            match patch.operation {
                PatchOperation::Create | PatchOperation::Modify => {
                    state.files.insert(path.to_string(), patch.content.clone());
                }
                PatchOperation::Delete => {
                    state.files.remove(path.as_path().as_str());
                }
            }
        }
        Ok(())
    }

    async fn run_tests(&self, commands: &[String], _timeout: Duration) -> TestReport {
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }

        let mut state = self.lock();
        let mut transcript = Vec::new();
        for command in commands {
            state.commands_run.push(command.clone());
            transcript.push(format!("$ {command}"));
            if state.failing_commands.contains(command) {
                transcript.push(format!("{command}: exited with status 1"));
                return TestReport {
                    success: false,
                    output: transcript.join("\n"),
                };
            }
        }
        TestReport {
            success: true,
            output: transcript.join("\n"),
        }
    }
}
