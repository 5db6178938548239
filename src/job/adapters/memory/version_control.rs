//! Recording version-control double.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use super::StageGate;
use crate::job::{
    domain::BranchName,
    ports::{GitError, ReviewRequest, VersionControl},
};

/// Version-control operation, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsOperation {
    /// [`VersionControl::current_branch`].
    CurrentBranch,
    /// [`VersionControl::default_branch`].
    DefaultBranch,
    /// [`VersionControl::create_branch`].
    CreateBranch,
    /// [`VersionControl::commit`].
    Commit,
    /// [`VersionControl::push`].
    Push,
    /// [`VersionControl::open_review_request`].
    OpenReviewRequest,
    /// [`VersionControl::checkout`].
    Checkout,
}

/// A call received by [`InMemoryVersionControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    /// Current branch queried.
    CurrentBranch,
    /// Default branch queried.
    DefaultBranch,
    /// Branch created.
    CreateBranch {
        /// New branch.
        name: BranchName,
        /// Base branch.
        base: BranchName,
    },
    /// Changes committed.
    Commit(String),
    /// Branch pushed.
    Push(BranchName),
    /// Review request opened.
    OpenReviewRequest(ReviewRequest),
    /// Branch checked out.
    Checkout(BranchName),
}

impl VcsCall {
    /// Returns the operation this call belongs to.
    #[must_use]
    pub const fn operation(&self) -> VcsOperation {
        match self {
            Self::CurrentBranch => VcsOperation::CurrentBranch,
            Self::DefaultBranch => VcsOperation::DefaultBranch,
            Self::CreateBranch { .. } => VcsOperation::CreateBranch,
            Self::Commit(_) => VcsOperation::Commit,
            Self::Push(_) => VcsOperation::Push,
            Self::OpenReviewRequest(_) => VcsOperation::OpenReviewRequest,
            Self::Checkout(_) => VcsOperation::Checkout,
        }
    }
}

/// Version-control double that records calls and tracks the checked-out
/// branch.
#[derive(Debug, Clone)]
pub struct InMemoryVersionControl {
    state: Arc<Mutex<VcsState>>,
}

#[derive(Debug)]
struct VcsState {
    checked_out: BranchName,
    default_branch: BranchName,
    calls: Vec<VcsCall>,
    failing: HashSet<VcsOperation>,
    gates: HashMap<VcsOperation, Arc<StageGate>>,
    review_base_url: String,
}

impl InMemoryVersionControl {
    /// Creates a repository whose default and checked-out branch is
    /// `default_branch`.
    #[must_use]
    pub fn new(default_branch: BranchName) -> Self {
        Self {
            state: Arc::new(Mutex::new(VcsState {
                checked_out: default_branch.clone(),
                default_branch,
                calls: Vec::new(),
                failing: HashSet::new(),
                gates: HashMap::new(),
                review_base_url: "https://git.example.test/pulls".to_owned(),
            })),
        }
    }

    /// Makes every call of `operation` fail.
    #[must_use]
    pub fn failing_on(self, operation: VcsOperation) -> Self {
        self.lock().failing.insert(operation);
        self
    }

    /// Holds calls of `operation` at `gate` until it is released.
    ///
    /// A held call is recorded, and takes effect, only once released.
    #[must_use]
    pub fn gated_on(self, operation: VcsOperation, gate: Arc<StageGate>) -> Self {
        self.lock().gates.insert(operation, gate);
        self
    }

    /// Stops failing calls of `operation`.
    pub fn recover(&self, operation: VcsOperation) {
        self.lock().failing.remove(&operation);
    }

    /// Returns every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<VcsCall> {
        self.lock().calls.clone()
    }

    /// Returns how many calls of `operation` were received.
    #[must_use]
    pub fn count(&self, operation: VcsOperation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Returns the branch currently checked out.
    #[must_use]
    pub fn checked_out(&self) -> BranchName {
        self.lock().checked_out.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VcsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pass_gate(&self, operation: VcsOperation) {
        let gate = self.lock().gates.get(&operation).cloned();
        if let Some(held) = gate {
            held.pass().await;
        }
    }

    fn record(&self, call: VcsCall) -> Result<std::sync::MutexGuard<'_, VcsState>, GitError> {
        let operation = call.operation();
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing.contains(&operation) {
            return Err(GitError::command_failed(
                format!("{operation:?}"),
                "injected failure",
            ));
        }
        Ok(state)
    }
}

#[async_trait]
impl VersionControl for InMemoryVersionControl {
    async fn current_branch(&self) -> Result<BranchName, GitError> {
        self.pass_gate(VcsOperation::CurrentBranch).await;
        let state = self.record(VcsCall::CurrentBranch)?;
        Ok(state.checked_out.clone())
    }

    async fn default_branch(&self) -> Result<BranchName, GitError> {
        self.pass_gate(VcsOperation::DefaultBranch).await;
        let state = self.record(VcsCall::DefaultBranch)?;
        Ok(state.default_branch.clone())
    }

    async fn create_branch(&self, name: &BranchName, base: &BranchName) -> Result<(), GitError> {
        self.pass_gate(VcsOperation::CreateBranch).await;
        let mut state = self.record(VcsCall::CreateBranch {
            name: name.clone(),
            base: base.clone(),
        })?;
        state.checked_out = name.clone();
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.pass_gate(VcsOperation::Commit).await;
        self.record(VcsCall::Commit(message.to_owned()))?;
        Ok(())
    }

    async fn push(&self, name: &BranchName) -> Result<(), GitError> {
        self.pass_gate(VcsOperation::Push).await;
        self.record(VcsCall::Push(name.clone()))?;
        Ok(())
    }

    async fn open_review_request(&self, request: &ReviewRequest) -> Result<String, GitError> {
        self.pass_gate(VcsOperation::OpenReviewRequest).await;
        let state = self.record(VcsCall::OpenReviewRequest(request.clone()))?;
        let number = state
            .calls
            .iter()
            .filter(|call| call.operation() == VcsOperation::OpenReviewRequest)
            .count();
        Ok(format!("{}/{number}", state.review_base_url))
    }

    async fn checkout(&self, name: &BranchName) -> Result<(), GitError> {
        self.pass_gate(VcsOperation::Checkout).await;
        let mut state = self.record(VcsCall::Checkout(name.clone()))?;
        state.checked_out = name.clone();
        Ok(())
    }
}
