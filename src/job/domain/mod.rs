//! Domain model for the job lifecycle.
//!
//! The job domain models a unit of automated code-change work: its validated
//! inputs, its derived branch, the status state machine it moves through, and
//! the patches and guardrails involved in generation. All infrastructure
//! concerns stay outside of this boundary.

mod branch;
mod error;
mod generation;
mod ids;
mod job;
mod patch;
mod skill;
mod status;

pub use branch::{BranchName, MAX_DERIVED_BRANCH_LENGTH};
pub use error::{JobDomainError, ParseJobStatusError, ParseProviderKindError};
pub use generation::{
    GenerationRequest, GenerationResult, GuardrailError, Guardrails, ProviderKind,
    ResponseParseError,
};
pub use ids::{JobId, RepositoryPath, TaskDescription};
pub use job::{Job, NewJob, PersistedJobData, format_log_entry, reconcile_logs};
pub use patch::{CodePatch, PatchOperation, PatchPath};
pub use skill::SkillContext;
pub use status::{JobStatus, StatusMetadata};
