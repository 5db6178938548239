//! Port contracts for the job lifecycle.
//!
//! Ports define infrastructure-agnostic interfaces used by the executor and
//! the job service.

pub mod generator;
pub mod notifier;
pub mod pipeline;
pub mod repository;
pub mod version_control;
pub mod workspace;

pub use generator::{CodeGenerator, ProviderError};
pub use notifier::{JobNotifier, NotifyError, StatusUpdate};
pub use pipeline::{Pipeline, PipelineFactory};
pub use repository::{ExpectedState, JobRepository, JobRepositoryError, JobRepositoryResult};
pub use version_control::{GitError, ReviewRequest, VersionControl};
pub use workspace::{PatchApplyError, TestReport, Workspace};

#[cfg(test)]
pub use generator::MockCodeGenerator;
#[cfg(test)]
pub use notifier::MockJobNotifier;
#[cfg(test)]
pub use repository::MockJobRepository;
#[cfg(test)]
pub use version_control::MockVersionControl;
#[cfg(test)]
pub use workspace::MockWorkspace;
