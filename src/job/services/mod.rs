//! Application services for job lifecycle orchestration.

pub mod conventions;
mod executor;
mod lifecycle;
mod retry;

pub use executor::{ExecutionOutcome, JobExecutor, StageError, TestFailure};
pub use lifecycle::{CreateJobRequest, JobService, JobServiceError, JobServiceResult};
pub use retry::RetryPolicy;
