//! Coda: a job lifecycle engine for automated code changes.
//!
//! A caller submits a task against a repository. The engine persists a job,
//! derives a branch for it, and drives it through generation, patching,
//! testing and review-request creation, recording progress in a durable job
//! log and notifying external channels along the way.
//!
//! # Architecture
//!
//! Coda follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (`SQLite`, git, shell,
//!   webhooks, in-memory doubles)
//!
//! # Modules
//!
//! - [`job`]: Job model, state machine, executor and service facade
//! - [`config`]: Runner configuration loaded from the environment
//! - [`telemetry`]: Tracing subscriber setup for binaries

pub mod config;
pub mod job;
pub mod telemetry;
