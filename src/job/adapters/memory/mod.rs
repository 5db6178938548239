//! In-memory adapters for every job port.
//!
//! Used by tests and by local deterministic flows that must not touch a
//! repository, a network or a database.

mod gate;
mod generator;
mod notifier;
mod pipeline;
mod repository;
mod version_control;
mod workspace;

pub use gate::StageGate;
pub use generator::ScriptedGenerator;
pub use notifier::RecordingNotifier;
pub use pipeline::StaticPipelineFactory;
pub use repository::InMemoryJobRepository;
pub use version_control::{InMemoryVersionControl, VcsCall, VcsOperation};
pub use workspace::InMemoryWorkspace;
