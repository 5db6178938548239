//! Adapter implementations for job ports.

pub mod filesystem;
pub mod git;
pub mod memory;
pub mod process;
pub mod process_generator;
pub mod sqlite;
pub mod system;
pub mod webhook;
