//! Job lifecycle engine.
//!
//! A job turns a natural-language task into a code change against a
//! repository: content is generated, validated against guardrails, applied on
//! a derived branch, optionally tested, and offered as a review request. The
//! module follows hexagonal architecture:
//!
//! - Domain types and the status state machine in [`domain`]
//! - Port contracts for storage and every pipeline collaborator in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The executor and the job service facade in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
