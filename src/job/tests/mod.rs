//! Unit tests for the job lifecycle.
