//! `SQLite` adapters for job persistence.

mod models;
mod repository;
mod schema;

pub use repository::{JobSqlitePool, SqliteJobRepository};
