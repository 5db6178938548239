//! Diesel row models for job persistence.

use super::schema::jobs;
use diesel::prelude::*;

/// Stored job row, used for reads, inserts and full-record updates.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct JobRow {
    /// Hyphenated job UUID.
    pub id: String,
    /// Task description.
    pub task: String,
    /// Target repository path.
    pub repo: String,
    /// Job branch.
    pub branch: String,
    /// Explicit base branch.
    pub base_branch: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// Review-request URL.
    pub pr_url: Option<String>,
    /// Last failure message.
    pub error: Option<String>,
    /// JSON array of log entries.
    pub logs: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 latest mutation timestamp.
    pub updated_at: String,
    /// Dry-run flag.
    pub dry_run: bool,
    /// Skip-tests flag.
    pub skip_tests: bool,
    /// Retries consumed.
    pub retry_count: i32,
    /// JSON array of skills.
    pub skills: String,
}

/// Columns touched when appending a log entry.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = jobs)]
pub struct LogAppendRow {
    /// JSON array of log entries.
    pub logs: String,
    /// RFC 3339 latest mutation timestamp.
    pub updated_at: String,
}
