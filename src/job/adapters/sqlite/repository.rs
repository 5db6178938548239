//! `SQLite` repository implementation for job storage.

use super::{
    models::{JobRow, LogAppendRow},
    schema::jobs,
};
use crate::job::{
    domain::{
        BranchName, Job, JobId, JobStatus, PersistedJobData, RepositoryPath, SkillContext,
        TaskDescription,
    },
    ports::{ExpectedState, JobRepository, JobRepositoryError, JobRepositoryResult},
};
use async_trait::async_trait;
use camino::Utf8Path;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::BigInt;
use diesel::sqlite::SqliteConnection;
use std::time::Duration;

/// `SQLite` connection pool type used by job adapters.
pub type JobSqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const SCHEMA_SQL: &str = include_str!("../../../../migrations/2026-10-01-000000_create_jobs/up.sql");
const DEFAULT_POOL_SIZE: u32 = 8;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Secondary lookup applied to a listing.
enum ListFilter {
    All,
    Status(String),
    Repo(String),
}

/// Per-connection settings for concurrent writers.
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, connection: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let statements = format!(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = {}; PRAGMA synchronous = NORMAL;",
            self.busy_timeout.as_millis()
        );
        connection
            .batch_execute(&statements)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// `SQLite`-backed job repository.
#[derive(Debug, Clone)]
pub struct SqliteJobRepository {
    pool: JobSqlitePool,
}

impl SqliteJobRepository {
    /// Creates a new repository from an existing pool.
    ///
    /// The caller is responsible for the schema; see
    /// [`SqliteJobRepository::open`].
    #[must_use]
    pub const fn new(pool: JobSqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating when missing) the database at `path` and applies the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::Persistence`] when the directory, pool
    /// or schema cannot be set up.
    pub fn open(path: &Utf8Path) -> JobRepositoryResult<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(JobRepositoryError::persistence)?;
        }

        let pool = Pool::builder()
            .max_size(DEFAULT_POOL_SIZE)
            .connection_customizer(Box::new(SqlitePragmas {
                busy_timeout: DEFAULT_BUSY_TIMEOUT,
            }))
            .build(ConnectionManager::<SqliteConnection>::new(path.as_str()))
            .map_err(JobRepositoryError::persistence)?;

        let repository = Self::new(pool);
        repository.migrate()?;
        tracing::debug!(path = %path, "job database ready");
        Ok(repository)
    }

    /// Applies the schema. Safe to run repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::Persistence`] when the statements fail.
    pub fn migrate(&self) -> JobRepositoryResult<()> {
        let mut connection = self.pool.get().map_err(JobRepositoryError::persistence)?;
        connection.batch_execute(SCHEMA_SQL)?;
        Ok(())
    }

    async fn run_blocking<F, T>(&self, f: F) -> JobRepositoryResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> JobRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(JobRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(JobRepositoryError::persistence)?
    }

    async fn list_filtered(&self, filter: ListFilter) -> JobRepositoryResult<Vec<Job>> {
        self.run_blocking(move |connection| {
            let mut query = jobs::table.select(JobRow::as_select()).into_boxed();
            match filter {
                ListFilter::All => {}
                ListFilter::Status(status) => query = query.filter(jobs::status.eq(status)),
                ListFilter::Repo(repo) => query = query.filter(jobs::repo.eq(repo)),
            }
            let rows = query
                .order(jobs::created_at.desc())
                .then_order_by(sql::<BigInt>("rowid").desc())
                .load::<JobRow>(connection)?;
            rows.into_iter().map(row_to_job).collect()
        })
        .await
    }

    async fn replace(&self, job: &Job, expected: Option<ExpectedState>) -> JobRepositoryResult<Job> {
        let incoming = job.clone();
        self.run_blocking(move |connection| {
            connection.immediate_transaction(|tx| {
                let stored = load_job(tx, incoming.id())?
                    .ok_or(JobRepositoryError::NotFound(incoming.id()))?;

                if let Some(guard) = expected.filter(|guard| !guard.matches(&stored)) {
                    return Err(JobRepositoryError::StatusConflict {
                        id: incoming.id(),
                        expected: guard.status,
                        actual: stored.status(),
                    });
                }

                let mut merged = incoming;
                merged.reconcile_logs_with(stored.logs());
                let row = to_row(&merged)?;
                diesel::update(jobs::table.find(row.id.clone()))
                    .set(&row)
                    .execute(tx)?;
                Ok(merged)
            })
        })
        .await
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create(&self, job: &Job) -> JobRepositoryResult<Job> {
        let job_id = job.id();
        let row = to_row(job)?;
        let created = job.clone();

        self.run_blocking(move |connection| {
            diesel::insert_into(jobs::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        JobRepositoryError::DuplicateJob(job_id)
                    }
                    _ => JobRepositoryError::persistence(err),
                })?;
            Ok(created)
        })
        .await
    }

    async fn find_by_id(&self, id: JobId) -> JobRepositoryResult<Option<Job>> {
        self.run_blocking(move |connection| load_job(connection, id))
            .await
    }

    async fn list(&self) -> JobRepositoryResult<Vec<Job>> {
        self.list_filtered(ListFilter::All).await
    }

    async fn list_by_status(&self, status: JobStatus) -> JobRepositoryResult<Vec<Job>> {
        self.list_filtered(ListFilter::Status(status.as_str().to_owned()))
            .await
    }

    async fn list_by_repo(&self, repo: &RepositoryPath) -> JobRepositoryResult<Vec<Job>> {
        self.list_filtered(ListFilter::Repo(repo.as_str().to_owned()))
            .await
    }

    async fn update(&self, job: &Job) -> JobRepositoryResult<Job> {
        self.replace(job, None).await
    }

    async fn update_guarded(&self, job: &Job, expected: ExpectedState) -> JobRepositoryResult<Job> {
        self.replace(job, Some(expected)).await
    }

    async fn append_log(
        &self,
        id: JobId,
        message: &str,
        at: DateTime<Utc>,
    ) -> JobRepositoryResult<Job> {
        let entry = message.to_owned();
        self.run_blocking(move |connection| {
            connection.immediate_transaction(|tx| {
                let mut job = load_job(tx, id)?.ok_or(JobRepositoryError::NotFound(id))?;
                job.append_log(&entry, at);

                let changes = LogAppendRow {
                    logs: serde_json::to_string(job.logs()).map_err(JobRepositoryError::persistence)?,
                    updated_at: format_timestamp(job.updated_at()),
                };
                diesel::update(jobs::table.find(id.to_string()))
                    .set(&changes)
                    .execute(tx)?;
                Ok(job)
            })
        })
        .await
    }

    async fn delete(&self, id: JobId) -> JobRepositoryResult<bool> {
        self.run_blocking(move |connection| {
            let removed = diesel::delete(jobs::table.find(id.to_string())).execute(connection)?;
            Ok(removed > 0)
        })
        .await
    }
}

impl From<DieselError> for JobRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

fn load_job(connection: &mut SqliteConnection, id: JobId) -> JobRepositoryResult<Option<Job>> {
    let row = jobs::table
        .find(id.to_string())
        .select(JobRow::as_select())
        .first::<JobRow>(connection)
        .optional()?;
    row.map(row_to_job).transpose()
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: &str) -> JobRepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| invalid(column, err))
}

fn invalid(column: &str, err: impl std::fmt::Display) -> JobRepositoryError {
    JobRepositoryError::InvalidPersistedData(format!("{column}: {err}"))
}

fn to_row(job: &Job) -> JobRepositoryResult<JobRow> {
    Ok(JobRow {
        id: job.id().to_string(),
        task: job.task().as_str().to_owned(),
        repo: job.repo().as_str().to_owned(),
        branch: job.branch().as_str().to_owned(),
        base_branch: job.base_branch().map(|branch| branch.as_str().to_owned()),
        status: job.status().as_str().to_owned(),
        pr_url: job.pr_url().map(str::to_owned),
        error: job.error().map(str::to_owned),
        logs: serde_json::to_string(job.logs()).map_err(JobRepositoryError::persistence)?,
        created_at: format_timestamp(job.created_at()),
        updated_at: format_timestamp(job.updated_at()),
        dry_run: job.dry_run(),
        skip_tests: job.skip_tests(),
        retry_count: i32::try_from(job.retry_count()).map_err(JobRepositoryError::persistence)?,
        skills: serde_json::to_string(job.skills()).map_err(JobRepositoryError::persistence)?,
    })
}

fn row_to_job(row: JobRow) -> JobRepositoryResult<Job> {
    let JobRow {
        id,
        task,
        repo,
        branch,
        base_branch,
        status,
        pr_url,
        error,
        logs,
        created_at,
        updated_at,
        dry_run,
        skip_tests,
        retry_count,
        skills,
    } = row;

    let data = PersistedJobData {
        id: JobId::parse(&id).map_err(|err| invalid("id", err))?,
        task: TaskDescription::new(task).map_err(|err| invalid("task", err))?,
        repo: RepositoryPath::new(repo).map_err(|err| invalid("repo", err))?,
        base_branch: base_branch
            .map(BranchName::new)
            .transpose()
            .map_err(|err| invalid("base_branch", err))?,
        branch: BranchName::new(branch).map_err(|err| invalid("branch", err))?,
        status: JobStatus::try_from(status.as_str()).map_err(|err| invalid("status", err))?,
        pr_url,
        error,
        logs: serde_json::from_str::<Vec<String>>(&logs).map_err(|err| invalid("logs", err))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        dry_run,
        skip_tests,
        retry_count: u32::try_from(retry_count).map_err(|err| invalid("retry_count", err))?,
        skills: serde_json::from_str::<Vec<SkillContext>>(&skills)
            .map_err(|err| invalid("skills", err))?,
    };
    Ok(Job::from_persisted(data))
}
