//! Fixtures for `SQLite` repository tests.

use camino::Utf8PathBuf;
use coda::job::{
    adapters::sqlite::SqliteJobRepository,
    domain::{BranchName, Job, NewJob, RepositoryPath, SkillContext, TaskDescription},
};
use mockable::DefaultClock;
use rstest::fixture;
use tempfile::TempDir;

/// A repository backed by a database file in a temporary directory.
pub struct Database {
    pub repository: SqliteJobRepository,
    pub path: Utf8PathBuf,
    _dir: TempDir,
}

#[fixture]
pub fn database() -> Database {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
    let path = root.join("state").join("jobs.db");
    let repository = SqliteJobRepository::open(&path).expect("database opens");
    Database {
        repository,
        path,
        _dir: dir,
    }
}

/// Builds a queued job for `repo` with a derived branch.
pub fn job_for(task: &str, repo: &str) -> Job {
    let description = TaskDescription::new(task).expect("valid task");
    Job::new(
        NewJob {
            branch: BranchName::derive_from_task(description.as_str()),
            task: description,
            repo: RepositoryPath::new(repo).expect("valid repo"),
            base_branch: Some(BranchName::new("develop").expect("valid branch")),
            dry_run: true,
            skip_tests: false,
            skills: vec![SkillContext::new("rust-style", "Prefer iterators").expect("valid skill")],
        },
        &DefaultClock,
    )
}
