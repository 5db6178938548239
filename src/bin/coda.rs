//! Operator command line for the job engine.
//!
//! Usage:
//!
//! ```text
//! coda run <repo> <task...> [--dry-run] [--skip-tests] [--base <branch>] [--skill <name>=<file>]
//! coda list [--status <status>] [--repo <repo>]
//! coda show <job-id>
//! coda cancel <job-id>
//! coda retry <job-id>
//! coda config
//! ```
//!
//! `run` and `retry` wait for the execution to finish and exit non-zero when
//! the job fails. Configuration comes from `.env` and the process
//! environment; see [`coda::config::RunnerConfig`].

use std::io::{self, Write};
use std::sync::Arc;

use camino::Utf8PathBuf;
use coda::config::{self, ConfigError, ConfigHandle, RunnerConfig};
use coda::job::{
    adapters::{sqlite::SqliteJobRepository, system::SystemPipelineFactory},
    domain::{Job, JobDomainError, JobId, JobStatus, ParseJobStatusError},
    ports::{JobRepositoryError, NotifyError},
    services::{CreateJobRequest, ExecutionOutcome, JobService, JobServiceError},
};
use mockable::DefaultClock;
use thiserror::Error;
use tokio::runtime::Builder;
use tokio::task::JoinHandle;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Service = JobService<SqliteJobRepository, SystemPipelineFactory, DefaultClock>;

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] JobRepositoryError),
    #[error(transparent)]
    Notifier(#[from] NotifyError),
    #[error(transparent)]
    Service(#[from] JobServiceError),
    #[error(transparent)]
    Domain(#[from] JobDomainError),
    #[error(transparent)]
    Status(#[from] ParseJobStatusError),
    #[error("failed to read skill file {path}: {source}")]
    SkillFile {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("job execution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("job {0} failed")]
    JobFailed(JobId),
    #[error("job {0} was cancelled")]
    JobCancelled(JobId),
}

#[derive(Debug)]
enum Command {
    Run(CreateJobRequest),
    List {
        status: Option<JobStatus>,
        repo: Option<String>,
    },
    Show(JobId),
    Cancel(JobId),
    Retry(JobId),
    Config,
}

const USAGE: &str = "usage: coda <run|list|show|cancel|retry|config> [arguments]";

fn main() -> Result<(), BoxError> {
    config::load_dotenv();
    coda::telemetry::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;
    let runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(command)).map_err(Into::into)
}

fn parse_command(args: &[String]) -> Result<Command, CliError> {
    let (name, rest) = args
        .split_first()
        .ok_or_else(|| CliError::InvalidArgs(USAGE.to_owned()))?;
    match name.as_str() {
        "run" => parse_run(rest).map(Command::Run),
        "list" => parse_list(rest),
        "show" => single_id(rest).map(Command::Show),
        "cancel" => single_id(rest).map(Command::Cancel),
        "retry" => single_id(rest).map(Command::Retry),
        "config" => Ok(Command::Config),
        other => Err(CliError::InvalidArgs(format!(
            "unknown command '{other}'; {USAGE}"
        ))),
    }
}

fn parse_run(args: &[String]) -> Result<CreateJobRequest, CliError> {
    let mut positional = Vec::new();
    let mut dry_run = false;
    let mut skip_tests = None;
    let mut base = None;
    let mut skills = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "--skip-tests" => skip_tests = Some(true),
            "--base" => base = Some(flag_value(&mut iter, "--base")?),
            "--skill" => skills.push(read_skill(&flag_value(&mut iter, "--skill")?)?),
            _ => positional.push(arg.as_str()),
        }
    }

    let (repo, task) = positional
        .split_first()
        .ok_or_else(|| CliError::InvalidArgs("run needs <repo> <task...>".to_owned()))?;
    let mut request = CreateJobRequest::new(task.join(" "), *repo).with_dry_run(dry_run);
    if let Some(skip) = skip_tests {
        request = request.with_skip_tests(skip);
    }
    if let Some(branch) = base {
        request = request.with_base_branch(branch);
    }
    for (name, content) in skills {
        request = request.with_skill(name, content);
    }
    Ok(request)
}

fn parse_list(args: &[String]) -> Result<Command, CliError> {
    let mut status = None;
    let mut repo = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--status" => {
                let raw = flag_value(&mut iter, "--status")?;
                status = Some(JobStatus::try_from(raw.as_str())?);
            }
            "--repo" => repo = Some(flag_value(&mut iter, "--repo")?),
            other => {
                return Err(CliError::InvalidArgs(format!(
                    "unexpected list argument '{other}'"
                )));
            }
        }
    }
    Ok(Command::List { status, repo })
}

fn flag_value<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> Result<String, CliError> {
    iter.next()
        .cloned()
        .ok_or_else(|| CliError::InvalidArgs(format!("{flag} needs a value")))
}

fn read_skill(argument: &str) -> Result<(String, String), CliError> {
    let (name, raw_path) = argument
        .split_once('=')
        .ok_or_else(|| CliError::InvalidArgs(format!("--skill expects <name>=<file>, got '{argument}'")))?;
    let path = Utf8PathBuf::from(raw_path);
    let content = std::fs::read_to_string(&path).map_err(|source| CliError::SkillFile {
        path: path.clone(),
        source,
    })?;
    Ok((name.to_owned(), content))
}

fn single_id(args: &[String]) -> Result<JobId, CliError> {
    match args {
        [id] => Ok(JobId::parse(id)?),
        _ => Err(CliError::InvalidArgs("expected exactly one job id".to_owned())),
    }
}

fn build_service(config: RunnerConfig) -> Result<Service, CliError> {
    let repository = SqliteJobRepository::open(&config.database_path)?;
    let factory = SystemPipelineFactory::new()?;
    Ok(JobService::new(
        Arc::new(repository),
        Arc::new(factory),
        ConfigHandle::new(config),
        Arc::new(DefaultClock),
    ))
}

async fn run(command: Command) -> Result<(), CliError> {
    let config = RunnerConfig::from_env()?;
    let mut stdout = io::stdout().lock();

    if matches!(command, Command::Config) {
        writeln!(
            stdout,
            "{}",
            serde_json::to_string_pretty(&config.summary())?
        )?;
        return Ok(());
    }

    let service = build_service(config)?;
    match command {
        Command::Run(request) => {
            let (job, handle) = service.submit(request).await?;
            writeln!(stdout, "job {} started on branch {}", job.id(), job.branch())?;
            await_outcome(&mut stdout, handle).await
        }
        Command::Retry(id) => {
            let (job, handle) = service.resubmit(id).await?;
            writeln!(stdout, "job {} re-queued (retry {})", job.id(), job.retry_count())?;
            await_outcome(&mut stdout, handle).await
        }
        Command::List { status, repo } => {
            let jobs = match (status, repo) {
                (Some(status), _) => service.list_jobs_by_status(status).await?,
                (None, Some(repo)) => service.list_jobs_by_repo(&repo).await?,
                (None, None) => service.list_jobs().await?,
            };
            for job in &jobs {
                write_summary_line(&mut stdout, job)?;
            }
            Ok(())
        }
        Command::Show(id) => {
            let job = service.get_job(id).await?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&job)?)?;
            Ok(())
        }
        Command::Cancel(id) => {
            let job = service.cancel_job(id).await?;
            write_summary_line(&mut stdout, &job)?;
            Ok(())
        }
        Command::Config => Ok(()),
    }
}

async fn await_outcome(
    stdout: &mut impl Write,
    handle: JoinHandle<ExecutionOutcome>,
) -> Result<(), CliError> {
    match handle.await? {
        ExecutionOutcome::Completed(job) => {
            writeln!(stdout, "{}", serde_json::to_string_pretty(&job)?)?;
            Ok(())
        }
        ExecutionOutcome::Failed(job) => {
            writeln!(stdout, "{}", serde_json::to_string_pretty(&job)?)?;
            Err(CliError::JobFailed(job.id()))
        }
        ExecutionOutcome::Cancelled(id) => Err(CliError::JobCancelled(id)),
        ExecutionOutcome::Skipped(id) => {
            writeln!(stdout, "job {id} was not run")?;
            Ok(())
        }
    }
}

fn write_summary_line(stdout: &mut impl Write, job: &Job) -> io::Result<()> {
    writeln!(
        stdout,
        "{}  {}  {}  {}",
        job.id(),
        job.status().metadata(),
        job.repo(),
        job.task()
    )
}
