pub mod descriptor;
pub mod script;
pub mod slurm;
pub mod status;
pub mod utils;
pub mod wait;


use log::{info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::core::jobs::{
  descriptor::{Dependency, DependencyKind, JobDescriptor},
  script::{Directive, job_directives},
  status::{JobStatuses, STATUS_FORMAT, parse_status_rows},
};

/// Seam over the external batch scheduler tools. Every method returns the
/// raw text printed by the tool.
pub trait Scheduler {
  /// Submit a script file (`sbatch <script>`)
  fn submit(&self, script: &Path) -> Result<String, JobError>;
  /// Submit commands without a script file (`sbatch <flags> --wrap <command>`)
  fn wrap(&self, flags: &[String], command: &str) -> Result<String, JobError>;
  /// Accounting rows for a job (`sacct -j <id> --format <fields>`)
  fn accounting(&self, job_id: &str, fields: &[&str], header: bool) -> Result<String, JobError>;
  /// Live queue listing (`squeue`)
  fn queue(&self) -> Result<String, JobError>;
  /// Block until the queue has room for more submissions
  fn throttle(&self) -> Result<(), JobError> {
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum JobError {
  #[error("Job name not set")]
  MissingName,
  #[error("Job '{0}' has no command")]
  MissingCommand(String),
  #[error("Invalid Time Format: {0}")]
  InvalidTimeFormat(String),
  #[error("Invalid array: {0}")]
  InvalidArray(String),
  #[error("Invalid value for {0}: control characters are not allowed")]
  InvalidValue(String),
  #[error("No email address to notify")]
  MissingEmail,
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Job Spawn: {0}")]
  SpawnError(String),
  #[error("Job Execution: {0}")]
  ExecutionFailed(String),
}

/// Identifier assigned by the scheduler on submission
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
  pub fn new(id: impl Into<String>) -> Self {
    JobHandle(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for JobHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Extract the job identifier from a `Submitted batch job <id>` acknowledgment
pub fn parse_submission(output: &str) -> Option<JobHandle> {
  let mut tokens = output.split_whitespace();
  if tokens.next()? != "Submitted" {
    return None;
  }
  tokens.last().map(JobHandle::new)
}

/// Submit a rendered script. Returns `None` when the script does not exist or
/// the scheduler does not acknowledge the submission.
pub fn submit_script(
  scheduler: &dyn Scheduler,
  script: &Path,
) -> Result<Option<JobHandle>, JobError> {
  if !script.exists() {
    warn!("{} not found", script.display());
    return Ok(None);
  }
  let output = scheduler.submit(script)?;
  info!("{}", output.trim());

  let handle = parse_submission(&output);
  if handle.is_none() {
    warn!("Submission of {} was not acknowledged", script.display());
  }
  Ok(handle)
}

/// Submit the commands of `job` directly with `--wrap`, without a script file.
/// Array specifications are not supported by this path and are ignored.
pub fn wrap_job(
  scheduler: &dyn Scheduler,
  job: &JobDescriptor,
) -> Result<Option<JobHandle>, JobError> {
  if job.array().is_some() {
    warn!("Ignoring array of job '{}' for a wrapped submission", job.name());
  }

  let mut directives = job_directives(job);
  if let Some(dir) = job.output_directory() {
    if !dir.exists() {
      fs::create_dir_all(dir)?;
    }
    directives.push(Directive {
      key: "output".to_string(),
      value: format!("{}/%x-%j.out", dir.display()),
    });
    directives.push(Directive {
      key: "error".to_string(),
      value: format!("{}/%x-%j.err", dir.display()),
    });
  }
  let flags: Vec<String> = directives.iter().map(Directive::flag).collect();

  let output = scheduler.wrap(&flags, &job.command().join("\n"))?;
  info!("{}", output.trim());
  Ok(parse_submission(&output))
}

/// Submit a job that mails `email` once `handle` ends, whatever its outcome
pub fn notify(
  scheduler: &dyn Scheduler,
  handle: &JobHandle,
  email: Option<&str>,
  account: Option<&str>,
) -> Result<Option<JobHandle>, JobError> {
  let email = email.ok_or(JobError::MissingEmail)?;
  let mut builder = JobDescriptor::builder()
    .name("notify")
    .command("echo done")
    .email(email)
    .dependency(Dependency::new(handle.as_str(), DependencyKind::Any));
  if let Some(account) = account {
    builder = builder.account(account);
  }
  wrap_job(scheduler, &builder.build()?)
}

/// Query the state of every row of `handle`
pub fn job_statuses(
  scheduler: &dyn Scheduler,
  handle: &JobHandle,
) -> Result<JobStatuses, JobError> {
  job_rows(scheduler, handle, &STATUS_FORMAT)
}

/// Query `fields` for `handle`, classifying each row by its `state` column
pub fn job_rows(
  scheduler: &dyn Scheduler,
  handle: &JobHandle,
  fields: &[&str],
) -> Result<JobStatuses, JobError> {
  let output = scheduler.accounting(handle.as_str(), fields, false)?;
  Ok(parse_status_rows(&output, fields))
}

/// Raw accounting table for `handle`, with header
pub fn job_info(
  scheduler: &dyn Scheduler,
  handle: &JobHandle,
  fields: &[&str],
) -> Result<String, JobError> {
  scheduler.accounting(handle.as_str(), fields, true)
}

/// Output and error files written by `handle`, optionally restricted to one extension
pub fn output_files(
  job: &JobDescriptor,
  handle: &JobHandle,
  extension: Option<&str>,
) -> Result<Vec<PathBuf>, JobError> {
  let (dir, prefix) = match job.output_directory() {
    Some(dir) => (dir.to_path_buf(), format!("{}-{}", job.name(), handle)),
    None => (PathBuf::from("."), format!("slurm-{}", handle)),
  };
  if !dir.is_dir() {
    return Ok(Vec::new());
  }

  let mut files = Vec::new();
  for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
    let entry = entry.map_err(|e| JobError::IoError(e.into()))?;
    let name = entry.file_name().to_string_lossy();
    if !entry.file_type().is_file() || !name.starts_with(&prefix) || !name.contains('.') {
      continue;
    }
    if let Some(ext) = extension {
      if !name.ends_with(&format!(".{}", ext)) {
        continue;
      }
    }
    files.push(entry.path().to_path_buf());
  }
  files.sort();
  Ok(files)
}
