use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

use crate::core::jobs::{
  JobError, JobHandle, Scheduler, job_statuses,
  status::{JobState, StatusRow},
};

/// Default pause between two accounting queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Marker printed by the queue listing when a node request cannot be satisfied
pub const DEFAULT_UNAVAILABLE_MARKER: &str = "ReqNodeNotAvail";

/// How a waited-on job settled
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
  /// Every row reported COMPLETED
  Completed,
  /// At least one row reported FAILED; all rows are returned
  Failed(Vec<StatusRow>),
  /// Settled in some other state mix. Empty when the accounting tool had no rows.
  Unknown(Vec<JobState>),
  /// The queue reported that the resource request cannot be satisfied
  Unsatisfiable(String),
}

impl WaitOutcome {
  pub fn is_completed(&self) -> bool {
    matches!(self, WaitOutcome::Completed)
  }
}

#[derive(Debug, Clone)]
pub struct WaitOptions {
  pub interval: Duration,
  pub unavailable_marker: String,
}

impl Default for WaitOptions {
  fn default() -> Self {
    WaitOptions {
      interval: DEFAULT_POLL_INTERVAL,
      unavailable_marker: DEFAULT_UNAVAILABLE_MARKER.to_string(),
    }
  }
}

/// Block until no row of `handle` is PENDING or RUNNING.
/// Polls at a fixed interval with no ceiling.
pub fn wait_until_complete(
  scheduler: &dyn Scheduler,
  handle: &JobHandle,
  options: &WaitOptions,
) -> Result<WaitOutcome, JobError> {
  info!("Waiting for job {}", handle);
  thread::sleep(options.interval);

  loop {
    let statuses = job_statuses(scheduler, handle)?;

    if !statuses.any_active() {
      if statuses.is_empty() {
        warn!("No accounting rows for job {}", handle);
        return Ok(WaitOutcome::Unknown(Vec::new()));
      }
      if statuses.all(&JobState::Completed) {
        info!("Job {} complete", handle);
        return Ok(WaitOutcome::Completed);
      }
      if statuses.any(&JobState::Failed) {
        warn!("Job {} failed", handle);
        return Ok(WaitOutcome::Failed(statuses.rows().to_vec()));
      }
      warn!("Job {} settled in states {:?}", handle, statuses.states());
      return Ok(WaitOutcome::Unknown(statuses.states()));
    }

    if statuses.any(&JobState::Pending) {
      if let Some(line) = find_unavailable(scheduler, handle, &options.unavailable_marker)? {
        warn!("Resources for job {} cannot be satisfied: {}", handle, line);
        return Ok(WaitOutcome::Unsatisfiable(line));
      }
    }

    debug!("Job {} still active: {:?}", handle, statuses.summary());
    thread::sleep(options.interval);
  }
}

/// Scan the live queue for a line of `handle` (or one of its array tasks)
/// that carries `marker`
pub fn find_unavailable(
  scheduler: &dyn Scheduler,
  handle: &JobHandle,
  marker: &str,
) -> Result<Option<String>, JobError> {
  let queue = scheduler.queue()?;
  let task_prefix = format!("{}_", handle);
  Ok(
    queue
      .lines()
      .find(|line| {
        let names_job = line
          .split_whitespace()
          .next()
          .is_some_and(|id| id == handle.as_str() || id.starts_with(&task_prefix));
        names_job && line.contains(marker)
      })
      .map(|line| line.trim().to_string()),
  )
}
