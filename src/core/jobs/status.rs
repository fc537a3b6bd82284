use hashlink::LinkedHashMap;
use std::fmt;
use strum::EnumString;

/// Default accounting fields for human readable job information
pub const DEFAULT_INFO_FORMAT: [&str; 6] = [
  "jobid%15",
  "jobname%30",
  "partition",
  "state",
  "elapsed",
  "MaxRss",
];

/// Fields used when only the state of each task matters
pub const STATUS_FORMAT: [&str; 2] = ["jobid", "state"];

/// State of a job (or array task) as reported by the accounting tool
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
  Timeout,
  OutOfMemory,
  NodeFail,
  Preempted,
  Suspended,
  Requeued,
  #[strum(default)]
  Other(String),
}

impl JobState {
  /// Parse the state column. Suffixes such as `+` in `CANCELLED+` are ignored.
  pub fn parse(raw: &str) -> JobState {
    let trimmed = raw.trim_end_matches('+');
    trimmed
      .parse()
      .unwrap_or_else(|_| JobState::Other(raw.to_string()))
  }

  pub fn as_str(&self) -> &str {
    match self {
      JobState::Pending => "PENDING",
      JobState::Running => "RUNNING",
      JobState::Completed => "COMPLETED",
      JobState::Failed => "FAILED",
      JobState::Cancelled => "CANCELLED",
      JobState::Timeout => "TIMEOUT",
      JobState::OutOfMemory => "OUT_OF_MEMORY",
      JobState::NodeFail => "NODE_FAIL",
      JobState::Preempted => "PREEMPTED",
      JobState::Suspended => "SUSPENDED",
      JobState::Requeued => "REQUEUED",
      JobState::Other(raw) => raw,
    }
  }

  /// True while the scheduler may still run the job
  pub fn is_active(&self) -> bool {
    matches!(self, JobState::Pending | JobState::Running)
  }
}

impl fmt::Display for JobState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One accounting row: the requested fields in order, plus the parsed state
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRow {
  pub fields: Vec<String>,
  pub state: JobState,
}

impl StatusRow {
  pub fn job_id(&self) -> Option<&str> {
    self.fields.first().map(String::as_str)
  }
}

/// Rows reported for a single job handle. Array jobs yield one row per task.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobStatuses {
  rows: Vec<StatusRow>,
}

impl JobStatuses {
  pub fn new(rows: Vec<StatusRow>) -> Self {
    JobStatuses { rows }
  }

  pub fn rows(&self) -> &[StatusRow] {
    &self.rows
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn any(&self, state: &JobState) -> bool {
    self.rows.iter().any(|row| &row.state == state)
  }

  /// Vacuously true when there are no rows. Check [`JobStatuses::is_empty`]
  /// before relying on it.
  pub fn all(&self, state: &JobState) -> bool {
    self.rows.iter().all(|row| &row.state == state)
  }

  pub fn any_active(&self) -> bool {
    self.rows.iter().any(|row| row.state.is_active())
  }

  pub fn states(&self) -> Vec<JobState> {
    self.rows.iter().map(|row| row.state.clone()).collect()
  }

  /// Count of rows per state, in order of first appearance
  pub fn summary(&self) -> LinkedHashMap<JobState, usize> {
    let mut counts = LinkedHashMap::new();
    for row in &self.rows {
      // `entry` would move an existing key to the back
      if let Some(count) = counts.get_mut(&row.state) {
        *count += 1;
      } else {
        counts.insert(row.state.clone(), 1);
      }
    }
    counts
  }
}

/// Index of the state column among the requested accounting fields
pub fn state_column(fields: &[&str]) -> Option<usize> {
  fields.iter().position(|field| {
    let name = field.split('%').next().unwrap_or(field);
    name.eq_ignore_ascii_case("state")
  })
}

/// Parse header-less accounting output into status rows.
/// Rows whose first field contains `+` (heterogeneous job components) are skipped.
pub fn parse_status_rows(output: &str, fields: &[&str]) -> JobStatuses {
  let state_index = state_column(fields);
  let rows = output
    .lines()
    .filter_map(|line| {
      let columns: Vec<String> = line.split_whitespace().map(str::to_string).collect();
      let first = columns.first()?;
      if first.contains('+') {
        return None;
      }
      let state = match state_index.and_then(|i| columns.get(i)) {
        Some(raw) => JobState::parse(raw),
        None => JobState::Other(String::new()),
      };
      Some(StatusRow {
        fields: columns,
        state,
      })
    })
    .collect();
  JobStatuses::new(rows)
}
