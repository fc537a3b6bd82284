use chrono::{NaiveTime, Timelike};
use std::path::Path;

use crate::core::jobs::JobError;

/// Parse time string in format "HH:MM:SS" or "D-HH:MM:SS" to seconds
/// Matches the wall-clock formats accepted by `sbatch --time`
pub fn parse_time_to_seconds(time_str: &str) -> Result<u64, JobError> {
  // Split possible "D-" prefix
  let (days, time_part) = if let Some((d, t)) = time_str.split_once('-') {
    let days: u64 = d
      .parse()
      .map_err(|_| JobError::InvalidTimeFormat(time_str.to_string()))?;
    (days, t)
  } else {
    (0, time_str)
  };

  let time = NaiveTime::parse_from_str(time_part, "%H:%M:%S")
    .map_err(|_| JobError::InvalidTimeFormat(time_str.to_string()))?;

  Ok(days * 86_400 + time.num_seconds_from_midnight() as u64)
}

/// Quote a word for a bash array literal. Plain words are left untouched.
pub fn shell_quote(s: &str) -> String {
  let plain = !s.is_empty()
    && s
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
  if plain {
    s.to_string()
  } else {
    format!("'{}'", s.replace('\'', "'\\''"))
  }
}

/// True if any line references `$var` or `${var}` as a whole identifier
pub fn references_variable(lines: &[String], var: &str) -> bool {
  let braced = format!("${{{}}}", var);
  let bare = format!("${}", var);
  lines.iter().any(|line| {
    if line.contains(&braced) {
      return true;
    }
    line.match_indices(&bare).any(|(pos, m)| {
      line[pos + m.len()..]
        .chars()
        .next()
        .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'))
    })
  })
}

/// Make a script file executable (Unix only)
#[cfg(unix)]
pub fn make_script_executable(script_path: &Path) -> Result<(), JobError> {
  use std::os::unix::fs::PermissionsExt;
  let metadata = std::fs::metadata(script_path)?;
  let mut perms = metadata.permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(script_path, perms)?;
  Ok(())
}

#[cfg(not(unix))]
pub fn make_script_executable(_script_path: &Path) -> Result<(), JobError> {
  Ok(())
}
