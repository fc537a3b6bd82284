use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::bids::{BidsError, entities::{BidsMap, Datatype}};
use crate::core::jobs::utils::shell_quote;

static SUBJECT_PATTERN: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(.*)_([0-9]{8})(.*)").expect("valid subject pattern"));
static SERIES_PATTERN: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^.*Series_([0-9]*)_(.*)$").expect("valid series pattern"));
static NON_ALPHANUMERIC: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"[^0-9a-zA-Z]+").expect("valid label pattern"));

/// True if a directory name looks like `<subject>_<YYYYMMDD>...`
pub fn is_subject_dir_name(name: &str) -> bool {
  SUBJECT_PATTERN.is_match(name)
}

/// Subject label of a `<subject>_<YYYYMMDD>_<time>` directory, with
/// non-alphanumeric characters removed
pub fn subject_name(subject_dir: &Path) -> Option<String> {
  let base = subject_dir.file_name()?.to_str()?;
  let captures = SUBJECT_PATTERN.captures(base)?;
  let name = NON_ALPHANUMERIC.replace_all(captures.get(1)?.as_str(), "");
  Some(name.into_owned())
}

/// Series number and description of a `Series_<n>_<description>` directory
pub fn parse_series_dir(name: &str) -> Option<(u32, String)> {
  let captures = SERIES_PATTERN.captures(name)?;
  let run = captures.get(1)?.as_str().parse().ok()?;
  Some((run, captures.get(2)?.as_str().to_string()))
}

/// Commands setting `key` to `value` in a JSON sidecar with jq
pub fn fix_json_command(file: &Path, key: &str, value: &str) -> String {
  let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
  let filter = shell_quote(&format!(".{}=\"{}\"", key, escaped));
  let file = file.display();
  format!(
    "jq {} \"{}\" > \"{}.tmp\"\nmv \"{}.tmp\" \"{}\"\n",
    filter, file, file, file, file
  )
}

/// Loop renaming `*dwi.bval`/`*dwi.bvec` files to the `*.bval`/`*.bvec` names
pub fn fix_dwi_command(dir: &Path) -> String {
  format!(
    "for x in \"{}\"/*dwi.bv*\ndo mv \"$x\" \"${{x//dwi.}}\"\ndone\n",
    dir.display()
  )
}

/// Output directory of a series, `<bids>/sub-<s>[/ses-<ses>]/<datatype>`
pub fn series_output_dir(
  bids_dir: &Path,
  subject: &str,
  session: Option<&str>,
  datatype: Datatype,
) -> PathBuf {
  let mut dir = bids_dir.join(format!("sub-{}", subject));
  if let Some(session) = session {
    dir = dir.join(format!("ses-{}", session));
  }
  dir.join(datatype.to_string())
}

/// Build the conversion commands for one subject directory. Output
/// directories are created as a side effect; unmapped series are skipped.
pub fn subject_command(
  subject_dir: &Path,
  bids_dir: &Path,
  map: &BidsMap,
  dcm2niix_flags: &str,
) -> Result<String, BidsError> {
  let subject =
    subject_name(subject_dir).ok_or_else(|| BidsError::InvalidSubjectDir(subject_dir.to_path_buf()))?;

  let mut series_dirs: Vec<PathBuf> = fs::read_dir(subject_dir)?
    .filter_map(|entry| entry.ok())
    .map(|entry| entry.path())
    .filter(|path| path.is_dir())
    .collect();
  series_dirs.sort();

  let mut command = String::new();
  for series_dir in series_dirs {
    let Some(dir_name) = series_dir.file_name().and_then(|n| n.to_str()) else {
      continue;
    };
    let Some((run, description)) = parse_series_dir(dir_name) else {
      warn!("Skipping {}: not a series directory", series_dir.display());
      continue;
    };
    let Some(chain) = map.get(&description) else {
      debug!("Skipping unmapped series '{}'", description);
      continue;
    };

    let output_dir = series_output_dir(bids_dir, &subject, chain.session(), chain.datatype());
    fs::create_dir_all(&output_dir)?;
    let stem = chain.file_stem(&subject, run);

    let flags = if dcm2niix_flags.is_empty() {
      String::new()
    } else {
      format!("{} ", dcm2niix_flags)
    };
    command.push_str(&format!(
      "dcm2niix -ba n -l o -o \"{}\" -f {} {}\"{}\"\n",
      output_dir.display(),
      stem,
      flags,
      series_dir.display()
    ));

    let json_file = output_dir.join(format!("{}.json", stem));
    if let Some(task) = chain.task() {
      command.push_str(&fix_json_command(&json_file, "TaskName", task));
    }
    for (key, value) in &map.json_mod {
      command.push_str(&fix_json_command(&json_file, key, value));
    }
    if chain.datatype() == Datatype::Dwi {
      command.push_str(&fix_dwi_command(&output_dir));
    }
  }

  Ok(command)
}
