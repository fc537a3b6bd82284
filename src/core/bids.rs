//! Conversion of sorted DICOM directories into a BIDS tree.
//!
//! DICOM files must already be sorted into `<subject>_<YYYYMMDD>_<time>/Series_<n>_<description>`
//! directories. The actual conversion is delegated to `dcm2niix` and `jq`; this module only
//! generates their command lines, maintains the dataset level metadata files, and either runs the
//! commands locally or submits them as batch jobs.

pub mod commands;
pub mod entities;
pub mod metadata;

#[cfg(test)]
mod tests;

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use walkdir::WalkDir;

use crate::core::bids::commands::{is_subject_dir_name, subject_command, subject_name};
use crate::core::bids::entities::BidsMap;
use crate::core::bids::metadata::{append_participant, write_dataset_description};
use crate::core::jobs::{
  JobError, JobHandle, Scheduler, descriptor::JobDescriptor, script::write_script, submit_script,
};

#[derive(Error, Debug)]
pub enum BidsError {
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON Error: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("Directory walk failed: {0}")]
  WalkError(#[from] walkdir::Error),
  #[error("Job Error: {0}")]
  JobError(#[from] JobError),
  #[error(
    "Unable to find subject level directories in {0}. Are the DICOM files sorted into <subject>_<date>_<time>/Series_<n>_<description> directories?"
  )]
  NoSubjects(PathBuf),
  #[error("Not a subject directory: {0}")]
  InvalidSubjectDir(PathBuf),
  #[error("Unknown data type {0}")]
  UnknownDatatype(String),
  #[error("Unknown suffix {suffix} for data type {datatype}. Allowed suffixes are {allowed}")]
  UnknownSuffix {
    suffix: String,
    datatype: String,
    allowed: String,
  },
  #[error("Unknown entity {0}")]
  UnknownEntity(String),
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
  /// Submit one batch job per subject instead of running locally
  pub slurm: bool,
  /// Run the scheduler's throttle command after each submission
  pub throttle: bool,
  pub participant_file: bool,
  pub description_file: bool,
  pub dcm2niix_flags: String,
  /// Environment modules loaded before the conversion commands
  pub modules: Vec<String>,
  pub authors: Vec<String>,
  pub account: Option<String>,
}

impl Default for ConvertOptions {
  fn default() -> Self {
    ConvertOptions {
      slurm: false,
      throttle: false,
      participant_file: true,
      description_file: true,
      dcm2niix_flags: String::new(),
      modules: vec!["dcm2niix".to_string(), "jq".to_string()],
      authors: Vec::new(),
      account: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
  /// Submitted as a batch job; `None` when the scheduler did not acknowledge it
  Submitted(Option<JobHandle>),
  /// Ran locally through bash
  Ran { success: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectConversion {
  pub subject: String,
  pub command: String,
  pub outcome: ConversionOutcome,
}

/// Subject directories below `dicom_dir`, sorted
pub fn find_subject_dirs(dicom_dir: &Path) -> Result<Vec<PathBuf>, BidsError> {
  let mut dirs = Vec::new();
  for entry in WalkDir::new(dicom_dir) {
    let entry = entry?;
    if !entry.file_type().is_dir() {
      continue;
    }
    if entry
      .file_name()
      .to_str()
      .is_some_and(is_subject_dir_name)
    {
      dirs.push(entry.into_path());
    }
  }
  dirs.sort();
  Ok(dirs)
}

/// Project name used in the dataset description: the name of the directory
/// holding the subject directories
fn project_name(subject_dir: &Path) -> String {
  subject_dir
    .parent()
    .and_then(|p| p.file_name())
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default()
}

fn module_lines(modules: &[String]) -> String {
  modules
    .iter()
    .map(|module| format!("module load {}\n", module))
    .collect()
}

/// Convert every subject found below `dicom_dir` into `bids_dir`
pub fn convert(
  scheduler: &dyn Scheduler,
  dicom_dir: &Path,
  bids_dir: &Path,
  map: &BidsMap,
  options: &ConvertOptions,
) -> Result<Vec<SubjectConversion>, BidsError> {
  let subject_dirs = find_subject_dirs(dicom_dir)?;
  if subject_dirs.is_empty() {
    return Err(BidsError::NoSubjects(dicom_dir.to_path_buf()));
  }
  fs::create_dir_all(bids_dir)?;

  if options.description_file {
    write_dataset_description(bids_dir, &project_name(&subject_dirs[0]), &options.authors)?;
  }

  let base = module_lines(&options.modules);
  let mut conversions = Vec::new();
  for subject_dir in &subject_dirs {
    let subject = subject_name(subject_dir)
      .ok_or_else(|| BidsError::InvalidSubjectDir(subject_dir.clone()))?;
    if options.participant_file {
      append_participant(bids_dir, &subject)?;
    }

    let command = format!(
      "{}{}",
      base,
      subject_command(subject_dir, bids_dir, map, &options.dcm2niix_flags)?
    );
    let outcome = if options.slurm {
      submit_conversion(scheduler, bids_dir, &subject, &command, options)?
    } else {
      run_conversion(&subject, &command)?
    };
    conversions.push(SubjectConversion {
      subject,
      command,
      outcome,
    });
  }

  Ok(conversions)
}

fn submit_conversion(
  scheduler: &dyn Scheduler,
  bids_dir: &Path,
  subject: &str,
  command: &str,
  options: &ConvertOptions,
) -> Result<ConversionOutcome, BidsError> {
  let mut builder = JobDescriptor::builder()
    .name("convert")
    .commands(command.lines());
  if let Some(account) = &options.account {
    builder = builder.account(account);
  }
  let job = builder.build()?;

  let code_dir = bids_dir.join("code");
  fs::create_dir_all(&code_dir)?;
  let script = write_script(&job, &code_dir.join(format!("convert-{}.srun", subject)))?;
  let handle = submit_script(scheduler, &script.path)?;
  if options.throttle {
    scheduler.throttle()?;
  }
  Ok(ConversionOutcome::Submitted(handle))
}

fn run_conversion(subject: &str, command: &str) -> Result<ConversionOutcome, BidsError> {
  info!("Converting subject {}", subject);
  let output = Command::new("bash")
    .arg("-c")
    .arg(command)
    .output()
    .map_err(|e| JobError::SpawnError(format!("Failed to run bash: {}", e)))?;
  if !output.status.success() {
    warn!(
      "Conversion of subject {} failed: {}",
      subject,
      String::from_utf8_lossy(&output.stderr).trim()
    );
  }
  Ok(ConversionOutcome::Ran {
    success: output.status.success(),
  })
}
