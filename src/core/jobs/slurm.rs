use log::{debug, info};
use std::path::Path;
use std::process::{Command, Output};

use crate::core::jobs::{JobError, Scheduler};

/// Runs the SLURM command line tools found on `PATH`
#[derive(Debug, Clone, Default)]
pub struct SlurmScheduler {
  throttle_command: Option<String>,
}

impl SlurmScheduler {
  pub fn new(throttle_command: Option<String>) -> Self {
    SlurmScheduler { throttle_command }
  }
}

/// Run `program` and return stdout followed by stderr
fn run(program: &str, args: &[String]) -> Result<String, JobError> {
  debug!("Running {} {}", program, args.join(" "));
  let output: Output = Command::new(program)
    .args(args)
    .output()
    .map_err(|e| JobError::SpawnError(format!("Failed to run {}: {}", program, e)))?;

  let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
  text.push_str(&String::from_utf8_lossy(&output.stderr));
  Ok(text)
}

impl Scheduler for SlurmScheduler {
  fn submit(&self, script: &Path) -> Result<String, JobError> {
    run("sbatch", &[script.display().to_string()])
  }

  fn wrap(&self, flags: &[String], command: &str) -> Result<String, JobError> {
    let mut args = flags.to_vec();
    args.push("--wrap".to_string());
    args.push(command.to_string());
    run("sbatch", &args)
  }

  fn accounting(&self, job_id: &str, fields: &[&str], header: bool) -> Result<String, JobError> {
    let mut args = vec![
      "-j".to_string(),
      job_id.to_string(),
      "--format".to_string(),
      fields.join(","),
    ];
    if !header {
      args.push("-n".to_string());
    }
    run("sacct", &args)
  }

  fn queue(&self) -> Result<String, JobError> {
    run("squeue", &[])
  }

  fn throttle(&self) -> Result<(), JobError> {
    let Some(command) = &self.throttle_command else {
      return Ok(());
    };
    info!("Throttling submissions with {}", command);
    let status = Command::new(command)
      .status()
      .map_err(|e| JobError::SpawnError(format!("Failed to run {}: {}", command, e)))?;
    if !status.success() {
      return Err(JobError::ExecutionFailed(format!(
        "{} exited with {:?}",
        command,
        status.code()
      )));
    }
    Ok(())
  }
}
