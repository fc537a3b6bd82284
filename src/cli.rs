use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::core::jobs::JobHandle;
use crate::core::jobs::descriptor::{Dependency, DependencyKind, JobDescriptor};
use crate::core::jobs::status::DEFAULT_INFO_FORMAT;
use crate::core::jobs::wait::WaitOutcome;
use crate::core::{self, Slurmbids};


#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Create a local .slurmbids directory in the current directory
  Init {},
  /// Set the account charged for submitted jobs
  SetAccount {
    name: String,
    /// Store in the nearest local settings instead of globally
    #[arg(long)]
    local: bool,
  },
  /// Render a job file into a batch script
  Write {
    file: PathBuf,
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Render and submit a job file
  Submit {
    file: PathBuf,
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Block until the job settles
    #[arg(long)]
    wait: bool,
  },
  /// Submit a command line without writing a script
  Wrap {
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
    #[arg(long, default_value = "wrap")]
    name: String,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    threads: Option<u32>,
    #[arg(long)]
    dependency: Option<String>,
    #[arg(long, default_value = "ok")]
    deptype: DependencyKind,
    #[arg(long)]
    output_directory: Option<PathBuf>,
  },
  /// Summarize the state of a job's rows
  Status { jobid: String },
  /// Print the accounting table of a job
  Info {
    jobid: String,
    /// Comma separated accounting fields
    #[arg(long, value_delimiter = ',')]
    format: Option<Vec<String>>,
  },
  /// Block until a job settles
  Wait { jobid: String },
  /// Mail once a job ends
  Notify { jobid: String, email: Option<String> },
  /// List the output files a job wrote
  Outputs {
    file: PathBuf,
    jobid: String,
    #[arg(long)]
    ext: Option<String>,
  },
  /// Convert sorted DICOM directories into a BIDS tree
  Convert {
    dicom_dir: PathBuf,
    bids_dir: PathBuf,
    /// YAML file mapping series descriptions to BIDS names
    map: PathBuf,
    /// Submit one job per subject instead of converting locally
    #[arg(long)]
    slurm: bool,
    #[arg(long)]
    throttle: bool,
    #[arg(long)]
    no_participants: bool,
    #[arg(long)]
    no_description: bool,
    /// Extra dcm2niix flags
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    flags: String,
  },
}

fn wait_exit_code(outcome: &WaitOutcome) -> ExitCode {
  match outcome {
    WaitOutcome::Completed => {
      println!("✅ Job completed");
      ExitCode::SUCCESS
    }
    WaitOutcome::Failed(rows) => {
      eprintln!("❌ Job failed:");
      for row in rows {
        eprintln!("  {}", row.fields.join(" "));
      }
      ExitCode::from(1)
    }
    WaitOutcome::Unknown(states) => {
      let states: Vec<String> = states.iter().map(|s| s.to_string()).collect();
      eprintln!("Job settled in unexpected states: [{}]", states.join(", "));
      ExitCode::from(2)
    }
    WaitOutcome::Unsatisfiable(line) => {
      eprintln!("❌ Resource request cannot be satisfied: {}", line);
      ExitCode::from(3)
    }
  }
}

/// Exit code of a submission the scheduler did not acknowledge
fn unacknowledged_exit_code() -> ExitCode {
  ExitCode::from(2)
}

fn print_handle(handle: Option<JobHandle>) -> Option<JobHandle> {
  match &handle {
    Some(handle) => println!("{}", handle),
    None => eprintln!("Submission was not acknowledged"),
  }
  handle
}

pub fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  let Some(command) = cli.command else {
    return Ok(ExitCode::SUCCESS);
  };

  if let Commands::Init {} = command {
    let path = env::current_dir().context("Failed to get current directory")?;
    Slurmbids::init(&path).context("Failed to initialize slurmbids directory")?;
    println!("✅ Slurmbids initialized successfully!");
    return Ok(ExitCode::SUCCESS);
  }

  let mut slurmbids = core::Slurmbids::new().context("Failed to initialize slurmbids")?;
  match command {
    Commands::Init {} => {}
    Commands::SetAccount { name, local } => {
      slurmbids
        .set_account(&name, local)
        .context("Failed to set account in slurmbids settings")?;
      println!("✅ Account set to '{}' successfully!", name);
    }
    Commands::Write { file, output } => {
      let script = slurmbids
        .write_job(&file, output.as_deref())
        .with_context(|| format!("Failed to write job script from {}", file.display()))?;
      println!("{}", script.path.display());
    }
    Commands::Submit { file, output, wait } => {
      let handle = slurmbids
        .submit(&file, output.as_deref())
        .with_context(|| format!("Failed to submit job from {}", file.display()))?;
      let Some(handle) = print_handle(handle) else {
        return Ok(unacknowledged_exit_code());
      };
      if wait {
        let outcome = slurmbids.wait(&handle).context("Failed to wait for job")?;
        return Ok(wait_exit_code(&outcome));
      }
    }
    Commands::Wrap {
      command,
      name,
      email,
      threads,
      dependency,
      deptype,
      output_directory,
    } => {
      let mut builder = JobDescriptor::builder().name(name).command(command.join(" "));
      if let Some(email) = email {
        builder = builder.email(email);
      }
      if let Some(threads) = threads {
        builder = builder.threads(threads);
      }
      if let Some(id) = dependency {
        builder = builder.dependency(Dependency::new(id, deptype));
      }
      if let Some(dir) = output_directory {
        builder = builder.output_directory(dir);
      }
      if let Some(account) = &slurmbids.settings().account {
        builder = builder.account(account);
      }
      let job = builder.build().context("Invalid job")?;
      print_handle(slurmbids.wrap(&job).context("Failed to submit wrapped job")?);
    }
    Commands::Status { jobid } => {
      let statuses = slurmbids
        .status(&JobHandle::new(jobid))
        .context("Failed to query job status")?;
      if statuses.is_empty() {
        println!("No accounting rows");
      }
      for (state, count) in statuses.summary() {
        println!("{:<16}{}", state, count);
      }
    }
    Commands::Info { jobid, format } => {
      let fields: Vec<String> = format
        .unwrap_or_else(|| DEFAULT_INFO_FORMAT.iter().map(|f| f.to_string()).collect());
      let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
      let table = slurmbids
        .info(&JobHandle::new(jobid), &fields)
        .context("Failed to query job accounting")?;
      print!("{}", table);
    }
    Commands::Wait { jobid } => {
      let outcome = slurmbids
        .wait(&JobHandle::new(jobid))
        .context("Failed to wait for job")?;
      return Ok(wait_exit_code(&outcome));
    }
    Commands::Notify { jobid, email } => {
      print_handle(
        slurmbids
          .notify(&JobHandle::new(jobid), email.as_deref())
          .context("Failed to submit notification job")?,
      );
    }
    Commands::Outputs { file, jobid, ext } => {
      let files = slurmbids
        .output_files(&file, &JobHandle::new(jobid), ext.as_deref())
        .context("Failed to list output files")?;
      for file in files {
        println!("{}", file.display());
      }
    }
    Commands::Convert {
      dicom_dir,
      bids_dir,
      map,
      slurm,
      throttle,
      no_participants,
      no_description,
      flags,
    } => {
      let mut options = slurmbids.convert_options();
      options.slurm = slurm;
      options.throttle = throttle;
      options.participant_file = !no_participants;
      options.description_file = !no_description;
      options.dcm2niix_flags = flags;
      let conversions = slurmbids
        .convert(&dicom_dir, &bids_dir, &map, &options)
        .with_context(|| format!("Failed to convert {}", dicom_dir.display()))?;
      for conversion in conversions {
        println!("{}: {:?}", conversion.subject, conversion.outcome);
      }
    }
  }

  Ok(ExitCode::SUCCESS)
}
