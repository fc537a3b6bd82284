use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::jobs::{
  JobError,
  descriptor::JobDescriptor,
  utils::{make_script_executable, references_variable, shell_quote},
};

/// Marker prefixing every directive line in a rendered script
pub const DIRECTIVE_PREFIX: &str = "#SBATCH";

/// A single scheduler option, rendered as `--key=value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
  pub key: String,
  pub value: String,
}

impl Directive {
  fn new(key: &str, value: impl ToString) -> Self {
    Directive {
      key: key.to_string(),
      value: value.to_string(),
    }
  }

  /// Command line form, e.g. `--cpus-per-task=4`
  pub fn flag(&self) -> String {
    format!("--{}={}", self.key, self.value)
  }

  /// Script header form, e.g. `#SBATCH --cpus-per-task=4`
  pub fn line(&self) -> String {
    format!("{} {}", DIRECTIVE_PREFIX, self.flag())
  }
}

/// A script written to disk. Never rewritten after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedScript {
  pub path: PathBuf,
  pub content: String,
}

/// Directives shared by script files and `--wrap` submissions.
/// Order is stable; extra directives never override an explicit field.
pub fn job_directives(job: &JobDescriptor) -> Vec<Directive> {
  let mut directives = vec![Directive::new("job-name", job.name())];

  if let Some(email) = job.email() {
    directives.push(Directive::new("mail-user", email));
    directives.push(Directive::new("mail-type", "END"));
  }
  if let Some(dependency) = job.dependency() {
    directives.push(Directive::new("dependency", dependency.directive_value()));
  }

  let resources = job.resources();
  if let Some(threads) = resources.threads {
    directives.push(Directive::new("cpus-per-task", threads));
  }
  if let Some(memory) = &resources.memory {
    directives.push(Directive::new("mem", memory));
  }
  if let Some(time) = &resources.time {
    directives.push(Directive::new("time", time));
  }
  if let Some(partition) = &resources.partition {
    directives.push(Directive::new("partition", partition));
  }
  if let Some(account) = job.account() {
    directives.push(Directive::new("account", account));
  }
  if let Some(index) = job.index() {
    directives.push(Directive::new("comment", format!("idx:{}", index)));
  }

  let reserved = reserved_keys(job);
  for (key, value) in job.directives() {
    if directives.iter().any(|d| &d.key == key) || reserved.contains(&key.as_str()) {
      debug!("Skipping directive '{}': set by an explicit field", key);
      continue;
    }
    directives.push(Directive::new(key, value));
  }

  directives
}

/// Keys emitted after the extra directives, which must not be duplicated
fn reserved_keys(job: &JobDescriptor) -> Vec<&'static str> {
  let mut keys = Vec::new();
  if job.output_directory().is_some() {
    keys.extend(["output", "error"]);
  }
  if job.array().is_some() {
    keys.push("array");
  }
  keys
}

/// All directive lines of a script file, including output and array options
pub fn script_directives(job: &JobDescriptor) -> Vec<Directive> {
  let mut directives = job_directives(job);

  if let Some(dir) = job.output_directory() {
    let pattern = if job.array().is_some() {
      "%x-%A_%a"
    } else {
      "%x-%j"
    };
    let dir = dir.display();
    directives.push(Directive::new("output", format!("{}/{}.out", dir, pattern)));
    directives.push(Directive::new("error", format!("{}/{}.err", dir, pattern)));
  }
  if let Some(array) = job.array() {
    directives.push(Directive::new("array", array.directive_value()));
  }

  directives
}

/// Render the full text of a batch script
pub fn render(job: &JobDescriptor) -> String {
  let mut script = String::new();
  script.push_str(&job.interpreter().shebang());
  script.push('\n');

  for directive in script_directives(job) {
    script.push_str(&directive.line());
    script.push('\n');
  }
  script.push('\n');

  if let Some(array) = job.array() {
    if !job.interpreter().is_shell() {
      warn!(
        "Job '{}' declares an array but its interpreter is not a shell",
        job.name()
      );
    }
    let values: Vec<String> = array.values.iter().map(|v| shell_quote(v)).collect();
    script.push_str(&format!("data=({})\n", values.join(" ")));
    script.push_str(&format!(
      "{}=${{data[$SLURM_ARRAY_TASK_ID]}}\n\n",
      array.variable
    ));
    if !references_variable(job.command(), &array.variable) {
      warn!(
        "Variable '{}' not found in the command of job '{}'",
        array.variable,
        job.name()
      );
    }
  }

  script.push_str(&job.command().join("\n"));
  script.push('\n');
  script
}

/// Render `job` and write it to `path`, creating the output directory if needed
pub fn write_script(job: &JobDescriptor, path: &Path) -> Result<RenderedScript, JobError> {
  if let Some(dir) = job.output_directory() {
    if !dir.exists() {
      fs::create_dir_all(dir)?;
    }
  }

  let content = render(job);
  fs::write(path, &content)?;
  make_script_executable(path)?;
  info!("Wrote job script for '{}' to {}", job.name(), path.display());

  Ok(RenderedScript {
    path: path.to_path_buf(),
    content,
  })
}
