use hashlink::LinkedHashMap;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};

use crate::core::jobs::{JobError, utils::parse_time_to_seconds};

/// How the parent job must end before a dependent job may start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DependencyKind {
  Any,
  #[default]
  Ok,
  #[strum(to_string = "notok", serialize = "not-ok", serialize = "not_ok", serialize = "error")]
  NotOk,
  Corr,
  BurstBuffer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
  pub job_id: String,
  pub kind: DependencyKind,
}

impl Dependency {
  pub fn new(job_id: impl Into<String>, kind: DependencyKind) -> Self {
    Dependency {
      job_id: job_id.into(),
      kind,
    }
  }

  /// Value of the `--dependency` directive, e.g. `afterok:1234`
  pub fn directive_value(&self) -> String {
    format!("after{}:{}", self.kind, self.job_id)
  }
}

/// Values fanned out over the tasks of an array job
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySpec {
  pub values: Vec<String>,
  pub limit: Option<u32>,
  pub variable: String,
}

impl ArraySpec {
  pub fn new(values: Vec<String>) -> Self {
    ArraySpec {
      values,
      limit: None,
      variable: "x".to_string(),
    }
  }

  pub fn with_limit(mut self, limit: u32) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
    self.variable = variable.into();
    self
  }

  /// Value of the `--array` directive, e.g. `0-9%2`
  pub fn directive_value(&self) -> String {
    let upper = self.values.len().saturating_sub(1);
    match self.limit {
      Some(limit) => format!("0-{}%{}", upper, limit),
      None => format!("0-{}", upper),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resources {
  pub threads: Option<u32>,
  pub memory: Option<String>,
  pub time: Option<String>,
  pub partition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Interpreter {
  #[default]
  Bash,
  /// Path of the python executable to run the script with
  Python(String),
  Path(String),
}

impl Interpreter {
  pub fn shebang(&self) -> String {
    match self {
      Interpreter::Bash => "#!/bin/bash".to_string(),
      Interpreter::Python(path) | Interpreter::Path(path) => format!("#!{}", path),
    }
  }

  pub fn is_shell(&self) -> bool {
    match self {
      Interpreter::Bash => true,
      Interpreter::Python(_) => false,
      Interpreter::Path(path) => path.ends_with("sh"),
    }
  }
}

/// A fully validated batch job. Built through [`JobDescriptorBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
  name: String,
  command: Vec<String>,
  resources: Resources,
  account: Option<String>,
  index: Option<String>,
  email: Option<String>,
  dependency: Option<Dependency>,
  array: Option<ArraySpec>,
  output_directory: Option<PathBuf>,
  interpreter: Interpreter,
  directives: LinkedHashMap<String, String>,
}

impl JobDescriptor {
  pub fn builder() -> JobDescriptorBuilder {
    JobDescriptorBuilder::default()
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn command(&self) -> &[String] {
    &self.command
  }

  pub fn resources(&self) -> &Resources {
    &self.resources
  }

  pub fn account(&self) -> Option<&str> {
    self.account.as_deref()
  }

  pub fn index(&self) -> Option<&str> {
    self.index.as_deref()
  }

  pub fn email(&self) -> Option<&str> {
    self.email.as_deref()
  }

  pub fn dependency(&self) -> Option<&Dependency> {
    self.dependency.as_ref()
  }

  pub fn array(&self) -> Option<&ArraySpec> {
    self.array.as_ref()
  }

  pub fn output_directory(&self) -> Option<&Path> {
    self.output_directory.as_deref()
  }

  pub fn interpreter(&self) -> &Interpreter {
    &self.interpreter
  }

  pub fn directives(&self) -> &LinkedHashMap<String, String> {
    &self.directives
  }

  /// Default script file name, `<name>.srun`
  pub fn default_script_name(&self) -> String {
    format!("{}.srun", self.name)
  }
}

fn check_single_line(field: &str, value: Option<&str>) -> Result<(), JobError> {
  match value {
    Some(value) if value.chars().any(char::is_control) => {
      Err(JobError::InvalidValue(field.to_string()))
    }
    _ => Ok(()),
  }
}

#[derive(Debug, Clone, Default)]
pub struct JobDescriptorBuilder {
  name: Option<String>,
  command: Vec<String>,
  resources: Resources,
  account: Option<String>,
  index: Option<String>,
  email: Option<String>,
  dependency: Option<Dependency>,
  array: Option<ArraySpec>,
  output_directory: Option<PathBuf>,
  interpreter: Interpreter,
  directives: LinkedHashMap<String, String>,
}

impl JobDescriptorBuilder {
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn command(mut self, line: impl Into<String>) -> Self {
    self.command.push(line.into());
    self
  }

  pub fn commands<I, S>(mut self, lines: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.command.extend(lines.into_iter().map(Into::into));
    self
  }

  pub fn threads(mut self, threads: u32) -> Self {
    self.resources.threads = Some(threads);
    self
  }

  pub fn memory(mut self, memory: impl Into<String>) -> Self {
    self.resources.memory = Some(memory.into());
    self
  }

  pub fn time(mut self, time: impl Into<String>) -> Self {
    self.resources.time = Some(time.into());
    self
  }

  pub fn partition(mut self, partition: impl Into<String>) -> Self {
    self.resources.partition = Some(partition.into());
    self
  }

  pub fn account(mut self, account: impl Into<String>) -> Self {
    self.account = Some(account.into());
    self
  }

  /// Charge index, written to the comment field as `idx:<index>`
  pub fn index(mut self, index: impl Into<String>) -> Self {
    self.index = Some(index.into());
    self
  }

  pub fn email(mut self, email: impl Into<String>) -> Self {
    self.email = Some(email.into());
    self
  }

  pub fn dependency(mut self, dependency: Dependency) -> Self {
    self.dependency = Some(dependency);
    self
  }

  pub fn array(mut self, array: ArraySpec) -> Self {
    self.array = Some(array);
    self
  }

  pub fn output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
    self.output_directory = Some(dir.into());
    self
  }

  pub fn interpreter(mut self, interpreter: Interpreter) -> Self {
    self.interpreter = interpreter;
    self
  }

  /// Extra `#SBATCH --key=value` directive, passed through verbatim
  pub fn directive(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.directives.insert(key.into(), value.into());
    self
  }

  pub fn build(self) -> Result<JobDescriptor, JobError> {
    let name = match self.name {
      Some(name) if !name.trim().is_empty() => name,
      _ => return Err(JobError::MissingName),
    };
    if self.command.iter().all(|line| line.trim().is_empty()) {
      return Err(JobError::MissingCommand(name));
    }
    // Header fields each render onto a single `#SBATCH` line
    let output_directory = self
      .output_directory
      .as_ref()
      .map(|dir| dir.to_string_lossy().into_owned());
    let fields = [
      ("name", Some(name.as_str())),
      ("memory", self.resources.memory.as_deref()),
      ("time", self.resources.time.as_deref()),
      ("partition", self.resources.partition.as_deref()),
      ("account", self.account.as_deref()),
      ("index", self.index.as_deref()),
      ("email", self.email.as_deref()),
      ("dependency", self.dependency.as_ref().map(|d| d.job_id.as_str())),
      ("output_directory", output_directory.as_deref()),
    ];
    for (field, value) in fields {
      check_single_line(field, value)?;
    }
    for (key, value) in self.directives.iter() {
      check_single_line("directive", Some(key.as_str()))?;
      check_single_line(key, Some(value.as_str()))?;
    }
    if let Some(time) = &self.resources.time {
      parse_time_to_seconds(time)?;
    }
    if let Some(array) = &self.array {
      if array.values.is_empty() {
        return Err(JobError::InvalidArray("array has no values".to_string()));
      }
      if array.limit == Some(0) {
        return Err(JobError::InvalidArray("array limit must be positive".to_string()));
      }
      if array.variable.is_empty()
        || !array
          .variable
          .chars()
          .all(|c| c.is_ascii_alphanumeric() || c == '_')
        || array.variable.starts_with(|c: char| c.is_ascii_digit())
      {
        return Err(JobError::InvalidArray(format!(
          "'{}' is not a valid shell variable name",
          array.variable
        )));
      }
    }

    Ok(JobDescriptor {
      name,
      command: self.command,
      resources: self.resources,
      account: self.account,
      index: self.index,
      email: self.email,
      dependency: self.dependency,
      array: self.array,
      output_directory: self.output_directory,
      interpreter: self.interpreter,
      directives: self.directives,
    })
  }
}
