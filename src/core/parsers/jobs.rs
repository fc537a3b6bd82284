use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use saphyr::{ScalarOwned, YamlOwned};

use crate::core::jobs::descriptor::{
  ArraySpec, Dependency, DependencyKind, Interpreter, JobDescriptor,
};
use crate::core::parsers::ParserError;
use crate::core::parsers::utils::{
  load_yaml_from_file, lookup_optional_str, lookup_optional_u32, lookup_str, lookup_string_map,
  scalar_to_string, string_or_sequence, wrong_type_err, yaml_lookup,
};
use crate::core::settings::Settings;

/// Values used when a job file leaves them out
#[derive(Debug, Clone, PartialEq)]
pub struct JobDefaults {
  pub account: Option<String>,
  pub partition: Option<String>,
  pub python_interpreter: String,
}

impl From<&Settings> for JobDefaults {
  fn from(settings: &Settings) -> Self {
    JobDefaults {
      account: settings.account.clone(),
      partition: settings.partition.clone(),
      python_interpreter: settings.python_interpreter().to_string(),
    }
  }
}

impl Default for JobDefaults {
  fn default() -> Self {
    JobDefaults::from(&Settings::default())
  }
}

fn parse_dependency(yaml: &YamlOwned) -> Result<Dependency, ParserError> {
  match yaml {
    YamlOwned::Mapping(_) => {
      let id = lookup_str(yaml, "id")?;
      let kind = match lookup_optional_str(yaml, "type")? {
        Some(kind) => DependencyKind::from_str(&kind)
          .map_err(|_| wrong_type_err!(kind, "dependency type (any, ok, notok/error, corr, burstbuffer)"))?,
        None => DependencyKind::default(),
      };
      Ok(Dependency::new(id, kind))
    }
    _ => Ok(Dependency::new(scalar_to_string(yaml)?, DependencyKind::default())),
  }
}

fn parse_array(yaml: &YamlOwned) -> Result<ArraySpec, ParserError> {
  let values = match yaml {
    YamlOwned::Sequence(_) => string_or_sequence(yaml)?,
    YamlOwned::Mapping(_) => match yaml_lookup(yaml, "values") {
      Some(values @ YamlOwned::Sequence(_)) => string_or_sequence(values)?,
      Some(values) => return Err(wrong_type_err!(values, "sequence")),
      None => return Err(ParserError::MissingKey("values".to_string())),
    },
    _ => return Err(wrong_type_err!(yaml, "sequence or mapping")),
  };

  let mut array = ArraySpec::new(values);
  if let Some(limit) = lookup_optional_u32(yaml, "limit")? {
    array = array.with_limit(limit);
  }
  if let Some(variable) = lookup_optional_str(yaml, "variable")? {
    array = array.with_variable(variable);
  }
  Ok(array)
}

fn parse_interpreter(value: &str, defaults: &JobDefaults) -> Interpreter {
  match value {
    "bash" => Interpreter::Bash,
    "python" => Interpreter::Python(defaults.python_interpreter.clone()),
    path => Interpreter::Path(path.to_string()),
  }
}

/// Build a job descriptor from a YAML mapping. Relative output directories
/// are resolved against `base_dir` when given.
pub fn parse_job(
  yaml: &YamlOwned,
  defaults: &JobDefaults,
  base_dir: Option<&Path>,
) -> Result<JobDescriptor, ParserError> {
  if !matches!(yaml, YamlOwned::Mapping(_)) {
    return Err(wrong_type_err!(yaml, "mapping"));
  }

  let mut builder = JobDescriptor::builder();
  if let Some(name) = lookup_optional_str(yaml, "name")? {
    builder = builder.name(name);
  }
  match yaml_lookup(yaml, "command") {
    None | Some(YamlOwned::Value(ScalarOwned::Null)) => {}
    Some(command) => builder = builder.commands(string_or_sequence(command)?),
  }

  if let Some(threads) = lookup_optional_u32(yaml, "threads")? {
    builder = builder.threads(threads);
  }
  if let Some(memory) = lookup_optional_str(yaml, "memory")? {
    builder = builder.memory(memory);
  }
  if let Some(time) = lookup_optional_str(yaml, "time")? {
    builder = builder.time(time);
  }
  if let Some(partition) = lookup_optional_str(yaml, "partition")?.or(defaults.partition.clone()) {
    builder = builder.partition(partition);
  }
  if let Some(account) = lookup_optional_str(yaml, "account")?.or(defaults.account.clone()) {
    builder = builder.account(account);
  }
  if let Some(index) = lookup_optional_str(yaml, "index")? {
    builder = builder.index(index);
  }
  if let Some(email) = lookup_optional_str(yaml, "email")? {
    builder = builder.email(email);
  }
  if let Some(dependency) = yaml_lookup(yaml, "dependency") {
    builder = builder.dependency(parse_dependency(dependency)?);
  }
  if let Some(array) = yaml_lookup(yaml, "array") {
    builder = builder.array(parse_array(array)?);
  }
  if let Some(dir) = lookup_optional_str(yaml, "output_directory")? {
    let dir = PathBuf::from(dir);
    let dir = match base_dir {
      Some(base) if dir.is_relative() => base.join(dir),
      _ => dir,
    };
    builder = builder.output_directory(dir);
  }
  if let Some(interpreter) = lookup_optional_str(yaml, "interpreter")? {
    builder = builder.interpreter(parse_interpreter(&interpreter, defaults));
  }
  for (key, value) in lookup_string_map(yaml, "directives")? {
    builder = builder.directive(key, value);
  }

  Ok(builder.build()?)
}

pub fn parse_job_from_file(path: &Path, defaults: &JobDefaults) -> Result<JobDescriptor, ParserError> {
  debug!("Loading job from file: {:?}", path);
  let yaml = load_yaml_from_file(path)?;
  parse_job(&yaml, defaults, path.parent())
}
