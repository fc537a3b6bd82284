use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::bids::BidsError;
use crate::core::bids::entities::Datatype;
use crate::core::jobs::JobError;
use crate::core::jobs::descriptor::{DependencyKind, Interpreter};
use crate::core::parsers::bids::parse_bids_map;
use crate::core::parsers::jobs::parse_job;
use crate::core::parsers::utils::{load_yaml_from_str, lookup_str, yaml_lookup};
use crate::core::parsers::{
  JobDefaults, ParserError, parse_bids_map_from_file, parse_job_from_file,
};

fn files_dir() -> PathBuf {
  Path::new(file!()).parent().unwrap().join("files")
}

fn job_from_str(text: &str) -> Result<crate::core::jobs::descriptor::JobDescriptor, ParserError> {
  let yaml = load_yaml_from_str(text).unwrap();
  parse_job(&yaml, &JobDefaults::default(), None)
}

// ============================================================================
// Tests for YAML helpers
// ============================================================================

#[test]
fn test_lookup_str_accepts_numbers() {
  let yaml = load_yaml_from_str("memory: 8\nname: t1\n").unwrap();
  assert_eq!(lookup_str(&yaml, "memory").unwrap(), "8");
  assert_eq!(lookup_str(&yaml, "name").unwrap(), "t1");
  assert!(matches!(lookup_str(&yaml, "time"), Err(ParserError::MissingKey(k)) if k == "time"));
  assert!(yaml_lookup(&yaml, "time").is_none());
}

#[test]
fn test_empty_document() {
  assert!(matches!(load_yaml_from_str(""), Err(ParserError::YamlEmpty)));
}

// ============================================================================
// Tests for job parsing
// ============================================================================

#[test]
fn test_parse_job_from_file() {
  let path = files_dir().join("job.yaml");
  let job = parse_job_from_file(&path, &JobDefaults::default()).unwrap();

  assert_eq!(job.name(), "preprocess");
  assert_eq!(job.command(), ["echo \"subject ${x}\"", "./run.sh ${x}"]);
  assert_eq!(job.resources().threads, Some(4));
  assert_eq!(job.resources().memory.as_deref(), Some("8G"));
  assert_eq!(job.resources().time.as_deref(), Some("02:00:00"));
  assert_eq!(job.account(), Some("lab"));
  assert_eq!(job.email(), Some("someone@example.org"));

  let dependency = job.dependency().unwrap();
  assert_eq!(dependency.job_id, "4242");
  assert_eq!(dependency.kind, DependencyKind::Any);

  let array = job.array().unwrap();
  assert_eq!(array.values, vec!["sub-01", "sub-02", "3"]);
  assert_eq!(array.limit, Some(2));
  assert_eq!(array.variable, "x");

  assert_eq!(job.output_directory(), Some(files_dir().join("logs").as_path()));
  let directives: Vec<(&str, &str)> = job
    .directives()
    .iter()
    .map(|(k, v)| (k.as_str(), v.as_str()))
    .collect();
  assert_eq!(directives, vec![("qos", "long"), ("constraint", "intel")]);
}

#[test]
fn test_parse_job_applies_defaults() {
  let defaults = JobDefaults {
    account: Some("default-acct".to_string()),
    partition: Some("short".to_string()),
    python_interpreter: "/opt/python/bin/python3".to_string(),
  };
  let yaml = load_yaml_from_str("name: t1\ncommand: print('hi')\ninterpreter: python\n").unwrap();
  let job = parse_job(&yaml, &defaults, None).unwrap();

  assert_eq!(job.command(), ["print('hi')"]);
  assert_eq!(job.account(), Some("default-acct"));
  assert_eq!(job.resources().partition.as_deref(), Some("short"));
  assert_eq!(
    job.interpreter(),
    &Interpreter::Python("/opt/python/bin/python3".to_string())
  );

  let yaml = load_yaml_from_str("name: t1\ncommand: x\naccount: mine\n").unwrap();
  let job = parse_job(&yaml, &defaults, None).unwrap();
  assert_eq!(job.account(), Some("mine"));
}

#[test]
fn test_parse_job_short_forms() {
  let job = job_from_str(
    "name: t1\ncommand: echo $f\ndependency: 99\narray: [a, b]\ninterpreter: /bin/zsh\n",
  )
  .unwrap();

  assert_eq!(job.dependency().unwrap().job_id, "99");
  assert_eq!(job.dependency().unwrap().kind, DependencyKind::Ok);
  assert_eq!(job.array().unwrap().values, vec!["a", "b"]);
  assert_eq!(job.array().unwrap().limit, None);
  assert_eq!(job.interpreter(), &Interpreter::Path("/bin/zsh".to_string()));
}

#[test]
fn test_parse_job_error_dependency() {
  let job = job_from_str("name: t1\ncommand: x\ndependency: {id: 1, type: error}\n").unwrap();
  assert_eq!(job.dependency().unwrap().kind, DependencyKind::NotOk);
  assert_eq!(job.dependency().unwrap().directive_value(), "afternotok:1");
}

#[test]
fn test_parse_job_without_name_fails() {
  let result = job_from_str("command: echo hi\n");
  assert!(matches!(result, Err(ParserError::Job(JobError::MissingName))));
}

#[test]
fn test_parse_job_without_command_fails() {
  let result = job_from_str("name: t1\n");
  assert!(matches!(result, Err(ParserError::Job(JobError::MissingCommand(name))) if name == "t1"));
}

#[test]
fn test_parse_job_rejects_bad_values() {
  assert!(matches!(
    job_from_str("name: t1\ncommand: x\nthreads: -2\n"),
    Err(ParserError::WrongType(..))
  ));
  assert!(matches!(
    job_from_str("name: t1\ncommand: x\ndependency: {id: 1, type: sometimes}\n"),
    Err(ParserError::WrongType(..))
  ));
  assert!(matches!(
    job_from_str("name: t1\ncommand: x\narray: {limit: 2}\n"),
    Err(ParserError::MissingKey(k)) if k == "values"
  ));
  assert!(matches!(
    job_from_str("name: t1\ncommand: x\ntime: soon\n"),
    Err(ParserError::Job(JobError::InvalidTimeFormat(_)))
  ));
  assert!(matches!(job_from_str("- a\n- b\n"), Err(ParserError::WrongType(..))));
}

#[test]
fn test_parse_job_absolute_output_directory() {
  let temp_dir = TempDir::new().unwrap();
  let logs = temp_dir.path().join("logs");
  let path = temp_dir.path().join("job.yaml");
  fs::write(
    &path,
    format!("name: t1\ncommand: echo hi\noutput_directory: {}\n", logs.display()),
  )
  .unwrap();

  let job = parse_job_from_file(&path, &JobDefaults::default()).unwrap();
  assert_eq!(job.output_directory(), Some(logs.as_path()));
}

// ============================================================================
// Tests for BIDS map parsing
// ============================================================================

#[test]
fn test_parse_bids_map_from_file() {
  let map = parse_bids_map_from_file(&files_dir().join("bids_map.yaml")).unwrap();

  let descriptions: Vec<&str> = map.series.keys().map(String::as_str).collect();
  assert_eq!(descriptions, vec!["mprage_p2", "rsfMRI", "DTI_64dir"]);

  let bold = map.get("rsfMRI").unwrap();
  assert_eq!(bold.datatype(), Datatype::Func);
  assert_eq!(bold.file_stem("01", 3), "sub-01_task-rest_acq-mb3_run-03_bold");
  assert_eq!(map.get("DTI_64dir").unwrap().session(), Some("1"));
  assert_eq!(map.json_mod.get("InstitutionName").map(String::as_str), Some("LCNI"));
}

#[test]
fn test_parse_bids_map_errors() {
  let yaml = load_yaml_from_str("json_mod: {}\n").unwrap();
  assert!(matches!(parse_bids_map(&yaml), Err(ParserError::MissingKey(k)) if k == "series"));

  let yaml = load_yaml_from_str("series:\n  x: {datatype: mri, suffix: T1w}\n").unwrap();
  assert!(matches!(
    parse_bids_map(&yaml),
    Err(ParserError::Bids(BidsError::UnknownDatatype(d))) if d == "mri"
  ));

  let yaml = load_yaml_from_str("series:\n  x: {datatype: anat, suffix: bold}\n").unwrap();
  assert!(matches!(
    parse_bids_map(&yaml),
    Err(ParserError::Bids(BidsError::UnknownSuffix { .. }))
  ));

  let yaml =
    load_yaml_from_str("series:\n  x: {datatype: anat, suffix: bold, nonstandard: true}\n").unwrap();
  assert_eq!(parse_bids_map(&yaml).unwrap().get("x").unwrap().suffix(), "bold");
}
