use std::fs;
use std::path::{Path, PathBuf};

use crate::core::jobs::tests::FakeScheduler;
use crate::core::jobs::wait::WaitOutcome;
use crate::core::jobs::{JobError, JobHandle};
use crate::core::settings::tests::init_slurmbids_for_tests;
use crate::core::settings::{Settings, get_settings_local};
use crate::core::{Slurmbids, SlurmbidsError};

fn create_facade(path: &Path, scheduler: FakeScheduler) -> Slurmbids {
  let settings = Settings {
    account: Some("lcni".to_string()),
    poll_interval_secs: Some(0),
    ..Default::default()
  };
  Slurmbids::with_scheduler(path.to_path_buf(), settings, Box::new(scheduler))
}

fn write_job_file(dir: &Path) -> PathBuf {
  let path = dir.join("job.yaml");
  fs::write(
    &path,
    "name: t1\ncommand: echo hi\nthreads: 4\noutput_directory: logs\n",
  )
  .unwrap();
  path
}

#[test]
fn write_job_next_to_file() {
  let temp_dir = tempfile::tempdir().unwrap();
  let file = write_job_file(temp_dir.path());
  let slurmbids = create_facade(temp_dir.path(), FakeScheduler::default());

  let script = slurmbids.write_job(&file, None).unwrap();

  assert_eq!(script.path, temp_dir.path().join("t1.srun"));
  let content = fs::read_to_string(&script.path).unwrap();
  assert!(content.contains("#SBATCH --cpus-per-task=4\n"));
  assert!(content.contains("#SBATCH --account=lcni\n"));
  assert!(content.ends_with("echo hi\n"));
  assert!(temp_dir.path().join("logs").is_dir());
}

#[test]
fn write_job_to_explicit_path() {
  let temp_dir = tempfile::tempdir().unwrap();
  let file = write_job_file(temp_dir.path());
  let output = temp_dir.path().join("scripts").join("custom.sh");
  fs::create_dir_all(output.parent().unwrap()).unwrap();
  let slurmbids = create_facade(temp_dir.path(), FakeScheduler::default());

  let script = slurmbids.write_job(&file, Some(&output)).unwrap();
  assert_eq!(script.path, output);
  assert!(output.exists());
}

#[test]
fn submit_returns_handle() {
  let temp_dir = tempfile::tempdir().unwrap();
  let file = write_job_file(temp_dir.path());
  let scheduler = FakeScheduler {
    submit_output: "Submitted batch job 77\n".to_string(),
    ..Default::default()
  };
  let slurmbids = create_facade(temp_dir.path(), scheduler);

  let handle = slurmbids.submit(&file, None).unwrap();
  assert_eq!(handle, Some(JobHandle::new("77")));
}

#[test]
fn submit_invalid_job_writes_nothing() {
  let temp_dir = tempfile::tempdir().unwrap();
  let file = temp_dir.path().join("job.yaml");
  fs::write(&file, "command: echo hi\n").unwrap();
  let slurmbids = create_facade(temp_dir.path(), FakeScheduler::default());

  let result = slurmbids.submit(&file, None);
  assert!(matches!(result, Err(SlurmbidsError::ParserError(_))));
  let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
  assert_eq!(entries.len(), 1);
}

#[test]
fn wait_uses_settings() {
  let temp_dir = tempfile::tempdir().unwrap();
  let scheduler = FakeScheduler::with_accounting(&["5 RUNNING\n", "5 COMPLETED\n"]);
  let slurmbids = create_facade(temp_dir.path(), scheduler);

  let outcome = slurmbids.wait(&JobHandle::new("5")).unwrap();
  assert_eq!(outcome, WaitOutcome::Completed);
}

#[test]
fn notify_falls_back_to_settings_email() {
  let temp_dir = tempfile::tempdir().unwrap();
  let scheduler = FakeScheduler {
    submit_output: "Submitted batch job 8\n".to_string(),
    ..Default::default()
  };
  let mut slurmbids = create_facade(temp_dir.path(), scheduler);

  let result = slurmbids.notify(&JobHandle::new("7"), None);
  assert!(matches!(
    result,
    Err(SlurmbidsError::JobError(JobError::MissingEmail))
  ));

  slurmbids.settings.email = Some("me@example.org".to_string());
  let handle = slurmbids.notify(&JobHandle::new("7"), None).unwrap();
  assert_eq!(handle, Some(JobHandle::new("8")));
}

#[test]
fn set_account_locally() {
  let temp_dir = init_slurmbids_for_tests();
  let nested = temp_dir.path().join("study").join("sub");
  fs::create_dir_all(&nested).unwrap();
  let mut slurmbids = create_facade(&nested, FakeScheduler::default());

  slurmbids.set_account("other", true).unwrap();

  assert_eq!(slurmbids.settings().account.as_deref(), Some("other"));
  let local = get_settings_local(&temp_dir.path().join(".slurmbids")).unwrap();
  assert_eq!(local.account.as_deref(), Some("other"));
}

#[test]
fn convert_options_from_settings() {
  let temp_dir = tempfile::tempdir().unwrap();
  let slurmbids = create_facade(temp_dir.path(), FakeScheduler::default());

  let options = slurmbids.convert_options();
  assert_eq!(options.account.as_deref(), Some("lcni"));
  assert_eq!(options.modules, vec!["dcm2niix", "jq"]);
  assert!(!options.slurm);
}

#[test]
fn convert_with_map_file() {
  let temp_dir = tempfile::tempdir().unwrap();
  let dicom = temp_dir.path().join("dicom").join("study");
  fs::create_dir_all(dicom.join("P1_20210101_1").join("Series_2_mprage")).unwrap();
  let map_file = temp_dir.path().join("map.yaml");
  fs::write(&map_file, "series:\n  mprage:\n    datatype: anat\n    suffix: T1w\n").unwrap();
  let scheduler = FakeScheduler {
    submit_output: "Submitted batch job 9\n".to_string(),
    ..Default::default()
  };
  let slurmbids = create_facade(temp_dir.path(), scheduler);
  let options = crate::core::bids::ConvertOptions {
    slurm: true,
    ..slurmbids.convert_options()
  };

  let bids = temp_dir.path().join("bids");
  let conversions = slurmbids
    .convert(&temp_dir.path().join("dicom"), &bids, &map_file, &options)
    .unwrap();

  assert_eq!(conversions.len(), 1);
  assert!(conversions[0].command.contains("-f sub-P1_run-02_T1w"));
  assert!(bids.join("code").join("convert-P1.srun").exists());
  assert!(bids.join("sub-P1").join("anat").is_dir());
}
