use hashlink::LinkedHashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::core::bids::commands::{
  fix_dwi_command, fix_json_command, parse_series_dir, subject_command, subject_name,
};
use crate::core::bids::entities::{BidsMap, Datatype, EntityChain};
use crate::core::bids::metadata::{append_participant, write_dataset_description};
use crate::core::bids::{BidsError, ConversionOutcome, ConvertOptions, convert, find_subject_dirs};
use crate::core::jobs::JobHandle;
use crate::core::jobs::tests::FakeScheduler;

fn entities(pairs: &[(&str, &str)]) -> LinkedHashMap<String, String> {
  pairs
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn create_test_map() -> BidsMap {
  let mut map = BidsMap::default();
  map.add(
    "mprage_p2",
    EntityChain::new(Datatype::Anat, "T1w", LinkedHashMap::new(), false).unwrap(),
  );
  map.add(
    "rsfMRI",
    EntityChain::new(Datatype::Func, "bold", entities(&[("task", "rest")]), false).unwrap(),
  );
  map.add(
    "DTI_64dir",
    EntityChain::new(Datatype::Dwi, "dwi", entities(&[("ses", "1")]), false).unwrap(),
  );
  map
}

/// Creates `<root>/<project>/<subject dir>/<series dirs>`
fn create_dicom_tree(root: &Path, subject_dir: &str, series: &[&str]) -> std::path::PathBuf {
  let subject = root.join("myproject").join(subject_dir);
  for s in series {
    fs::create_dir_all(subject.join(s)).unwrap();
    fs::write(subject.join(s).join("0001.dcm"), "").unwrap();
  }
  subject
}

// ============================================================================
// Tests for entity chains
// ============================================================================

#[test]
fn test_file_stem_orders_entities() {
  let chain = EntityChain::new(
    Datatype::Func,
    "bold",
    entities(&[("acq", "mb3"), ("task", "rest"), ("ses", "pre")]),
    false,
  )
  .unwrap();

  assert_eq!(chain.file_stem("01", 7), "sub-01_ses-pre_task-rest_acq-mb3_run-07_bold");
}

#[test]
fn test_run_entity_comes_from_series_number() {
  let chain = EntityChain::new(Datatype::Anat, "T1w", entities(&[("run", "5")]), false).unwrap();
  assert_eq!(chain.file_stem("abc", 12), "sub-abc_run-12_T1w");
}

#[test]
fn test_unknown_suffix_rejected_unless_nonstandard() {
  let result = EntityChain::new(Datatype::Anat, "bold", LinkedHashMap::new(), false);
  assert!(matches!(result, Err(BidsError::UnknownSuffix { .. })));

  let chain = EntityChain::new(Datatype::Anat, "bold", LinkedHashMap::new(), true).unwrap();
  assert_eq!(chain.suffix(), "bold");
}

#[test]
fn test_unknown_entity_rejected() {
  let result = EntityChain::new(Datatype::Anat, "T1w", entities(&[("flavour", "x")]), false);
  assert!(matches!(result, Err(BidsError::UnknownEntity(key)) if key == "flavour"));
}

#[test]
fn test_datatype_parsing() {
  assert_eq!("anat".parse::<Datatype>().unwrap(), Datatype::Anat);
  assert_eq!(Datatype::Fmap.to_string(), "fmap");
  assert!("mri".parse::<Datatype>().is_err());
}

// ============================================================================
// Tests for name parsing and command snippets
// ============================================================================

#[test]
fn test_subject_name() {
  assert_eq!(
    subject_name(Path::new("/dcm/proj/Smith^John_20200131_101010")),
    Some("SmithJohn".to_string())
  );
  assert_eq!(
    subject_name(Path::new("/dcm/proj/pilot-01_20191212/")),
    Some("pilot01".to_string())
  );
  assert_eq!(subject_name(Path::new("/dcm/proj/notes")), None);
}

#[test]
fn test_parse_series_dir() {
  assert_eq!(
    parse_series_dir("Series_3_mprage_p2"),
    Some((3, "mprage_p2".to_string()))
  );
  assert_eq!(parse_series_dir("Series__localizer"), None);
  assert_eq!(parse_series_dir("localizer"), None);
}

#[test]
fn test_fix_json_command() {
  let command = fix_json_command(Path::new("/bids/sub-01/func/x.json"), "TaskName", "rest");
  assert_eq!(
    command,
    "jq '.TaskName=\"rest\"' \"/bids/sub-01/func/x.json\" > \"/bids/sub-01/func/x.json.tmp\"\n\
     mv \"/bids/sub-01/func/x.json.tmp\" \"/bids/sub-01/func/x.json\"\n"
  );
}

#[test]
fn test_fix_json_command_escapes_quotes() {
  let command = fix_json_command(Path::new("x.json"), "InstitutionName", "O'Brien \"Lab\"");
  assert!(command.starts_with("jq '.InstitutionName=\"O'\\''Brien \\\"Lab\\\"\"' "));
}

#[test]
fn test_fix_dwi_command() {
  assert_eq!(
    fix_dwi_command(Path::new("/bids/sub-01/dwi")),
    "for x in \"/bids/sub-01/dwi\"/*dwi.bv*\ndo mv \"$x\" \"${x//dwi.}\"\ndone\n"
  );
}

// ============================================================================
// Tests for subject_command
// ============================================================================

#[test]
fn test_subject_command() {
  let temp_dir = TempDir::new().unwrap();
  let dicom = temp_dir.path().join("dicom");
  let bids = temp_dir.path().join("bids");
  let subject_dir = create_dicom_tree(
    &dicom,
    "S01_20200131_101010",
    &["Series_1_localizer", "Series_2_mprage_p2", "Series_4_rsfMRI", "Series_6_DTI_64dir"],
  );
  let mut map = create_test_map();
  map.json_mod.insert("InstitutionName".to_string(), "LCNI".to_string());

  let command = subject_command(&subject_dir, &bids, &map, "-z y").unwrap();

  let anat = bids.join("sub-S01/anat");
  let func = bids.join("sub-S01/func");
  let dwi = bids.join("sub-S01/ses-1/dwi");
  assert!(anat.is_dir() && func.is_dir() && dwi.is_dir());
  assert!(!command.contains("localizer"));
  assert!(command.contains(&format!(
    "dcm2niix -ba n -l o -o \"{}\" -f sub-S01_run-02_T1w -z y \"{}\"\n",
    anat.display(),
    subject_dir.join("Series_2_mprage_p2").display()
  )));
  assert!(command.contains("-f sub-S01_task-rest_run-04_bold "));
  assert!(command.contains("'.TaskName=\"rest\"'"));
  assert!(command.contains("-f sub-S01_ses-1_run-06_dwi "));
  assert!(command.contains("*dwi.bv*"));
  // one jq edit per converted series plus one for the task name
  assert_eq!(command.matches("'.InstitutionName=\"LCNI\"'").count(), 3);
  assert_eq!(command.matches("'.TaskName=").count(), 1);
}

#[test]
fn test_subject_command_rejects_non_subject_dir() {
  let temp_dir = TempDir::new().unwrap();
  let result = subject_command(temp_dir.path(), temp_dir.path(), &create_test_map(), "");
  assert!(matches!(result, Err(BidsError::InvalidSubjectDir(_))));
}

// ============================================================================
// Tests for metadata files
// ============================================================================

#[test]
fn test_write_dataset_description_once() {
  let temp_dir = TempDir::new().unwrap();
  let authors = vec!["Jane Doe".to_string()];

  assert!(write_dataset_description(temp_dir.path(), "myproject", &authors).unwrap());
  assert!(!write_dataset_description(temp_dir.path(), "other", &[]).unwrap());

  let content = fs::read_to_string(temp_dir.path().join("dataset_description.json")).unwrap();
  let json: serde_json::Value = serde_json::from_str(&content).unwrap();
  assert_eq!(json["Name"], "myproject");
  assert_eq!(json["BIDSVersion"], "1.3.0");
  assert_eq!(json["Authors"][0], "Jane Doe");
  assert!(json["ReferencesAndLinks"][0].as_str().unwrap().contains("DICOM to NIfTI"));
  assert!(json["Acknowledgements"].as_str().unwrap().contains("dcm2niix"));
}

#[test]
fn test_append_participant() {
  let temp_dir = TempDir::new().unwrap();
  let bids = temp_dir.path().join("bids");

  assert!(append_participant(&bids, "01").unwrap());
  assert!(append_participant(&bids, "02").unwrap());
  assert!(!append_participant(&bids, "01").unwrap());

  let content = fs::read_to_string(bids.join("participants.tsv")).unwrap();
  assert_eq!(
    content,
    "participant_id\tage\tsex\nsub-01\tn/a\tn/a\nsub-02\tn/a\tn/a\n"
  );
  assert!(bids.join("participants.json").exists());
}

#[test]
fn test_append_participant_respects_existing_columns() {
  let temp_dir = TempDir::new().unwrap();
  fs::write(
    temp_dir.path().join("participants.tsv"),
    "participant_id\tsex\tgroup\nsub-01\tF\tcontrol\n",
  )
  .unwrap();

  assert!(!append_participant(temp_dir.path(), "01").unwrap());
  assert!(append_participant(temp_dir.path(), "02").unwrap());

  let content = fs::read_to_string(temp_dir.path().join("participants.tsv")).unwrap();
  assert!(content.ends_with("sub-02\tn/a\tn/a\n"));
}

// ============================================================================
// Tests for convert
// ============================================================================

#[test]
fn test_find_subject_dirs() {
  let temp_dir = TempDir::new().unwrap();
  create_dicom_tree(temp_dir.path(), "B_20200202_1", &["Series_1_mprage_p2"]);
  create_dicom_tree(temp_dir.path(), "A_20200101_1", &["Series_1_mprage_p2"]);

  let dirs = find_subject_dirs(temp_dir.path()).unwrap();
  let names: Vec<String> = dirs
    .iter()
    .map(|d| d.file_name().unwrap().to_string_lossy().into_owned())
    .collect();
  assert_eq!(names, vec!["A_20200101_1", "B_20200202_1"]);
}

#[test]
fn test_convert_without_subjects_fails() {
  let temp_dir = TempDir::new().unwrap();
  let result = convert(
    &FakeScheduler::default(),
    temp_dir.path(),
    &temp_dir.path().join("bids"),
    &create_test_map(),
    &ConvertOptions::default(),
  );
  assert!(matches!(result, Err(BidsError::NoSubjects(_))));
}

#[test]
fn test_convert_submits_one_job_per_subject() {
  let temp_dir = TempDir::new().unwrap();
  let dicom = temp_dir.path().join("dicom");
  let bids = temp_dir.path().join("bids");
  create_dicom_tree(&dicom, "S01_20200131_1", &["Series_2_mprage_p2"]);
  create_dicom_tree(&dicom, "S02_20200201_1", &["Series_3_rsfMRI"]);
  let scheduler = FakeScheduler {
    submit_output: "Submitted batch job 314\n".to_string(),
    ..Default::default()
  };
  let options = ConvertOptions {
    slurm: true,
    throttle: true,
    account: Some("lcni".to_string()),
    authors: vec!["Jane Doe".to_string()],
    ..Default::default()
  };

  let conversions = convert(&scheduler, &dicom, &bids, &create_test_map(), &options).unwrap();

  assert_eq!(conversions.len(), 2);
  assert_eq!(conversions[0].subject, "S01");
  assert_eq!(
    conversions[0].outcome,
    ConversionOutcome::Submitted(Some(JobHandle::new("314")))
  );
  assert!(conversions[0].command.starts_with("module load dcm2niix\nmodule load jq\n"));

  let script = fs::read_to_string(bids.join("code/convert-S02.srun")).unwrap();
  assert!(script.contains("#SBATCH --job-name=convert\n"));
  assert!(script.contains("#SBATCH --account=lcni\n"));
  assert!(script.contains("-f sub-S02_task-rest_run-03_bold"));
  assert_eq!(scheduler.submitted.borrow().len(), 2);
  assert_eq!(*scheduler.throttle_calls.borrow(), 2);

  let description = fs::read_to_string(bids.join("dataset_description.json")).unwrap();
  assert!(description.contains("\"Name\": \"myproject\""));
  let participants = fs::read_to_string(bids.join("participants.tsv")).unwrap();
  assert!(participants.contains("sub-S01\t"));
  assert!(participants.contains("sub-S02\t"));
}

#[test]
fn test_convert_locally_without_metadata_files() {
  let temp_dir = TempDir::new().unwrap();
  let dicom = temp_dir.path().join("dicom");
  let bids = temp_dir.path().join("bids");
  create_dicom_tree(&dicom, "S01_20200131_1", &["Series_1_localizer"]);
  let options = ConvertOptions {
    modules: vec![],
    participant_file: false,
    description_file: false,
    ..Default::default()
  };

  let conversions = convert(&FakeScheduler::default(), &dicom, &bids, &create_test_map(), &options).unwrap();

  assert_eq!(conversions[0].command, "");
  assert_eq!(conversions[0].outcome, ConversionOutcome::Ran { success: true });
  assert!(!bids.join("dataset_description.json").exists());
  assert!(!bids.join("participants.tsv").exists());
}
