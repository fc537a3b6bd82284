use log::{debug, info};
use serde::Serialize;
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::core::bids::BidsError;

pub const BIDS_VERSION: &str = "1.3.0";
pub const DESCRIPTION_FILE: &str = "dataset_description.json";
pub const PARTICIPANTS_FILE: &str = "participants.tsv";
pub const PARTICIPANTS_SIDECAR: &str = "participants.json";

const ACKNOWLEDGEMENTS: &str = "BIDS conversion was performed using dcm2niix and slurmbids.";
const DCM2NIIX_REFERENCE: &str = "Li X, Morgan PS, Ashburner J, Smith J, Rorden C (2016) The first step for neuroimaging data analysis: DICOM to NIfTI conversion. J Neurosci Methods. 264:47-56. doi: 10.1016/j.jneumeth.2016.03.001.";

const PARTICIPANT_COLUMNS: [&str; 3] = ["participant_id", "age", "sex"];
const MISSING_VALUE: &str = "n/a";

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetDescription {
  pub name: String,
  #[serde(rename = "BIDSVersion")]
  pub bids_version: String,
  pub authors: Vec<String>,
  pub acknowledgements: String,
  pub references_and_links: Vec<String>,
}

impl DatasetDescription {
  pub fn new(name: &str, authors: &[String]) -> Self {
    DatasetDescription {
      name: name.to_string(),
      bids_version: BIDS_VERSION.to_string(),
      authors: authors.to_vec(),
      acknowledgements: ACKNOWLEDGEMENTS.to_string(),
      references_and_links: vec![DCM2NIIX_REFERENCE.to_string()],
    }
  }
}

/// Write `dataset_description.json` unless it already exists.
/// Returns whether a file was written.
pub fn write_dataset_description(
  bids_dir: &Path,
  project_name: &str,
  authors: &[String],
) -> Result<bool, BidsError> {
  let path = bids_dir.join(DESCRIPTION_FILE);
  if path.exists() {
    debug!("{} already exists", path.display());
    return Ok(false);
  }
  let description = DatasetDescription::new(project_name, authors);
  fs::write(&path, serde_json::to_string_pretty(&description)?)?;
  info!("Wrote {}", path.display());
  Ok(true)
}

/// Add `sub-<subject>` to `participants.tsv`, creating it (and its JSON
/// sidecar) on first use. Demographic columns are written as `n/a`.
/// Returns whether a row was appended.
pub fn append_participant(bids_dir: &Path, subject: &str) -> Result<bool, BidsError> {
  fs::create_dir_all(bids_dir)?;
  let path = bids_dir.join(PARTICIPANTS_FILE);
  let participant_id = format!("sub-{}", subject);

  let columns: Vec<String> = if path.exists() {
    let content = fs::read_to_string(&path)?;
    let mut lines = content.lines();
    let columns: Vec<String> = lines
      .next()
      .unwrap_or_default()
      .split('\t')
      .map(str::to_string)
      .collect();
    let id_column = columns
      .iter()
      .position(|c| c == "participant_id")
      .unwrap_or(0);
    let present = lines.any(|line| line.split('\t').nth(id_column) == Some(participant_id.as_str()));
    if present {
      debug!("{} already listed in {}", participant_id, path.display());
      return Ok(false);
    }
    columns
  } else {
    fs::write(&path, format!("{}\n", PARTICIPANT_COLUMNS.join("\t")))?;
    write_participants_sidecar(bids_dir)?;
    PARTICIPANT_COLUMNS.iter().map(|c| c.to_string()).collect()
  };

  let row: Vec<&str> = columns
    .iter()
    .map(|column| {
      if column == "participant_id" {
        participant_id.as_str()
      } else {
        MISSING_VALUE
      }
    })
    .collect();
  let mut file = OpenOptions::new().append(true).open(&path)?;
  file.write_all(format!("{}\n", row.join("\t")).as_bytes())?;
  info!("Added {} to {}", participant_id, path.display());
  Ok(true)
}

fn write_participants_sidecar(bids_dir: &Path) -> Result<(), BidsError> {
  let sidecar = json!({
    "age": {"Description": "age of participant", "Units": "years"},
    "sex": {
      "Description": "sex of participant",
      "Levels": {"M": "male", "F": "female", "O": "other"}
    }
  });
  fs::write(
    bids_dir.join(PARTICIPANTS_SIDECAR),
    serde_json::to_string_pretty(&sidecar)?,
  )?;
  Ok(())
}
