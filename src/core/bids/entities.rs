use hashlink::LinkedHashMap;
use strum::{Display, EnumString};

use crate::core::bids::BidsError;

/// Data type directories of a BIDS subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Datatype {
  Anat,
  Func,
  Dwi,
  Fmap,
  Meg,
  Eeg,
  Ieeg,
  Beh,
}

impl Datatype {
  /// Known suffixes, for the data types that are validated
  pub fn suffixes(&self) -> Option<&'static [&'static str]> {
    match self {
      Datatype::Anat => Some(&[
        "T1w", "T2w", "FLAIR", "T1rho", "T1map", "T2map", "T2star", "FLASH", "PD", "PDmap",
        "PDT2", "inplaneT1", "inplaneT2", "angio", "defacemask",
      ]),
      Datatype::Fmap => Some(&[
        "phasediff",
        "phase1",
        "phase2",
        "magnitude1",
        "magnitude2",
        "magnitude",
        "fieldmap",
        "epi",
      ]),
      Datatype::Dwi => Some(&["dwi", "bvec", "bval"]),
      Datatype::Func => Some(&["bold", "cbv", "phase", "sbref", "events", "physio", "stim"]),
      Datatype::Meg | Datatype::Eeg | Datatype::Ieeg | Datatype::Beh => None,
    }
  }
}

/// Order in which entities appear in a file name
pub const ENTITY_ORDER: [&str; 12] = [
  "ses",
  "task",
  "acq",
  "ce",
  "rec",
  "dir",
  "run",
  "mod",
  "echo",
  "recording",
  "proc",
  "space",
];

/// Where a series lands in the BIDS tree and how its files are named
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChain {
  datatype: Datatype,
  suffix: String,
  entities: LinkedHashMap<String, String>,
}

impl EntityChain {
  /// Validates the suffix against the data type unless `nonstandard` is set.
  /// `run` is always taken from the series number and cannot be given here.
  pub fn new(
    datatype: Datatype,
    suffix: &str,
    entities: LinkedHashMap<String, String>,
    nonstandard: bool,
  ) -> Result<Self, BidsError> {
    if !nonstandard {
      if let Some(allowed) = datatype.suffixes() {
        if !allowed.contains(&suffix) {
          return Err(BidsError::UnknownSuffix {
            suffix: suffix.to_string(),
            datatype: datatype.to_string(),
            allowed: allowed.join(", "),
          });
        }
      }
    }
    for key in entities.keys() {
      if !ENTITY_ORDER.contains(&key.as_str()) {
        return Err(BidsError::UnknownEntity(key.clone()));
      }
    }
    let mut entities = entities;
    entities.remove("run");

    Ok(EntityChain {
      datatype,
      suffix: suffix.to_string(),
      entities,
    })
  }

  pub fn datatype(&self) -> Datatype {
    self.datatype
  }

  pub fn suffix(&self) -> &str {
    &self.suffix
  }

  pub fn entity(&self, key: &str) -> Option<&str> {
    self.entities.get(key).map(String::as_str)
  }

  pub fn session(&self) -> Option<&str> {
    self.entity("ses")
  }

  pub fn task(&self) -> Option<&str> {
    self.entity("task")
  }

  /// File name without extension, e.g. `sub-01_task-rest_run-02_bold`
  pub fn file_stem(&self, subject: &str, run: u32) -> String {
    let run = format!("{:02}", run);
    let mut stem = format!("sub-{}_", subject);
    for key in ENTITY_ORDER {
      let value = if key == "run" {
        Some(run.as_str())
      } else {
        self.entity(key)
      };
      if let Some(value) = value {
        stem.push_str(&format!("{}-{}_", key, value));
      }
    }
    stem.push_str(&self.suffix);
    stem
  }
}

/// Maps series descriptions to entity chains
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BidsMap {
  pub series: LinkedHashMap<String, EntityChain>,
  /// Key/value pairs written into every converted JSON sidecar
  pub json_mod: LinkedHashMap<String, String>,
}

impl BidsMap {
  pub fn add(&mut self, series_description: impl Into<String>, chain: EntityChain) {
    self.series.insert(series_description.into(), chain);
  }

  pub fn get(&self, series_description: &str) -> Option<&EntityChain> {
    self.series.get(series_description)
  }
}
