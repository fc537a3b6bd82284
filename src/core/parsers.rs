//! YAML front ends for job descriptors and BIDS series maps.

pub mod bids;
pub mod jobs;
pub mod utils;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::core::bids::BidsError;
use crate::core::jobs::JobError;

pub use bids::parse_bids_map_from_file;
pub use jobs::{JobDefaults, parse_job_from_file};

#[derive(Error, Debug)]
pub enum ParserError {
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("YAML parsing failed: {0}")]
  YamlParseFailed(#[from] saphyr::ScanError),
  #[error("YAML file is empty!")]
  YamlEmpty,
  #[error("Missing Key: {0}")]
  MissingKey(String),
  #[error("Wrong type for value \"{0}\", expected type {1}")]
  WrongType(String, String),
  #[error("Invalid job: {0}")]
  Job(#[from] JobError),
  #[error("Invalid BIDS map: {0}")]
  Bids(#[from] BidsError),
}
