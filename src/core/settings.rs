use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::jobs::wait::{DEFAULT_UNAVAILABLE_MARKER, WaitOptions};


const APP_NAME: &str = "slurmbids";
const LOCAL_DIR: &str = ".slurmbids";
const LOCAL_FILE: &str = "slurmbids.conf";

#[derive(Error, Debug)]
pub enum SettingsError {
  #[error("Filesystem error: {0}")]
  FilesystemError(#[from] std::io::Error),
  #[error("Could not find .slurmbids directory")]
  LocalDirNotFound,
  #[error("IO Error: {0}")]
  ConfyError(#[from] confy::ConfyError),
  #[error("Settings file not found at {0}")]
  SettingsNotFound(PathBuf),
}

const DEFAULT_PYTHON_INTERPRETER: &str = "/usr/bin/env python3";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_MODULES: [&str; 2] = ["dcm2niix", "jq"];

/// User settings, resolved once at startup and passed down explicitly.
/// Unset values fall back to the defaults through the accessors, so a value
/// written in a settings file always counts as set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
  /// Account charged for submitted jobs
  pub account: Option<String>,
  pub partition: Option<String>,
  /// Address used for notifications when a command gives none
  pub email: Option<String>,
  pub python_interpreter: Option<String>,
  pub poll_interval_secs: Option<u64>,
  pub unavailable_marker: Option<String>,
  /// Site script that sleeps until the queue has room for more jobs
  pub throttle_command: Option<String>,
  /// Authors written to `dataset_description.json`
  pub authors: Option<Vec<String>>,
  /// Environment modules loaded before conversion commands
  pub modules: Option<Vec<String>>,
}

impl Settings {
  pub fn python_interpreter(&self) -> &str {
    self
      .python_interpreter
      .as_deref()
      .unwrap_or(DEFAULT_PYTHON_INTERPRETER)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS))
  }

  pub fn unavailable_marker(&self) -> &str {
    self
      .unavailable_marker
      .as_deref()
      .unwrap_or(DEFAULT_UNAVAILABLE_MARKER)
  }

  pub fn authors(&self) -> &[String] {
    self.authors.as_deref().unwrap_or_default()
  }

  pub fn modules(&self) -> Vec<String> {
    match &self.modules {
      Some(modules) => modules.clone(),
      None => DEFAULT_MODULES.iter().map(|m| m.to_string()).collect(),
    }
  }

  pub fn wait_options(&self) -> WaitOptions {
    WaitOptions {
      interval: self.poll_interval(),
      unavailable_marker: self.unavailable_marker().to_string(),
    }
  }

  /// Overlay `local` on top of `self`: every value set locally wins
  pub fn merged_with(self, local: Settings) -> Settings {
    Settings {
      account: local.account.or(self.account),
      partition: local.partition.or(self.partition),
      email: local.email.or(self.email),
      python_interpreter: local.python_interpreter.or(self.python_interpreter),
      poll_interval_secs: local.poll_interval_secs.or(self.poll_interval_secs),
      unavailable_marker: local.unavailable_marker.or(self.unavailable_marker),
      throttle_command: local.throttle_command.or(self.throttle_command),
      authors: local.authors.or(self.authors),
      modules: local.modules.or(self.modules),
    }
  }
}

/// Creates the .slurmbids directory at the specified path with a default settings file
pub fn init_local_dir(path: &Path) -> Result<PathBuf, SettingsError> {
  let path = path.join(LOCAL_DIR);
  std::fs::create_dir_all(&path).map_err(SettingsError::FilesystemError)?;
  if !path.join(LOCAL_FILE).is_file() {
    set_settings_local(&path, &Settings::default())?;
  }
  Ok(path)
}

/// Searches for the .slurmbids directory starting from `start`
/// and moving up the directory tree until it finds it or reaches the user's home directory.
pub fn find_local_dir(start: &Path) -> Result<PathBuf, SettingsError> {
  let home = dirs::home_dir().unwrap_or(PathBuf::from("/"));
  let mut dir = start.to_path_buf();

  loop {
    let candidate = dir.join(LOCAL_DIR);
    if candidate.is_dir() {
      return Ok(candidate);
    }
    if dir == home {
      break;
    }
    if !dir.pop() {
      break;
    }
  }

  Err(SettingsError::LocalDirNotFound)
}

pub fn get_settings_global() -> Result<Settings, SettingsError> {
  let settings: Settings = confy::load(APP_NAME, "config")?;
  Ok(settings)
}

pub fn set_settings_global(settings: &Settings) -> Result<(), SettingsError> {
  confy::store(APP_NAME, "config", settings)?;
  Ok(())
}

pub fn get_settings_local(dir: &Path) -> Result<Settings, SettingsError> {
  let file = dir.join(LOCAL_FILE);
  if !file.is_file() {
    return Err(SettingsError::SettingsNotFound(file));
  }
  let settings: Settings = confy::load_path(file)?;
  Ok(settings)
}

pub fn set_settings_local(dir: &Path, settings: &Settings) -> Result<(), SettingsError> {
  confy::store_path(dir.join(LOCAL_FILE), settings)?;
  Ok(())
}

/// Global settings overlaid with the nearest local settings, if any
pub fn load_settings(cwd: &Path) -> Result<Settings, SettingsError> {
  let global = get_settings_global()?;
  match find_local_dir(cwd) {
    Ok(dir) => Ok(global.merged_with(get_settings_local(&dir)?)),
    Err(SettingsError::LocalDirNotFound) => Ok(global),
    Err(e) => Err(e),
  }
}
