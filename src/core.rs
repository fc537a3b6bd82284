pub mod bids;
pub mod jobs;
pub mod parsers;
pub mod settings;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use crate::core::bids::{ConvertOptions, SubjectConversion};
use crate::core::jobs::descriptor::JobDescriptor;
use crate::core::jobs::script::{RenderedScript, write_script};
use crate::core::jobs::slurm::SlurmScheduler;
use crate::core::jobs::status::JobStatuses;
use crate::core::jobs::wait::{WaitOutcome, wait_until_complete};
use crate::core::jobs::{JobHandle, Scheduler};
use crate::core::parsers::JobDefaults;
use crate::core::settings::Settings;

pub struct Slurmbids {
  path: PathBuf,
  settings: Settings,
  scheduler: Box<dyn Scheduler>,
}

#[derive(thiserror::Error, Debug)]
pub enum SlurmbidsError {
  #[error("Settings Error: {0}")]
  SettingsError(#[from] settings::SettingsError),
  #[error("Parser Error: {0}")]
  ParserError(#[from] parsers::ParserError),
  #[error("Job Error: {0}")]
  JobError(#[from] jobs::JobError),
  #[error("BIDS Error: {0}")]
  BidsError(#[from] bids::BidsError),
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
}

impl Slurmbids {
  pub fn new() -> Result<Self, SlurmbidsError> {
    let _ = env_logger::try_init();

    let path = std::env::current_dir()?;
    let settings = settings::load_settings(&path)?;
    let scheduler = SlurmScheduler::new(settings.throttle_command.clone());
    Ok(Slurmbids::with_scheduler(path, settings, Box::new(scheduler)))
  }

  pub fn with_scheduler(path: PathBuf, settings: Settings, scheduler: Box<dyn Scheduler>) -> Self {
    Slurmbids {
      path,
      settings,
      scheduler,
    }
  }

  /// Create the local `.slurmbids` directory under `path` and make sure the
  /// global settings file exists
  pub fn init(path: &Path) -> Result<PathBuf, SlurmbidsError> {
    let dir = settings::init_local_dir(path)?;
    let global = settings::get_settings_global()?;
    settings::set_settings_global(&global)?;
    Ok(dir)
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  /// Store the default account, in the nearest local settings or globally
  pub fn set_account(&mut self, name: &str, local: bool) -> Result<(), SlurmbidsError> {
    if local {
      let dir = settings::find_local_dir(&self.path)?;
      let mut local_settings = settings::get_settings_local(&dir)?;
      local_settings.account = Some(name.to_string());
      settings::set_settings_local(&dir, &local_settings)?;
    } else {
      let mut global = settings::get_settings_global()?;
      global.account = Some(name.to_string());
      settings::set_settings_global(&global)?;
    }
    self.settings.account = Some(name.to_string());
    Ok(())
  }

  pub fn load_job(&self, file: &Path) -> Result<JobDescriptor, SlurmbidsError> {
    Ok(parsers::parse_job_from_file(
      file,
      &JobDefaults::from(&self.settings),
    )?)
  }

  /// Render the job described in `file`. The script lands next to the job
  /// file as `<name>.srun` unless `output` is given.
  pub fn write_job(
    &self,
    file: &Path,
    output: Option<&Path>,
  ) -> Result<RenderedScript, SlurmbidsError> {
    let job = self.load_job(file)?;
    let path = match output {
      Some(path) => path.to_path_buf(),
      None => file
        .parent()
        .unwrap_or(Path::new("."))
        .join(job.default_script_name()),
    };
    Ok(write_script(&job, &path)?)
  }

  /// Render and submit the job described in `file`
  pub fn submit(
    &self,
    file: &Path,
    output: Option<&Path>,
  ) -> Result<Option<JobHandle>, SlurmbidsError> {
    let script = self.write_job(file, output)?;
    Ok(jobs::submit_script(self.scheduler.as_ref(), &script.path)?)
  }

  pub fn wrap(&self, job: &JobDescriptor) -> Result<Option<JobHandle>, SlurmbidsError> {
    Ok(jobs::wrap_job(self.scheduler.as_ref(), job)?)
  }

  pub fn status(&self, handle: &JobHandle) -> Result<JobStatuses, SlurmbidsError> {
    Ok(jobs::job_statuses(self.scheduler.as_ref(), handle)?)
  }

  pub fn info(&self, handle: &JobHandle, fields: &[&str]) -> Result<String, SlurmbidsError> {
    Ok(jobs::job_info(self.scheduler.as_ref(), handle, fields)?)
  }

  pub fn wait(&self, handle: &JobHandle) -> Result<WaitOutcome, SlurmbidsError> {
    Ok(wait_until_complete(
      self.scheduler.as_ref(),
      handle,
      &self.settings.wait_options(),
    )?)
  }

  /// Mail `email`, or the configured address, once `handle` ends
  pub fn notify(
    &self,
    handle: &JobHandle,
    email: Option<&str>,
  ) -> Result<Option<JobHandle>, SlurmbidsError> {
    let email = email.or(self.settings.email.as_deref());
    Ok(jobs::notify(
      self.scheduler.as_ref(),
      handle,
      email,
      self.settings.account.as_deref(),
    )?)
  }

  /// Output and error files of `handle` for the job described in `file`
  pub fn output_files(
    &self,
    file: &Path,
    handle: &JobHandle,
    extension: Option<&str>,
  ) -> Result<Vec<PathBuf>, SlurmbidsError> {
    let job = self.load_job(file)?;
    Ok(jobs::output_files(&job, handle, extension)?)
  }

  /// Conversion options seeded from the settings
  pub fn convert_options(&self) -> ConvertOptions {
    ConvertOptions {
      modules: self.settings.modules(),
      authors: self.settings.authors().to_vec(),
      account: self.settings.account.clone(),
      ..Default::default()
    }
  }

  pub fn convert(
    &self,
    dicom_dir: &Path,
    bids_dir: &Path,
    map_file: &Path,
    options: &ConvertOptions,
  ) -> Result<Vec<SubjectConversion>, SlurmbidsError> {
    let map = parsers::parse_bids_map_from_file(map_file)?;
    Ok(bids::convert(
      self.scheduler.as_ref(),
      dicom_dir,
      bids_dir,
      &map,
      options,
    )?)
  }
}
