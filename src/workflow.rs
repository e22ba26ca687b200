//! The workflow handle: one invocation of an Alfred workflow.

use serde::de::DeserializeOwned;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::{Cache, SqliteStorage, CACHE_DB_FILE};
use crate::config::{Environment, Settings, DEFAULT_BUNDLE_ID};
use crate::error::{Error, Result};
use crate::feedback::{Feedback, Icon, Item};
use crate::jobs::{DetachedLauncher, JobRegistry, PidFileRegistry, ProcessLauncher};
use crate::keychain::{Keychain, KeyringKeychain};
use crate::magic::{MagicAction, MagicActions, MAGIC_PREFIX};
use crate::update::{GitHubUpdater, Updater};

/// What the process arguments asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
  /// A normal query; the arguments after the program name
  Query(Vec<String>),
  /// A magic query was handled and feedback already sent
  Magic,
}

/// Runtime session for one workflow invocation.
///
/// Owns every collaborator the helpers need: settings, keychain, cache, job
/// registry, process launcher, updater and the feedback buffer.
pub struct Workflow {
  env: Environment,
  settings: Settings,
  program: PathBuf,
  args: Vec<String>,
  invocation: Option<Invocation>,
  keychain: Box<dyn Keychain>,
  cache: Cache,
  jobs: Box<dyn JobRegistry>,
  launcher: Box<dyn ProcessLauncher>,
  updater: Option<Box<dyn Updater>>,
  magic: MagicActions,
  feedback: Feedback,
  output: Box<dyn Write + Send>,
}

impl Workflow {
  pub fn builder() -> WorkflowBuilder {
    WorkflowBuilder::default()
  }

  pub fn env(&self) -> &Environment {
    &self.env
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub fn settings_mut(&mut self) -> &mut Settings {
    &mut self.settings
  }

  /// Decode the persisted configuration into `T`.
  pub fn config<T: DeserializeOwned>(&self) -> Result<T> {
    self.settings.decode()
  }

  pub fn keychain(&self) -> &dyn Keychain {
    self.keychain.as_ref()
  }

  pub fn cache(&self) -> &Cache {
    &self.cache
  }

  /// Path of the running executable (`argv[0]`).
  pub fn program(&self) -> &Path {
    &self.program
  }

  pub fn magic_actions(&self) -> &MagicActions {
    &self.magic
  }

  pub fn add_magic(&mut self, action: impl MagicAction + 'static) {
    self.magic.register(action);
  }

  /// Parse the process arguments, handling magic queries.
  ///
  /// The first call does the work; later calls return the same result.
  pub fn args(&mut self) -> Result<Invocation> {
    if let Some(invocation) = &self.invocation {
      return Ok(invocation.clone());
    }

    let Some(query) = self
      .args
      .iter()
      .find_map(|a| a.strip_prefix(MAGIC_PREFIX))
      .map(str::to_string)
    else {
      let invocation = Invocation::Query(self.args.clone());
      self.invocation = Some(invocation.clone());
      return Ok(invocation);
    };

    // Recorded before running so a failed action never runs twice.
    self.invocation = Some(Invocation::Magic);
    self.handle_magic(&query)?;
    Ok(Invocation::Magic)
  }

  fn handle_magic(&mut self, query: &str) -> Result<()> {
    if let Some(action) = self.magic.get(query) {
      info!("Running magic action: {}", action.keyword());
      self.new_item(action.run_text()).icon(Icon::BUSY).valid(false);
      self.send_feedback()?;

      if let Err(e) = action.run(self) {
        error!("Error running magic action {}: {}", action.description(), e);
        return Err(e);
      }
      return Ok(());
    }

    let suggestions = self.magic.suggestions(query);
    if suggestions.is_empty() {
      self
        .new_item("No matching magic actions")
        .subtitle("Try a different query?")
        .icon(Icon::WARNING);
    }
    for action in suggestions {
      self
        .new_item(action.keyword())
        .subtitle(action.description())
        .autocomplete(format!("{}{}", MAGIC_PREFIX, action.keyword()))
        .uid(action.description())
        .valid(false)
        .icon(Icon::WORKFLOW);
    }
    self.send_feedback()
  }

  pub fn is_running(&self, job: &str) -> bool {
    self.jobs.is_running(job)
  }

  /// Re-run this workflow's executable with `args` as a detached job.
  pub fn run_in_background(&self, job: &str, args: &[&str]) -> Result<()> {
    if self.jobs.is_running(job) {
      return Err(Error::JobRunning(job.to_string()));
    }

    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let pid = self
      .launcher
      .launch(self.program.as_os_str(), &args)
      .map_err(|source| Error::Spawn {
        job: job.to_string(),
        source,
      })?;

    info!("Started background job {} (pid {})", job, pid);
    self.jobs.record(job, pid)
  }

  /// Always `false` when no updater is configured.
  pub fn update_check_due(&self) -> bool {
    match &self.updater {
      Some(updater) => updater.update_check_due(),
      None => {
        debug!("No updater configured");
        false
      }
    }
  }

  pub fn update_available(&self) -> bool {
    self
      .updater
      .as_ref()
      .is_some_and(|updater| updater.update_available())
  }

  /// Open the download of the available update.
  pub fn install_update(&self) -> Result<()> {
    let url = self
      .updater
      .as_ref()
      .and_then(|updater| updater.download_url())
      .ok_or(Error::NoUpdate)?;

    info!("Opening update download {}", url);
    self
      .launcher
      .launch(OsStr::new("open"), &[url])
      .map_err(|source| Error::Spawn {
        job: "install".to_string(),
        source,
      })?;
    Ok(())
  }

  pub fn new_item(&mut self, title: impl Into<String>) -> &mut Item {
    self.feedback.new_item(title)
  }

  pub fn is_empty(&self) -> bool {
    self.feedback.is_empty()
  }

  /// Ask Alfred to re-run the Script Filter after `seconds`.
  pub fn rerun(&mut self, seconds: f64) {
    self.feedback.rerun(seconds);
  }

  pub fn suppress_uids(&mut self, suppress: bool) {
    self.feedback.suppress_uids(suppress);
  }

  pub fn feedback(&self) -> &Feedback {
    &self.feedback
  }

  pub fn is_feedback_sent(&self) -> bool {
    self.feedback.is_sent()
  }

  /// Emit all items to Alfred. Only the first call writes anything.
  pub fn send_feedback(&mut self) -> Result<()> {
    if self.feedback.is_sent() {
      warn!("Feedback already sent, ignoring");
      return Ok(());
    }
    debug!("Sending {} feedback item(s)", self.feedback.items().len());
    self.feedback.send(&mut self.output)
  }
}

/// Builder for [`Workflow`]; anything not set falls back to the real
/// implementation for the current Alfred environment.
#[derive(Default)]
pub struct WorkflowBuilder {
  bundle_id: Option<String>,
  settings: Option<Settings>,
  program: Option<PathBuf>,
  args: Option<Vec<String>>,
  keychain: Option<Box<dyn Keychain>>,
  cache: Option<Cache>,
  jobs: Option<Box<dyn JobRegistry>>,
  launcher: Option<Box<dyn ProcessLauncher>>,
  updater: Option<Box<dyn Updater>>,
  github_repo: Option<String>,
  update_interval: Option<Duration>,
  magic: Option<MagicActions>,
  output: Option<Box<dyn Write + Send>>,
}

impl WorkflowBuilder {
  /// Bundle id used when Alfred doesn't provide one.
  pub fn bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
    self.bundle_id = Some(bundle_id.into());
    self
  }

  pub fn settings(mut self, settings: Settings) -> Self {
    self.settings = Some(settings);
    self
  }

  pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
    self.program = Some(program.into());
    self
  }

  /// Arguments after the program name.
  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args = Some(args.into_iter().map(Into::into).collect());
    self
  }

  pub fn keychain(mut self, keychain: impl Keychain + 'static) -> Self {
    self.keychain = Some(Box::new(keychain));
    self
  }

  pub fn cache(mut self, cache: Cache) -> Self {
    self.cache = Some(cache);
    self
  }

  pub fn jobs(mut self, jobs: impl JobRegistry + 'static) -> Self {
    self.jobs = Some(Box::new(jobs));
    self
  }

  pub fn launcher(mut self, launcher: impl ProcessLauncher + 'static) -> Self {
    self.launcher = Some(Box::new(launcher));
    self
  }

  pub fn updater(mut self, updater: impl Updater + 'static) -> Self {
    self.updater = Some(Box::new(updater));
    self
  }

  /// Check `owner/name` GitHub releases for updates.
  pub fn github_repo(mut self, repo: impl Into<String>) -> Self {
    self.github_repo = Some(repo.into());
    self
  }

  pub fn update_interval(mut self, interval: Duration) -> Self {
    self.update_interval = Some(interval);
    self
  }

  pub fn magic_actions(mut self, magic: MagicActions) -> Self {
    self.magic = Some(magic);
    self
  }

  /// Where feedback is written (stdout by default).
  pub fn output(mut self, output: impl Write + Send + 'static) -> Self {
    self.output = Some(Box::new(output));
    self
  }

  pub fn build(self) -> Result<Workflow> {
    let fallback_bundle_id = self.bundle_id.as_deref().unwrap_or(DEFAULT_BUNDLE_ID);

    let (env, settings) = match self.settings {
      Some(settings) => (Environment::resolve(&settings, fallback_bundle_id)?, settings),
      None => {
        let env = Environment::resolve(&Settings::from_env(), fallback_bundle_id)?;
        let settings = Settings::load(&env.data_dir)?;
        (env, settings)
      }
    };

    let (program, args) = match (self.program, self.args) {
      (Some(program), Some(args)) => (program, args),
      (program, args) => {
        let mut process_args = std::env::args();
        let argv0 = process_args.next().map(PathBuf::from);
        let program = match program.or(argv0) {
          Some(p) => p,
          None => std::env::current_exe()?,
        };
        (program, args.unwrap_or_else(|| process_args.collect()))
      }
    };

    let cache = match self.cache {
      Some(cache) => cache,
      None => Cache::new(SqliteStorage::open(&env.cache_dir.join(CACHE_DB_FILE))?),
    };

    let updater: Option<Box<dyn Updater>> = match (self.updater, self.github_repo) {
      (Some(updater), _) => Some(updater),
      (None, Some(repo)) => {
        let mut updater = GitHubUpdater::new(&repo, &env.version, cache.clone())?;
        if let Some(interval) = self.update_interval {
          updater = updater.with_interval(interval);
        }
        Some(Box::new(updater))
      }
      (None, None) => None,
    };

    let keychain = self
      .keychain
      .unwrap_or_else(|| Box::new(KeyringKeychain::new(env.bundle_id.clone())));
    let jobs = self
      .jobs
      .unwrap_or_else(|| Box::new(PidFileRegistry::new(env.cache_dir.join("_aw").join("jobs"))));

    Ok(Workflow {
      settings,
      program,
      args,
      invocation: None,
      keychain,
      cache,
      jobs,
      launcher: self.launcher.unwrap_or_else(|| Box::new(DetachedLauncher)),
      updater,
      magic: self.magic.unwrap_or_else(MagicActions::with_defaults),
      feedback: Feedback::new(),
      output: self
        .output
        .unwrap_or_else(|| Box::new(std::io::stdout())),
      env,
    })
  }
}
