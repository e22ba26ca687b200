//! Fakes for exercising workflow helpers without touching the OS.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::{Cache, SqliteStorage};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::jobs::{JobRegistry, ProcessLauncher};
use crate::keychain::Keychain;
use crate::update::Updater;
use crate::workflow::Workflow;

pub const PROGRAM: &str = "/usr/local/bin/workflow";

/// In-memory keychain.
#[derive(Clone, Default)]
pub struct MemoryKeychain {
  secrets: Arc<Mutex<HashMap<String, String>>>,
  broken: Arc<AtomicBool>,
}

impl MemoryKeychain {
  /// Make every operation fail with a backend error.
  pub fn break_storage(&self) {
    self.broken.store(true, Ordering::SeqCst);
  }

  fn check(&self, account: &str) -> Result<()> {
    if self.broken.load(Ordering::SeqCst) {
      return Err(Error::Keychain {
        account: account.to_string(),
        source: keyring::Error::NoStorageAccess(Box::new(std::io::Error::other("locked"))),
      });
    }
    Ok(())
  }
}

impl Keychain for MemoryKeychain {
  fn get(&self, account: &str) -> Result<String> {
    self.check(account)?;
    self
      .secrets
      .lock()
      .unwrap()
      .get(account)
      .cloned()
      .ok_or_else(|| Error::CredentialNotFound {
        account: account.to_string(),
      })
  }

  fn set(&self, account: &str, secret: &str) -> Result<()> {
    self.check(account)?;
    self
      .secrets
      .lock()
      .unwrap()
      .insert(account.to_string(), secret.to_string());
    Ok(())
  }

  fn delete(&self, account: &str) -> Result<()> {
    self.check(account)?;
    match self.secrets.lock().unwrap().remove(account) {
      Some(_) => Ok(()),
      None => Err(Error::CredentialNotFound {
        account: account.to_string(),
      }),
    }
  }
}

/// Launcher that records launches instead of starting processes.
#[derive(Clone, Default)]
pub struct RecordingLauncher {
  launches: Arc<Mutex<Vec<(String, Vec<String>)>>>,
  fail: Arc<AtomicBool>,
  next_pid: Arc<AtomicU32>,
}

impl RecordingLauncher {
  pub fn fail(&self, fail: bool) {
    self.fail.store(fail, Ordering::SeqCst);
  }

  pub fn launches(&self) -> Vec<(String, Vec<String>)> {
    self.launches.lock().unwrap().clone()
  }
}

impl ProcessLauncher for RecordingLauncher {
  fn launch(&self, program: &OsStr, args: &[String]) -> std::io::Result<u32> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "launch refused",
      ));
    }
    self
      .launches
      .lock()
      .unwrap()
      .push((program.to_string_lossy().into_owned(), args.to_vec()));
    Ok(1000 + self.next_pid.fetch_add(1, Ordering::SeqCst))
  }
}

/// Job registry where a recorded job stays running.
#[derive(Clone, Default)]
pub struct FakeJobs {
  running: Arc<Mutex<HashMap<String, u32>>>,
}

impl FakeJobs {
  pub fn set_running(&self, job: &str) {
    self.running.lock().unwrap().insert(job.to_string(), 1);
  }
}

impl JobRegistry for FakeJobs {
  fn is_running(&self, job: &str) -> bool {
    self.running.lock().unwrap().contains_key(job)
  }

  fn record(&self, job: &str, pid: u32) -> Result<()> {
    self.running.lock().unwrap().insert(job.to_string(), pid);
    Ok(())
  }
}

/// Updater with fixed answers.
#[derive(Clone, Default)]
pub struct FakeUpdater {
  pub due: bool,
  pub available: bool,
  pub url: Option<String>,
}

impl Updater for FakeUpdater {
  fn update_check_due(&self) -> bool {
    self.due
  }

  fn update_available(&self) -> bool {
    self.available
  }

  fn download_url(&self) -> Option<String> {
    self.url.clone()
  }
}

/// Write sink shared between the workflow and the test.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
  pub fn contents(&self) -> String {
    String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
  }
}

impl Write for SharedBuffer {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

/// A workflow wired to fakes, plus handles to inspect them.
pub struct Harness {
  pub wf: Workflow,
  pub output: SharedBuffer,
  pub launcher: RecordingLauncher,
  pub keychain: MemoryKeychain,
  pub jobs: FakeJobs,
}

impl Harness {
  pub fn new<I, S>(args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::build(args, None)
  }

  pub fn with_updater<I, S>(args: I, updater: FakeUpdater) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::build(args, Some(updater))
  }

  fn build<I, S>(args: I, updater: Option<FakeUpdater>) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let output = SharedBuffer::default();
    let launcher = RecordingLauncher::default();
    let keychain = MemoryKeychain::default();
    let jobs = FakeJobs::default();

    let settings = Settings::from_pairs([
      ("alfred_workflow_bundleid", "com.example.test"),
      ("alfred_workflow_cache", "/tmp/alfred-utils-test/cache"),
      ("alfred_workflow_data", "/tmp/alfred-utils-test/data"),
      ("alfred_workflow_version", "1.0.0"),
    ]);

    let mut builder = Workflow::builder()
      .settings(settings)
      .program(PROGRAM)
      .args(args)
      .keychain(keychain.clone())
      .cache(Cache::new(SqliteStorage::open_in_memory().unwrap()))
      .jobs(jobs.clone())
      .launcher(launcher.clone())
      .output(output.clone());
    if let Some(updater) = updater {
      builder = builder.updater(updater);
    }

    Self {
      wf: builder.build().unwrap(),
      output,
      launcher,
      keychain,
      jobs,
    }
  }

  /// Number of feedback payloads written.
  pub fn sends(&self) -> usize {
    self.output.contents().lines().count()
  }

  /// Feedback payloads written, parsed.
  pub fn payloads(&self) -> Vec<serde_json::Value> {
    self
      .output
      .contents()
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect()
  }

  pub fn launches(&self) -> Vec<(String, Vec<String>)> {
    self.launcher.launches()
  }
}
