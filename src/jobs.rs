//! Background jobs: detached re-invocations of the workflow binary.
//!
//! A job is identified by name. The registry remembers the pid of the process
//! started for each name so a second copy is never launched while the first
//! is alive.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::warn;

use crate::error::Result;

/// Tracks which named jobs have a live process.
pub trait JobRegistry: Send + Sync {
  fn is_running(&self, job: &str) -> bool;

  /// Remember `pid` as the process running `job`.
  fn record(&self, job: &str, pid: u32) -> Result<()>;
}

/// Starts processes detached from the caller's stdio.
pub trait ProcessLauncher: Send + Sync {
  /// Start `program` with `args`, returning its pid.
  fn launch(&self, program: &OsStr, args: &[String]) -> std::io::Result<u32>;
}

/// Job registry storing one pid file per job.
pub struct PidFileRegistry {
  dir: PathBuf,
}

impl PidFileRegistry {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn pid_file(&self, job: &str) -> PathBuf {
    self.dir.join(format!("{}.pid", job))
  }

  fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
  }
}

impl JobRegistry for PidFileRegistry {
  fn is_running(&self, job: &str) -> bool {
    let path = self.pid_file(job);
    if !path.exists() {
      return false;
    }

    match Self::read_pid(&path) {
      Some(pid) if process_alive(pid) => true,
      _ => {
        warn!("Removing stale pid file for job {}", job);
        if let Err(e) = std::fs::remove_file(&path) {
          warn!("Failed to remove {}: {}", path.display(), e);
        }
        false
      }
    }
  }

  fn record(&self, job: &str, pid: u32) -> Result<()> {
    std::fs::create_dir_all(&self.dir)?;
    std::fs::write(self.pid_file(job), pid.to_string())?;
    Ok(())
  }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
  use nix::errno::Errno;
  use nix::sys::signal::kill;
  use nix::unistd::Pid;

  let Ok(pid) = i32::try_from(pid) else {
    return false;
  };
  // No signal: only checks the process exists. EPERM means it exists but
  // belongs to someone else.
  matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
  true
}

/// Launcher that starts processes with null stdio in their own process group.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLauncher;

impl ProcessLauncher for DetachedLauncher {
  fn launch(&self, program: &OsStr, args: &[String]) -> std::io::Result<u32> {
    let mut cmd = Command::new(program);
    cmd
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null());

    #[cfg(unix)]
    {
      use std::os::unix::process::CommandExt;
      cmd.process_group(0);
    }

    let child = cmd.spawn()?;
    Ok(child.id())
  }
}
