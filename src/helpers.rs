//! Convenience helpers every workflow binary calls.
//!
//! A typical Script Filter run looks like:
//!
//! ```ignore
//! let mut wf = Workflow::builder().github_repo("owner/repo").build()?;
//! add_clear_auth_magic(&mut wf, ACCOUNT);
//! let cfg: Config = init_workflow(&mut wf)?;
//! if wf.is_feedback_sent() {
//!     return Ok(()); // magic query
//! }
//!
//! check_for_updates(&mut wf)?;
//! handle_authentication(&mut wf, ACCOUNT)?;
//! refresh_cache(&mut wf, "items", Duration::from_secs(300), "refresh")?;
//!
//! let mut items: Vec<Entry> = Vec::new();
//! load_cache(&wf, "items", &mut items)?;
//! for item in items { wf.new_item(item.title); }
//!
//! handle_feedback(&mut wf)?;
//! ```

use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};
use crate::feedback::Icon;
use crate::magic::{MagicAction, MAGIC_PREFIX};
use crate::workflow::Workflow;

/// Job name of the background update check.
pub const UPDATE_JOB: &str = "update";

/// Job name of the background cache refresh.
pub const CACHE_JOB: &str = "cache";

/// Argument the auth prompt passes to the next workflow step.
pub const AUTH_ARG: &str = "auth";

/// Seconds before Alfred re-runs the Script Filter while a cache refreshes.
pub const REFRESH_RERUN_SECS: f64 = 2.0;

/// Magic action that deletes the stored credential for an account.
pub struct ClearAuthMagic {
  account: String,
}

impl ClearAuthMagic {
  pub fn new(account: impl Into<String>) -> Self {
    Self {
      account: account.into(),
    }
  }
}

impl MagicAction for ClearAuthMagic {
  fn keyword(&self) -> &str {
    "clearauth"
  }

  fn description(&self) -> &str {
    "Clear credentials."
  }

  fn run_text(&self) -> &str {
    "Credentials cleared!"
  }

  fn run(&self, wf: &Workflow) -> Result<()> {
    clear_auth(wf, &self.account)
  }
}

/// Delete the credential stored for `account`.
pub fn clear_auth(wf: &Workflow, account: &str) -> Result<()> {
  wf.keychain().delete(account)
}

/// Register `workflow:clearauth` for `account`.
pub fn add_clear_auth_magic(wf: &mut Workflow, account: &str) {
  wf.add_magic(ClearAuthMagic::new(account));
}

/// Parse arguments and decode the workflow configuration into `T`.
///
/// Magic queries are handled (and their feedback sent) during parsing;
/// callers should stop once `wf.is_feedback_sent()`.
pub fn init_workflow<T: DeserializeOwned>(wf: &mut Workflow) -> Result<T> {
  wf.args()?;
  wf.config()
}

/// Start a background update check when one is due, and advertise an
/// available update as the first result.
pub fn check_for_updates(wf: &mut Workflow) -> Result<()> {
  if wf.update_check_due() && !wf.is_running(UPDATE_JOB) {
    info!("Running update check in background...");
    wf.run_in_background(UPDATE_JOB, &[UPDATE_JOB])
      .map_err(|e| Error::UpdateCheck(Box::new(e)))?;
  }

  if wf.update_available() {
    let autocomplete = format!("{}update", MAGIC_PREFIX);
    let already_shown = wf
      .feedback()
      .items()
      .iter()
      .any(|item| item.autocomplete_text() == Some(autocomplete.as_str()));

    if !already_shown {
      wf.suppress_uids(true);
      wf.new_item("Update Available!")
        .subtitle("Press ⏎ to install")
        .autocomplete(autocomplete)
        .valid(false)
        .icon(Icon::INFO);
    }
  }

  Ok(())
}

/// Send feedback, with a placeholder if nothing was added.
pub fn handle_feedback(wf: &mut Workflow) -> Result<()> {
  if wf.is_empty() {
    wf.new_item("No results found...")
      .subtitle("Try a different query?")
      .icon(Icon::INFO);
  }
  wf.send_feedback()
}

/// Decode the cache entry `name` into `out`; `out` is untouched if the entry
/// doesn't exist.
pub fn load_cache<T: DeserializeOwned>(wf: &Workflow, name: &str, out: &mut T) -> Result<()> {
  if wf.cache().exists(name)? {
    if let Some(value) = wf.cache().load_json(name)? {
      *out = value;
    }
  }
  Ok(())
}

/// Refresh an expired cache in the background.
///
/// While the entry is expired Alfred is asked to re-run the Script Filter.
/// If there is nothing cached yet, a placeholder is sent right away.
pub fn refresh_cache(wf: &mut Workflow, name: &str, max_age: Duration, job_arg: &str) -> Result<()> {
  if !wf.cache().expired(name, max_age)? {
    return Ok(());
  }

  wf.rerun(REFRESH_RERUN_SECS);
  if !wf.is_running(CACHE_JOB) {
    wf.run_in_background(CACHE_JOB, &[job_arg])?;
  } else {
    info!("{} job already running.", CACHE_JOB);
  }

  let mut cached = serde_json::Value::Null;
  load_cache(wf, name, &mut cached)?;

  if is_empty_value(&cached) {
    wf.new_item("Refreshing cache…").icon(Icon::INFO);
    handle_feedback(wf)?;
  }
  Ok(())
}

fn is_empty_value(value: &serde_json::Value) -> bool {
  use serde_json::Value;
  match value {
    Value::Null => true,
    Value::Array(items) => items.is_empty(),
    Value::Object(map) => map.is_empty(),
    Value::String(s) => s.is_empty(),
    Value::Bool(_) | Value::Number(_) => false,
  }
}

/// Prompt for authentication when no credential is stored for `account`.
///
/// Sends feedback when it prompts; callers should stop once
/// `wf.is_feedback_sent()`.
pub fn handle_authentication(wf: &mut Workflow, account: &str) -> Result<()> {
  if wf.keychain().get(account).is_err() {
    wf.new_item("You're not logged in.")
      .subtitle("Press ⏎ to authenticate")
      .icon(Icon::INFO)
      .arg(AUTH_ARG)
      .valid(true);
    handle_feedback(wf)?;
  }
  Ok(())
}
