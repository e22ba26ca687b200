//! A ready-made Script Filter: lists entries from a JSON file, kept in the
//! `items` cache and refreshed by a background job.
//!
//! Workflow variables:
//! - `account`: keychain account; when set the user must be logged in
//! - `items_file`: JSON array of `{title, subtitle?, arg?}`
//! - `cache_max_age`: seconds before the cache is refreshed (default 300)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};
use crate::helpers::{
  add_clear_auth_magic, check_for_updates, handle_authentication, handle_feedback, init_workflow,
  load_cache, refresh_cache,
};
use crate::workflow::{Invocation, Workflow};

/// Cache entry the entries are stored under.
pub const ITEMS_CACHE: &str = "items";

/// Argument that starts the refresh job.
pub const REFRESH_ARG: &str = "refresh";

#[derive(Debug, Deserialize)]
pub struct ItemsConfig {
  pub account: Option<String>,
  pub items_file: Option<PathBuf>,
  #[serde(default = "default_cache_max_age")]
  pub cache_max_age: u64,
}

fn default_cache_max_age() -> u64 {
  300
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  pub title: String,
  #[serde(default)]
  pub subtitle: Option<String>,
  #[serde(default)]
  pub arg: Option<String>,
}

/// Answer a Script Filter query.
pub fn run_query(wf: &mut Workflow) -> Result<()> {
  if let Some(account) = wf.settings().get("account").map(str::to_string) {
    add_clear_auth_magic(wf, &account);
  }

  let config: ItemsConfig = init_workflow(wf)?;
  let query = match wf.args()? {
    Invocation::Query(words) => words.join(" ").trim().to_lowercase(),
    Invocation::Magic => return Ok(()),
  };

  check_for_updates(wf)?;

  if let Some(account) = &config.account {
    handle_authentication(wf, account)?;
    if wf.is_feedback_sent() {
      return Ok(());
    }
  }

  refresh_cache(
    wf,
    ITEMS_CACHE,
    Duration::from_secs(config.cache_max_age),
    REFRESH_ARG,
  )?;
  if wf.is_feedback_sent() {
    return Ok(());
  }

  let mut entries: Vec<Entry> = Vec::new();
  load_cache(wf, ITEMS_CACHE, &mut entries)?;

  for entry in entries
    .iter()
    .filter(|e| query.is_empty() || e.title.to_lowercase().contains(&query))
  {
    let item = wf.new_item(entry.title.as_str());
    if let Some(subtitle) = &entry.subtitle {
      item.subtitle(subtitle.as_str());
    }
    if let Some(arg) = &entry.arg {
      item.arg(arg.as_str()).valid(true);
    }
  }

  handle_feedback(wf)
}

/// Background job: copy `items_file` into the cache.
pub fn run_refresh(wf: &Workflow) -> Result<usize> {
  let config: ItemsConfig = wf.config()?;
  let path = config.items_file.ok_or(Error::MissingSetting("items_file"))?;

  let data = std::fs::read_to_string(&path).map_err(|source| Error::ItemsRead {
    path: path.clone(),
    source,
  })?;
  let entries: Vec<Entry> =
    serde_json::from_str(&data).map_err(|source| Error::ItemsParse { path, source })?;

  wf.cache().store_json(ITEMS_CACHE, &entries)?;
  info!("Cached {} items", entries.len());
  Ok(entries.len())
}
