//! Magic actions: internal commands triggered by `workflow:<keyword>` queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::workflow::Workflow;

/// Query prefix that marks a magic action.
pub const MAGIC_PREFIX: &str = "workflow:";

/// An internal command recognised by argument parsing.
pub trait MagicAction: Send + Sync {
  /// Word typed after the prefix, e.g. `clearauth`
  fn keyword(&self) -> &str;

  fn description(&self) -> &str;

  /// Message shown while the action runs
  fn run_text(&self) -> &str;

  fn run(&self, wf: &Workflow) -> Result<()>;
}

/// Registered magic actions, keyed by keyword.
#[derive(Clone, Default)]
pub struct MagicActions {
  actions: BTreeMap<String, Arc<dyn MagicAction>>,
}

impl MagicActions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry with the built-in actions.
  pub fn with_defaults() -> Self {
    let mut actions = Self::new();
    actions.register(ClearCacheMagic);
    actions.register(InstallUpdateMagic);
    actions
  }

  /// Register an action, replacing any action with the same keyword.
  pub fn register(&mut self, action: impl MagicAction + 'static) {
    self
      .actions
      .insert(action.keyword().to_string(), Arc::new(action));
  }

  pub fn get(&self, keyword: &str) -> Option<Arc<dyn MagicAction>> {
    self.actions.get(keyword).cloned()
  }

  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }

  /// Actions matching partially typed input, best match first.
  pub fn suggestions(&self, input: &str) -> Vec<Arc<dyn MagicAction>> {
    let input_lower = input.trim().to_lowercase();

    if input_lower.is_empty() {
      return self.actions.values().cloned().collect();
    }

    let mut matches: Vec<(&Arc<dyn MagicAction>, u32)> = Vec::new();

    for action in self.actions.values() {
      let keyword = action.keyword().to_lowercase();

      if keyword == input_lower {
        matches.push((action, 0));
        continue;
      }

      if keyword.starts_with(&input_lower) {
        matches.push((action, 1));
        continue;
      }

      if keyword.contains(&input_lower) {
        matches.push((action, 2));
        continue;
      }

      if action.description().to_lowercase().contains(&input_lower) {
        matches.push((action, 3));
      }
    }

    // Stable sort keeps keyword order within a priority
    matches.sort_by_key(|(_, priority)| *priority);

    matches.into_iter().map(|(a, _)| Arc::clone(a)).collect()
  }
}

/// Built-in `delcache`: drop every cached entry.
pub struct ClearCacheMagic;

impl MagicAction for ClearCacheMagic {
  fn keyword(&self) -> &str {
    "delcache"
  }

  fn description(&self) -> &str {
    "Delete workflow cached data"
  }

  fn run_text(&self) -> &str {
    "Deleted workflow cached data"
  }

  fn run(&self, wf: &Workflow) -> Result<()> {
    wf.cache().clear()
  }
}

/// Built-in `update`: open the download of the available update.
pub struct InstallUpdateMagic;

impl MagicAction for InstallUpdateMagic {
  fn keyword(&self) -> &str {
    "update"
  }

  fn description(&self) -> &str {
    "Install workflow update"
  }

  fn run_text(&self) -> &str {
    "Fetching update…"
  }

  fn run(&self, wf: &Workflow) -> Result<()> {
    if !wf.update_available() {
      return Err(Error::NoUpdate);
    }
    wf.install_update()
  }
}
