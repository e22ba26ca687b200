//! Helpers for building Alfred workflows.
//!
//! - credentials in the OS keychain, with a `workflow:clearauth` magic action
//! - background self-update checks against GitHub releases
//! - a named JSON cache refreshed by background jobs
//! - Script Filter feedback with "no results" and "log in" placeholders

pub mod cache;
pub mod config;
pub mod error;
pub mod feedback;
pub mod helpers;
pub mod items;
pub mod jobs;
pub mod keychain;
pub mod logging;
pub mod magic;
pub mod update;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use feedback::{Icon, Item};
pub use helpers::{
  add_clear_auth_magic, check_for_updates, clear_auth, handle_authentication, handle_feedback,
  init_workflow, load_cache, refresh_cache, ClearAuthMagic,
};
pub use workflow::{Invocation, Workflow, WorkflowBuilder};
