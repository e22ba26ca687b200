//! Error types shared by every workflow helper.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
  // Keychain
  #[error("no credential stored for account {account}")]
  CredentialNotFound { account: String },

  #[error("keychain error for account {account}: {source}")]
  Keychain {
    account: String,
    #[source]
    source: keyring::Error,
  },

  // Configuration
  #[error("failed to decode configuration: {0}")]
  Config(#[from] serde::de::value::Error),

  #[error("failed to read settings file {}: {source}", path.display())]
  SettingsRead {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse settings file {}: {source}", path.display())]
  SettingsParse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("failed to write settings file {}: {source}", path.display())]
  SettingsWrite {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to encode settings for {}: {source}", path.display())]
  SettingsEncode {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("setting {0} is not set")]
  MissingSetting(&'static str),

  #[error("could not determine {0} directory")]
  NoDirectory(&'static str),

  // Background jobs
  #[error("job {0} is already running")]
  JobRunning(String),

  #[error("failed to start background job {job}: {source}")]
  Spawn {
    job: String,
    #[source]
    source: std::io::Error,
  },

  #[error("error starting update check: {0}")]
  UpdateCheck(#[source] Box<Error>),

  // Cache
  #[error("failed to decode cache {name}: {source}")]
  CacheDecode {
    name: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to encode cache {name}: {source}")]
  CacheEncode {
    name: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("cache storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("invalid timestamp {value:?} in cache storage: {source}")]
  Timestamp {
    value: String,
    #[source]
    source: chrono::ParseError,
  },

  #[error("cache storage lock poisoned")]
  LockPoisoned,

  // Feedback
  #[error("failed to serialize feedback: {0}")]
  Feedback(#[source] serde_json::Error),

  #[error("failed to write feedback: {0}")]
  Output(#[source] std::io::Error),

  // Items
  #[error("failed to read items file {}: {source}", path.display())]
  ItemsRead {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid items in {}: {source}", path.display())]
  ItemsParse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  // Updates
  #[error("update check request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("invalid release feed: {0}")]
  ReleaseFeed(#[source] serde_json::Error),

  #[error("invalid GitHub repository {0:?}, expected owner/name")]
  InvalidRepo(String),

  #[error("no update available")]
  NoUpdate,

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error("failed to install logger: {0}")]
  Logging(#[from] tracing_subscriber::util::TryInitError),
}
