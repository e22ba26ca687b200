//! JSON cache facade over a storage backend.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::storage::CacheStore;
use crate::error::{Error, Result};

/// Named JSON cache with age-based expiry.
///
/// Cheap to clone; clones share the same storage.
#[derive(Clone)]
pub struct Cache {
  storage: Arc<dyn CacheStore>,
}

impl Cache {
  pub fn new(storage: impl CacheStore + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  pub fn storage(&self) -> &dyn CacheStore {
    self.storage.as_ref()
  }

  pub fn exists(&self, name: &str) -> Result<bool> {
    Ok(self.storage.cached_at(name)?.is_some())
  }

  /// Time since the entry was stored, `None` if it doesn't exist.
  ///
  /// Timestamps in the future count as age zero.
  pub fn age(&self, name: &str) -> Result<Option<Duration>> {
    Ok(
      self
        .storage
        .cached_at(name)?
        .map(|cached_at| (Utc::now() - cached_at).to_std().unwrap_or(Duration::ZERO)),
    )
  }

  /// Whether the entry is missing or older than `max_age`.
  pub fn expired(&self, name: &str, max_age: Duration) -> Result<bool> {
    Ok(match self.age(name)? {
      Some(age) => age > max_age,
      None => true,
    })
  }

  /// Decode the entry, `None` if it doesn't exist.
  pub fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
    let Some(entry) = self.storage.load(name)? else {
      debug!("Cache miss: {}", name);
      return Ok(None);
    };

    debug!("Cache hit: {} ({} bytes)", name, entry.data.len());
    serde_json::from_slice(&entry.data)
      .map(Some)
      .map_err(|source| Error::CacheDecode {
        name: name.to_string(),
        source,
      })
  }

  pub fn store_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
    let data = serde_json::to_vec(value).map_err(|source| Error::CacheEncode {
      name: name.to_string(),
      source,
    })?;
    self.storage.store(name, &data, Utc::now())
  }

  pub fn remove(&self, name: &str) -> Result<()> {
    self.storage.remove(name)
  }

  pub fn clear(&self) -> Result<()> {
    self.storage.clear()
  }
}
