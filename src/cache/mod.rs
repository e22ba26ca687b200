//! Named JSON cache for workflow results.
//!
//! This module provides the cache a workflow uses between invocations:
//! - Entries are opaque blobs (JSON in practice) keyed by name
//! - Every entry remembers when it was stored, so callers can expire it by age
//! - Storage is pluggable; the default keeps everything in one SQLite file

mod layer;
mod storage;

pub use layer::Cache;
pub use storage::{CacheStore, CachedEntry, SqliteStorage};

/// File name of the default cache database inside the cache directory.
pub const CACHE_DB_FILE: &str = "cache.db";
