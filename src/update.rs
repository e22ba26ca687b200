//! Self-update checks against a GitHub releases feed.
//!
//! The check itself runs in a background `update` job; interactive
//! invocations only read the result it left in the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::Cache;
use crate::error::{Error, Result};

/// Cache entry holding the last check result.
pub const UPDATE_STATE_KEY: &str = "_aw.update";

/// Default time between update checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const WORKFLOW_EXTENSIONS: &[&str] = &[".alfredworkflow", ".alfred5workflow", ".alfred4workflow"];

/// Answers whether an update check is due and whether one is available.
pub trait Updater: Send + Sync {
  fn update_check_due(&self) -> bool;

  fn update_available(&self) -> bool;

  /// Download URL of the available update.
  fn download_url(&self) -> Option<String>;
}

/// `MAJOR.MINOR.PATCH`, optionally prefixed with `v`.
///
/// Missing components are zero and any pre-release or build suffix is
/// ignored, so `v1.2` == `1.2.0-beta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
  pub major: u64,
  pub minor: u64,
  pub patch: u64,
}

impl Version {
  pub fn parse(s: &str) -> Option<Self> {
    let s = s.trim().trim_start_matches(['v', 'V']);
    let core = s.split(['-', '+']).next()?;
    if core.is_empty() {
      return None;
    }

    let mut parts = [0u64; 3];
    for (i, part) in core.split('.').enumerate() {
      if i >= parts.len() {
        return None;
      }
      parts[i] = part.parse().ok()?;
    }

    Some(Self {
      major: parts[0],
      minor: parts[1],
      patch: parts[2],
    })
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
  }
}

/// A release that can be installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
  pub version: String,
  pub download_url: String,
}

/// Result of the last update check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateState {
  pub checked_at: DateTime<Utc>,
  pub latest: Option<Release>,
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
  tag_name: String,
  #[serde(default)]
  draft: bool,
  #[serde(default)]
  prerelease: bool,
  #[serde(default)]
  assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
  name: String,
  browser_download_url: String,
}

/// Pick the newest stable release that ships a workflow file.
fn latest_release(releases: Vec<GitHubRelease>) -> Option<Release> {
  releases
    .into_iter()
    .filter(|r| !r.draft && !r.prerelease)
    .filter_map(|r| {
      let version = Version::parse(&r.tag_name)?;
      let asset = r
        .assets
        .into_iter()
        .find(|a| WORKFLOW_EXTENSIONS.iter().any(|ext| a.name.ends_with(ext)))?;
      Some((version, asset.browser_download_url))
    })
    .max_by(|(a, _), (b, _)| a.cmp(b))
    .map(|(version, download_url)| Release {
      version: version.to_string(),
      download_url,
    })
}

/// Updater backed by a GitHub repository's releases.
#[derive(Clone)]
pub struct GitHubUpdater {
  repo: String,
  current: Version,
  interval: Duration,
  cache: Cache,
  api_base: Url,
}

impl GitHubUpdater {
  /// `repo` is `owner/name`; `current_version` is the installed version.
  pub fn new(repo: &str, current_version: &str, cache: Cache) -> Result<Self> {
    let valid = match repo.split_once('/') {
      Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
      None => false,
    };
    if !valid {
      return Err(Error::InvalidRepo(repo.to_string()));
    }

    let current = Version::parse(current_version).unwrap_or_else(|| {
      warn!("Invalid workflow version {:?}, assuming 0.0.0", current_version);
      Version {
        major: 0,
        minor: 0,
        patch: 0,
      }
    });

    let api_base =
      Url::parse("https://api.github.com/").map_err(|_| Error::InvalidRepo(repo.to_string()))?;

    Ok(Self {
      repo: repo.to_string(),
      current,
      interval: DEFAULT_CHECK_INTERVAL,
      cache,
      api_base,
    })
  }

  /// Set the time between update checks.
  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  fn releases_url(&self) -> Result<Url> {
    let mut url = self.api_base.clone();
    url
      .path_segments_mut()
      .map_err(|_| Error::InvalidRepo(self.repo.clone()))?
      .pop_if_empty()
      .push("repos")
      .extend(self.repo.split('/'))
      .push("releases");
    Ok(url)
  }

  pub fn state(&self) -> Option<UpdateState> {
    match self.cache.load_json(UPDATE_STATE_KEY) {
      Ok(state) => state,
      Err(e) => {
        warn!("Failed to read update state: {}", e);
        None
      }
    }
  }

  /// Fetch the releases feed and record the newest release.
  ///
  /// The attempt is stamped before the request, so a failed fetch still
  /// waits a full interval before the next check is due.
  pub async fn check_for_update(&self) -> Result<Option<Release>> {
    let url = self.releases_url()?;
    self.stamp_attempt()?;
    info!("Checking for updates at {}", url);

    let client = reqwest::Client::builder()
      .user_agent(concat!("alfred-utils/", env!("CARGO_PKG_VERSION")))
      .build()?;
    let body = client
      .get(url)
      .header("Accept", "application/vnd.github+json")
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?;

    let releases: Vec<GitHubRelease> = serde_json::from_str(&body).map_err(Error::ReleaseFeed)?;
    self.record(latest_release(releases))
  }

  fn stamp_attempt(&self) -> Result<()> {
    let latest = self.state().and_then(|state| state.latest);
    self.cache.store_json(
      UPDATE_STATE_KEY,
      &UpdateState {
        checked_at: Utc::now(),
        latest,
      },
    )
  }

  fn record(&self, latest: Option<Release>) -> Result<Option<Release>> {
    match &latest {
      Some(release) => info!("Latest release: {}", release.version),
      None => info!("No installable releases found"),
    }

    self.cache.store_json(
      UPDATE_STATE_KEY,
      &UpdateState {
        checked_at: Utc::now(),
        latest: latest.clone(),
      },
    )?;
    Ok(latest)
  }

  fn newer_release(&self) -> Option<Release> {
    let latest = self.state()?.latest?;
    let version = Version::parse(&latest.version)?;
    (version > self.current).then_some(latest)
  }
}

impl Updater for GitHubUpdater {
  fn update_check_due(&self) -> bool {
    match self.state() {
      Some(state) => {
        let age = (Utc::now() - state.checked_at)
          .to_std()
          .unwrap_or(Duration::ZERO);
        debug!("Last update check {}s ago", age.as_secs());
        age > self.interval
      }
      None => true,
    }
  }

  fn update_available(&self) -> bool {
    self.newer_release().is_some()
  }

  fn download_url(&self) -> Option<String> {
    self.newer_release().map(|r| r.download_url)
  }
}
