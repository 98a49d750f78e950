//! Configuration types for podcast-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How an episode's local filename is derived
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameSource {
    /// Sanitized episode title
    #[default]
    Title,
    /// Last path segment of the enclosure URL
    Url,
}

/// Download behavior configuration (directories, concurrency, bandwidth)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory holding one folder per podcast (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent downloads (default: 1, clamped to at least 1)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Enforce `max_concurrent_downloads` (default: true)
    #[serde(default = "default_true")]
    pub limit_downloads_enabled: bool,

    /// Aggregate bandwidth cap in KiB/s (default: 500.0)
    #[serde(default = "default_bandwidth_limit_kbps")]
    pub bandwidth_limit_kbps: f64,

    /// Enforce `bandwidth_limit_kbps` (default: false)
    #[serde(default)]
    pub limit_rate_enabled: bool,

    /// How episode filenames are derived
    #[serde(default)]
    pub filename_source: FilenameSource,

    /// Delete `.partial` files that match no episode at startup (default: false)
    #[serde(default)]
    pub delete_orphaned_partials: bool,

    /// Queue new episodes for download after each update (default: false)
    #[serde(default)]
    pub auto_download_new: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            limit_downloads_enabled: true,
            bandwidth_limit_kbps: default_bandwidth_limit_kbps(),
            limit_rate_enabled: false,
            filename_source: FilenameSource::default(),
            delete_orphaned_partials: false,
            auto_download_new: false,
        }
    }
}

impl DownloadConfig {
    /// Bandwidth cap in bytes per second, or None when rate limiting is off
    pub fn speed_limit_bps(&self) -> Option<u64> {
        if self.limit_rate_enabled && self.bandwidth_limit_kbps > 0.0 {
            Some((self.bandwidth_limit_kbps * 1024.0) as u64)
        } else {
            None
        }
    }
}

/// Feed fetching and update configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Episodes retained per podcast (default: 200, 0 = unbounded)
    #[serde(default = "default_max_episodes")]
    pub max_episodes_per_feed: usize,

    /// User-Agent header sent with feed and episode requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Permanent redirects followed during one update (default: 5)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Continuation pages fetched during one update (default: 50)
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Podcasts updated concurrently in a batch update (default: 4)
    #[serde(default = "default_max_parallel_updates")]
    pub max_parallel_updates: usize,

    /// Skip podcasts with `pause_subscription` in batch updates (default: true)
    #[serde(default = "default_true")]
    pub skip_paused_on_batch_update: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_episodes_per_feed: default_max_episodes(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            max_redirects: default_max_redirects(),
            max_pages: default_max_pages(),
            max_parallel_updates: default_max_parallel_updates(),
            skip_paused_on_batch_update: true,
        }
    }
}

/// Database configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database file (default: "./podcasts.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Status refresh and shutdown timing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between status refreshes while tasks are active (default: 1500 ms)
    #[serde(default = "default_status_refresh", with = "millis_serde")]
    pub status_refresh_interval: Duration,

    /// How long shutdown waits for workers to stop (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_refresh_interval: default_status_refresh(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Main configuration for [`PodcastClient`](crate::PodcastClient)
///
/// Fields are grouped into sub-configs, flattened on the wire so the JSON file
/// stays a single flat object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download directories, concurrency and bandwidth
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Feed fetching and updates
    #[serde(flatten)]
    pub feeds: FeedConfig,

    /// Database location
    #[serde(flatten)]
    pub persistence: PersistenceConfig,

    /// Status refresh and shutdown timing
    #[serde(flatten)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults. The result is validated.
    pub async fn load(path: &Path) -> Result<Self> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str::<Config>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                Config::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()
    }

    /// Write configuration to a JSON file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Clamp out-of-range values and reject unusable ones
    pub fn validate(mut self) -> Result<Self> {
        if self.download.download_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "download directory must not be empty".to_string(),
                key: Some("download_dir".to_string()),
            });
        }
        if self.download.max_concurrent_downloads < 1 {
            tracing::warn!(
                value = self.download.max_concurrent_downloads,
                "max_concurrent_downloads below 1, clamping"
            );
            self.download.max_concurrent_downloads = 1;
        }
        if !self.download.bandwidth_limit_kbps.is_finite() || self.download.bandwidth_limit_kbps < 0.0
        {
            return Err(Error::Config {
                message: format!(
                    "invalid bandwidth limit {}",
                    self.download.bandwidth_limit_kbps
                ),
                key: Some("bandwidth_limit_kbps".to_string()),
            });
        }
        if self.feeds.max_parallel_updates < 1 {
            self.feeds.max_parallel_updates = 1;
        }
        Ok(self)
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./podcasts.db")
}

fn default_max_concurrent() -> usize {
    1
}

fn default_bandwidth_limit_kbps() -> f64 {
    500.0
}

fn default_max_episodes() -> usize {
    200
}

fn default_user_agent() -> String {
    format!("podcast-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_pages() -> usize {
    50
}

fn default_max_parallel_updates() -> usize {
    4
}

fn default_status_refresh() -> Duration {
    Duration::from_millis(1500)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (as seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (as milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
