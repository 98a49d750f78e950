//! Runtime configuration updates: concurrency and bandwidth.

use super::PodcastClient;
use crate::error::{Error, Result};

impl PodcastClient {
    /// Change the number of concurrent downloads (clamped to at least 1)
    ///
    /// Emits [`Event::DownloadLimitChanged`](crate::types::Event::DownloadLimitChanged).
    /// Raising the cap dispatches waiting tasks at once; lowering it lets running
    /// tasks finish.
    pub fn set_max_concurrent_downloads(&self, max: usize) {
        self.queue.set_max_concurrent(max);
    }

    /// Toggle enforcement of the concurrency cap
    pub fn set_limit_downloads_enabled(&self, enabled: bool) {
        self.queue.set_limit_downloads_enabled(enabled);
    }

    /// Concurrency cap and whether it is enforced
    pub fn download_limit(&self) -> (usize, bool) {
        self.queue.download_limit()
    }

    /// Change the aggregate bandwidth cap (KiB/s) and whether it is enforced
    ///
    /// Emits [`Event::SpeedLimitChanged`](crate::types::Event::SpeedLimitChanged).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a negative or non-finite limit.
    pub fn set_bandwidth_limit(&self, kbps: f64, enabled: bool) -> Result<()> {
        if !kbps.is_finite() || kbps < 0.0 {
            return Err(Error::Config {
                message: format!("invalid bandwidth limit {}", kbps),
                key: Some("bandwidth_limit_kbps".to_string()),
            });
        }
        self.queue.set_bandwidth_limit(kbps, enabled);
        Ok(())
    }

    /// Current bandwidth cap in bytes per second (None = unlimited)
    pub fn speed_limit(&self) -> Option<u64> {
        self.queue.speed_limit()
    }
}
