//! Client facade split into focused submodules.
//!
//! [`PodcastClient`] wires the store, the podcast registry, the feed update engine
//! and the download queue together. Its methods are organized by domain:
//! - [`subscriptions`] - subscribe and unsubscribe
//! - [`updates`] - single and batch feed updates
//! - [`downloads`] - enqueueing episodes and task control
//! - [`config_ops`] - runtime configuration updates
//! - [`lifecycle`] - startup recovery and graceful shutdown

mod config_ops;
mod downloads;
mod lifecycle;
mod subscriptions;
mod updates;

pub use updates::{UpdateFailure, UpdateReport};

use crate::config::Config;
use crate::db::Database;
use crate::download::{
    DownloadCompletion, DownloadQueueManager, HttpTransfer, TransferExecutor, TransferRegistry,
};
use crate::error::{Error, Result};
use crate::feed::{FeedFetcher, HttpFeedFetcher};
use crate::hooks::{ExtensionHooks, NoOpHooks};
use crate::library::Library;
use crate::types::Event;
use crate::updater::FeedUpdater;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers lag rather than block
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Main client instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct PodcastClient {
    /// Database instance for persistence
    /// Public for integration tests to query stored state
    pub db: Arc<Database>,
    pub(crate) config: Arc<Config>,
    pub(crate) library: Arc<Library>,
    pub(crate) updater: Arc<FeedUpdater>,
    pub(crate) queue: DownloadQueueManager,
    pub(crate) registry: TransferRegistry,
    pub(crate) hooks: Arc<dyn ExtensionHooks>,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl std::fmt::Debug for PodcastClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodcastClient")
            .field("library", &self.library)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl PodcastClient {
    /// Create a client using HTTP for feeds and episode transfers
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Creates the download directory
    /// - Opens/creates the SQLite database and runs migrations
    /// - Spawns the download queue coordinator
    ///
    /// Call [`PodcastClient::start`] afterwards to load subscriptions.
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher = Arc::new(HttpFeedFetcher::new(&config.feeds)?);
        let transfer = Arc::new(HttpTransfer::new(
            &config.feeds.user_agent,
            config.feeds.request_timeout,
        )?);
        Self::with_components(config, fetcher, transfer, Arc::new(NoOpHooks)).await
    }

    /// Create a client with injected collaborators
    ///
    /// `fetcher` retrieves feeds, `transfer` is the default episode executor and
    /// `hooks` receives lifecycle callbacks.
    pub async fn with_components(
        config: Config,
        fetcher: Arc<dyn FeedFetcher>,
        transfer: Arc<dyn TransferExecutor>,
        hooks: Arc<dyn ExtensionHooks>,
    ) -> Result<Self> {
        let config = config.validate()?;
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let library = Arc::new(Library::new(
            db.clone(),
            &config.download,
            hooks.clone(),
            event_tx.clone(),
        ));
        let updater = Arc::new(FeedUpdater::new(
            fetcher,
            db.clone(),
            config.feeds.max_redirects,
            config.feeds.max_pages,
        ));
        let registry = TransferRegistry::new(transfer);
        let completion: Arc<dyn DownloadCompletion> = library.clone();
        let queue = DownloadQueueManager::new(
            &config.download,
            config.monitor.status_refresh_interval,
            registry.clone(),
            completion,
            event_tx.clone(),
        );

        Ok(Self {
            db,
            config: Arc::new(config),
            library,
            updater,
            queue,
            registry,
            hooks,
            event_tx,
        })
    }

    /// Subscribe to client events
    ///
    /// Multiple subscribers are supported; each receives every event sent after
    /// it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration the client was created with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Podcast registry and episode actions
    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Download queue
    pub fn queue(&self) -> &DownloadQueueManager {
        &self.queue
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
