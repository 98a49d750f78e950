//! Client harness backed by in-memory feeds and transfers.

use super::PodcastClient;
use crate::config::Config;
use crate::download::test_helpers::FakeTransfer;
use crate::feed::test_helpers::FakeFetcher;
use crate::hooks::ExtensionHooks;
use crate::model::{Episode, Podcast};
use crate::types::{EpisodeId, Event, PodcastId};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Counts hook invocations
#[derive(Default)]
pub(crate) struct CountingHooks {
    pub(crate) subscribed: AtomicUsize,
    pub(crate) updated: AtomicUsize,
    pub(crate) removed: AtomicUsize,
    pub(crate) downloaded: AtomicUsize,
}

#[async_trait]
impl ExtensionHooks for CountingHooks {
    async fn on_podcast_subscribed(&self, _podcast: &Podcast) -> Result<(), String> {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_podcast_updated(&self, _podcast: &Podcast, _new: &[Episode]) -> Result<(), String> {
        self.updated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_podcast_removed(&self, _podcast: &Podcast) -> Result<(), String> {
        self.removed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_episode_downloaded(&self, _episode: &Episode, _path: &Path) -> Result<(), String> {
        self.downloaded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Config rooted in `dir` with a fast status refresh
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.persistence.database_path = dir.join("podcasts.db");
    config.monitor.status_refresh_interval = Duration::from_millis(20);
    config.monitor.shutdown_timeout = Duration::from_secs(5);
    config
}

pub(crate) struct ClientHarness {
    pub(crate) client: PodcastClient,
    pub(crate) fetcher: Arc<FakeFetcher>,
    pub(crate) transfer: Arc<FakeTransfer>,
    pub(crate) hooks: Arc<CountingHooks>,
    pub(crate) events: broadcast::Receiver<Event>,
    pub(crate) dir: tempfile::TempDir,
}

impl ClientHarness {
    pub(crate) async fn new() -> Self {
        Self::with(FakeTransfer::quick(), |_| {}).await
    }

    pub(crate) async fn with(transfer: FakeTransfer, configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        configure(&mut config);
        Self::open(dir, config, transfer).await
    }

    /// Build a client over an existing directory (used to simulate a restart)
    pub(crate) async fn open(dir: tempfile::TempDir, config: Config, transfer: FakeTransfer) -> Self {
        let fetcher = Arc::new(FakeFetcher::new());
        let transfer = Arc::new(transfer);
        let hooks = Arc::new(CountingHooks::default());
        let client = PodcastClient::with_components(
            config,
            fetcher.clone(),
            transfer.clone(),
            hooks.clone(),
        )
        .await
        .unwrap();
        let events = client.subscribe();
        Self {
            client,
            fetcher,
            transfer,
            hooks,
            events,
            dir,
        }
    }

    pub(crate) fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub(crate) async fn podcast(&self, id: PodcastId) -> Podcast {
        self.client.library().podcast(id).unwrap().lock().await.clone()
    }

    pub(crate) async fn episode_id(&self, id: PodcastId, guid: &str) -> EpisodeId {
        self.podcast(id)
            .await
            .episode_by_guid(guid)
            .and_then(|e| e.id)
            .unwrap()
    }
}
