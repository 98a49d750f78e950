//! Subscribing to and removing podcasts.

use super::PodcastClient;
use crate::error::{Error, FeedError, Result};
use crate::hooks::log_hook_error;
use crate::model::{Credentials, Podcast};
use crate::types::{Event, PodcastId};
use std::collections::HashSet;

impl PodcastClient {
    /// Subscribe to a feed
    ///
    /// The feed is fetched once; the podcast is kept only when that succeeds and
    /// lists at least one downloadable episode. On success the podcast has its
    /// download folder assigned and is registered in the library.
    ///
    /// # Errors
    ///
    /// - [`Error::Duplicate`] when the URL is already subscribed
    /// - [`Error::Feed`] when the feed cannot be fetched or has no episodes
    ///   ([`FeedError::AuthenticationRequired`] asks the caller for credentials)
    pub async fn subscribe_podcast(&self, url: &str, credentials: Option<Credentials>) -> Result<PodcastId> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::Other("feed URL must not be empty".to_string()));
        }
        if self.db.get_podcast_by_url(url).await?.is_some() {
            return Err(Error::Duplicate(url.to_string()));
        }

        let id = self.db.insert_podcast(url, credentials.as_ref()).await?;
        let mut podcast = Podcast::new(id, url);
        podcast.credentials = credentials;

        if let Err(e) = self.first_update(&mut podcast).await {
            tracing::warn!(podcast_id = id.0, url, error = %e, "subscription failed, rolling back");
            if let Err(rollback) = self.db.delete_podcast(id).await {
                tracing::error!(podcast_id = id.0, error = %rollback, "failed to roll back subscription");
            }
            return Err(e);
        }

        self.library.assign_folder(&mut podcast).await?;
        tracing::info!(
            podcast_id = id.0,
            title = %podcast.title,
            episodes = podcast.episodes.len(),
            "subscribed to podcast"
        );
        log_hook_error(
            "on_podcast_subscribed",
            self.hooks.on_podcast_subscribed(&podcast).await,
        );
        self.library.insert(podcast);
        self.emit_event(Event::PodcastListChanged);
        Ok(id)
    }

    async fn first_update(&self, podcast: &mut Podcast) -> Result<()> {
        self.updater
            .update(
                podcast,
                self.config.feeds.max_episodes_per_feed,
                &HashSet::new(),
            )
            .await?;
        if podcast.episodes.is_empty() {
            return Err(FeedError::InvalidFeed("feed has no downloadable episodes".to_string()).into());
        }
        Ok(())
    }

    /// Remove a subscription
    ///
    /// Its tasks are cancelled, its download folder is deleted and the store
    /// delete cascades to its episodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown podcast, or the store error when
    /// the delete fails.
    pub async fn unsubscribe_podcast(&self, podcast_id: PodcastId) -> Result<()> {
        let shared = self
            .library
            .podcast(podcast_id)
            .ok_or_else(|| Error::NotFound(format!("podcast {}", podcast_id)))?;

        self.queue.cancel_podcast(podcast_id).await;
        let timeout = self.config.monitor.shutdown_timeout;
        if !self.queue.wait_podcast_idle(podcast_id, timeout).await {
            tracing::warn!(podcast_id = podcast_id.0, "downloads still running while unsubscribing");
        }

        let podcast = shared.lock().await;
        log_hook_error(
            "on_podcast_removed",
            self.hooks.on_podcast_removed(&podcast).await,
        );

        if podcast.download_folder.is_some() {
            let dir = self.library.podcast_dir(&podcast);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => tracing::debug!(podcast_id = podcast_id.0, path = %dir.display(), "removed download folder"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(podcast_id = podcast_id.0, error = %e, "failed to remove download folder"),
            }
        }

        self.db.delete_podcast(podcast_id).await?;
        self.library.remove(podcast_id);
        tracing::info!(podcast_id = podcast_id.0, title = %podcast.title, "unsubscribed from podcast");
        drop(podcast);

        self.emit_event(Event::PodcastListChanged);
        Ok(())
    }
}
