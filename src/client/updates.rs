//! Feed updates of one or many podcasts.

use super::PodcastClient;
use crate::error::{Error, FeedErrorKind, Result};
use crate::hooks::log_hook_error;
use crate::library::SharedPodcast;
use crate::model::Episode;
use crate::types::{EpisodeId, Event, PodcastId};
use futures::stream::{self, StreamExt};

/// A podcast whose update failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateFailure {
    /// The podcast
    pub podcast_id: PodcastId,
    /// Feed error class, when the failure came from the feed
    pub kind: Option<FeedErrorKind>,
    /// Error message (also stored as the podcast's update error)
    pub message: String,
}

/// Outcome of a batch update
#[derive(Clone, Debug, Default)]
pub struct UpdateReport {
    /// Podcasts updated successfully
    pub updated: Vec<PodcastId>,
    /// Podcasts whose update failed
    pub failed: Vec<UpdateFailure>,
    /// Paused podcasts left out of the batch
    pub skipped: Vec<PodcastId>,
    /// New episodes across all updated podcasts
    pub new_episodes: Vec<Episode>,
}

impl UpdateReport {
    /// Podcasts that need credentials before they can be updated
    pub fn needs_authentication(&self) -> Vec<PodcastId> {
        self.failed
            .iter()
            .filter(|f| f.kind == Some(FeedErrorKind::Authentication))
            .map(|f| f.podcast_id)
            .collect()
    }
}

impl PodcastClient {
    /// Update one podcast from its feed
    ///
    /// Returns the new episodes. A failure is also recorded as the podcast's
    /// update error and announced with [`Event::PodcastUpdateFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown podcast, or the update error.
    pub async fn update_podcast(&self, podcast_id: PodcastId) -> Result<Vec<Episode>> {
        let shared = self
            .library
            .podcast(podcast_id)
            .ok_or_else(|| Error::NotFound(format!("podcast {}", podcast_id)))?;
        let new_episodes = self.update_shared(podcast_id, &shared).await?;
        self.auto_download(podcast_id, &new_episodes).await;
        Ok(new_episodes)
    }

    /// Update several podcasts concurrently, or every podcast with `None`
    ///
    /// Up to `max_parallel_updates` feeds are fetched at once. A failing podcast
    /// never stops the others. Paused subscriptions are skipped when updating
    /// everything and `skip_paused_on_batch_update` is set.
    pub async fn update_podcasts(&self, podcast_ids: Option<&[PodcastId]>) -> UpdateReport {
        let mut report = UpdateReport::default();
        let targets: Vec<(PodcastId, SharedPodcast)> = match podcast_ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| match self.library.podcast(*id) {
                    Some(shared) => Some((*id, shared)),
                    None => {
                        report.failed.push(UpdateFailure {
                            podcast_id: *id,
                            kind: None,
                            message: format!("podcast {} not found", id),
                        });
                        None
                    }
                })
                .collect(),
            None => {
                let mut targets = Vec::new();
                for (id, shared) in self.library.podcasts() {
                    // A podcast held elsewhere is queued; its update waits for the lock
                    let paused = shared
                        .try_lock()
                        .map(|podcast| podcast.pause_subscription)
                        .unwrap_or(false);
                    if paused && self.config.feeds.skip_paused_on_batch_update {
                        report.skipped.push(id);
                    } else {
                        targets.push((id, shared));
                    }
                }
                targets
            }
        };

        tracing::info!(
            podcasts = targets.len(),
            skipped = report.skipped.len(),
            "updating podcasts"
        );

        let results: Vec<(PodcastId, Result<Vec<Episode>>)> = stream::iter(targets)
            .map(|(id, shared)| async move { (id, self.update_shared(id, &shared).await) })
            .buffer_unordered(self.config.feeds.max_parallel_updates.max(1))
            .collect()
            .await;

        for (podcast_id, result) in results {
            match result {
                Ok(new_episodes) => {
                    self.auto_download(podcast_id, &new_episodes).await;
                    report.updated.push(podcast_id);
                    report.new_episodes.extend(new_episodes);
                }
                Err(e) => report.failed.push(UpdateFailure {
                    podcast_id,
                    kind: e.feed_kind(),
                    message: e.to_string(),
                }),
            }
        }

        tracing::info!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            new_episodes = report.new_episodes.len(),
            "batch update finished"
        );
        report
    }

    /// Run one update while holding the podcast exclusively
    async fn update_shared(&self, podcast_id: PodcastId, shared: &SharedPodcast) -> Result<Vec<Episode>> {
        let mut podcast = shared.lock().await;
        let downloading = self.queue.downloading_episodes();
        let result = self
            .updater
            .update(
                &mut podcast,
                self.config.feeds.max_episodes_per_feed,
                &downloading,
            )
            .await;

        let new_episodes = match result {
            Ok(new_episodes) => new_episodes,
            Err(e) => {
                tracing::warn!(podcast_id = podcast_id.0, error = %e, "podcast update failed");
                podcast.set_update_error(Some(e.to_string()));
                self.emit_event(Event::PodcastUpdateFailed {
                    podcast_id,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        // Follow title changes, unless a task still points into the folder
        if podcast.download_folder.is_some() && !self.queue.has_unfinished_tasks(podcast_id) {
            self.library.assign_folder(&mut podcast).await?;
        }

        self.emit_event(Event::PodcastUpdated {
            podcast_id,
            new_episodes: new_episodes.len(),
        });
        if !new_episodes.is_empty() {
            let episode_ids: Vec<EpisodeId> = new_episodes.iter().filter_map(|e| e.id).collect();
            self.emit_event(Event::NewEpisodesAvailable {
                podcast_id,
                episode_ids,
            });
        }
        log_hook_error(
            "on_podcast_updated",
            self.hooks.on_podcast_updated(&podcast, &new_episodes).await,
        );
        Ok(new_episodes)
    }

    /// Queue new episodes when `auto_download_new` is set
    async fn auto_download(&self, podcast_id: PodcastId, new_episodes: &[Episode]) {
        if !self.config.download.auto_download_new {
            return;
        }
        for episode_id in new_episodes.iter().filter_map(|e| e.id) {
            if let Err(e) = self.download_episode(podcast_id, episode_id).await {
                tracing::warn!(
                    podcast_id = podcast_id.0,
                    episode_id = episode_id.0,
                    error = %e,
                    "failed to queue new episode"
                );
            }
        }
    }
}
