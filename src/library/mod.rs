//! In-memory podcast registry
//!
//! The [`Library`] holds every loaded subscription behind its own async lock, so
//! feed updates of different podcasts run in parallel while updates, downloads
//! and user actions on the same podcast are serialized. Every mutation is flushed
//! to the [`Database`] while the lock is held.
//!
//! - [`filenames`] - folder and filename assignment
//! - [`scan`] - startup reconciliation and partial-file recovery

pub mod filenames;
pub mod scan;

pub use filenames::{desired_filename, desired_folder_name};
pub use scan::{ResumableDownload, StartupReport};

use crate::config::{DownloadConfig, FilenameSource};
use crate::db::Database;
use crate::download::{DownloadCompletion, DownloadTask, TaskRequest};
use crate::hooks::{log_hook_error, ExtensionHooks};
use crate::model::{Episode, Podcast};
use crate::types::{Activity, EpisodeId, EpisodeState, Event, PodcastId, PodcastStatistics};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

/// A podcast shared between the registry and whoever is working on it
pub type SharedPodcast = Arc<Mutex<Podcast>>;

/// Registry of loaded subscriptions plus the episode-level operations on them
pub struct Library {
    db: Arc<Database>,
    download_dir: PathBuf,
    filename_source: FilenameSource,
    podcasts: RwLock<BTreeMap<PodcastId, SharedPodcast>>,
    hooks: Arc<dyn ExtensionHooks>,
    event_tx: broadcast::Sender<Event>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("download_dir", &self.download_dir)
            .field("podcasts", &self.read().len())
            .finish_non_exhaustive()
    }
}

impl Library {
    /// Create an empty registry; call [`Library::load`] to fill it
    ///
    /// # Arguments
    ///
    /// * `db` - Store every mutation is flushed to
    /// * `config` - Download directory and filename source
    /// * `hooks` - Notified about downloaded episodes
    /// * `event_tx` - Receives episode events
    pub fn new(
        db: Arc<Database>,
        config: &DownloadConfig,
        hooks: Arc<dyn ExtensionHooks>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            db,
            download_dir: config.download_dir.clone(),
            filename_source: config.filename_source,
            podcasts: RwLock::new(BTreeMap::new()),
            hooks,
            event_tx,
        }
    }

    /// The backing store
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Root directory of all podcast folders
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Look up a loaded podcast
    pub fn podcast(&self, id: PodcastId) -> Option<SharedPodcast> {
        self.read().get(&id).cloned()
    }

    /// Every loaded podcast with its id, ordered by id
    pub fn podcasts(&self) -> Vec<(PodcastId, SharedPodcast)> {
        self.read()
            .iter()
            .map(|(id, shared)| (*id, shared.clone()))
            .collect()
    }

    /// Number of loaded podcasts
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no podcast is loaded
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn insert(&self, podcast: Podcast) -> SharedPodcast {
        let id = podcast.id;
        let shared = Arc::new(Mutex::new(podcast));
        self.write().insert(id, shared.clone());
        shared
    }

    pub(crate) fn remove(&self, id: PodcastId) -> Option<SharedPodcast> {
        self.write().remove(&id)
    }

    /// Episode counts of one podcast, or of all podcasts with `None`
    pub async fn statistics(&self, podcast_id: Option<PodcastId>) -> Result<PodcastStatistics> {
        self.db.get_podcast_statistics(podcast_id).await
    }

    /// Task parameters for an episode that already has a filename
    pub fn task_request(&self, podcast: &Podcast, episode: &Episode) -> Option<TaskRequest> {
        Some(TaskRequest {
            episode_id: episode.id?,
            podcast_id: podcast.id,
            title: episode.title.clone(),
            podcast_title: podcast.title.clone(),
            url: episode.url.clone(),
            destination: self.episode_path(podcast, episode)?,
            expected_size: episode.file_size,
            credentials: podcast.credentials.clone(),
            activity: Activity::Download,
        })
    }

    /// Assign folder and filename as needed and build the episode's task parameters
    pub async fn prepare_download(
        &self,
        podcast_id: PodcastId,
        episode_id: EpisodeId,
    ) -> Result<TaskRequest> {
        let shared = self.require_podcast(podcast_id)?;
        let mut podcast = shared.lock().await;
        if podcast.download_folder.is_none() {
            self.assign_folder(&mut podcast).await?;
        }

        let index = podcast
            .episodes
            .iter()
            .position(|e| e.id == Some(episode_id))
            .ok_or_else(|| Error::NotFound(format!("episode {}", episode_id)))?;
        let mut episode = podcast.episodes[index].clone();
        self.assign_filename(&podcast, &mut episode).await?;
        let request = self.task_request(&podcast, &episode);
        podcast.episodes[index] = episode;
        request.ok_or_else(|| Error::NotFound(format!("episode {}", episode_id)))
    }

    /// Mark an episode new (undeleting it when deleted)
    pub async fn mark_new(&self, podcast_id: PodcastId, episode_id: EpisodeId) -> Result<Episode> {
        self.update_episode(podcast_id, episode_id, Episode::mark_new).await
    }

    /// Mark an episode not new
    pub async fn mark_old(&self, podcast_id: PodcastId, episode_id: EpisodeId) -> Result<Episode> {
        self.update_episode(podcast_id, episode_id, Episode::mark_old).await
    }

    /// Lock or unlock an episode against automatic deletion
    pub async fn set_archive(
        &self,
        podcast_id: PodcastId,
        episode_id: EpisodeId,
        archive: bool,
    ) -> Result<Episode> {
        self.update_episode(podcast_id, episode_id, |e| e.archive = archive)
            .await
    }

    /// Record a playback position
    pub async fn report_playback(
        &self,
        podcast_id: PodcastId,
        episode_id: EpisodeId,
        position: u64,
        total: u64,
    ) -> Result<Episode> {
        let now = Utc::now();
        self.update_episode(podcast_id, episode_id, |e| {
            e.report_playback(position, total, now)
        })
        .await
    }

    /// Remove an episode's file and mark it deleted
    pub async fn delete_episode(
        &self,
        podcast_id: PodcastId,
        episode_id: EpisodeId,
    ) -> Result<Episode> {
        let shared = self.require_podcast(podcast_id)?;
        let mut podcast = shared.lock().await;
        let path = podcast
            .episode(episode_id)
            .ok_or_else(|| Error::NotFound(format!("episode {}", episode_id)))?
            .download_filename
            .as_ref()
            .map(|name| self.podcast_dir(&podcast).join(name));

        if let Some(path) = &path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => info!(episode_id = episode_id.0, path = %path.display(), "deleted episode file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let episode = podcast
            .episode_mut(episode_id)
            .ok_or_else(|| Error::NotFound(format!("episode {}", episode_id)))?;
        episode.set_state(EpisodeState::Deleted);
        self.db.save_episode(episode).await?;
        Ok(episode.clone())
    }

    async fn update_episode<F>(
        &self,
        podcast_id: PodcastId,
        episode_id: EpisodeId,
        change: F,
    ) -> Result<Episode>
    where
        F: FnOnce(&mut Episode) + Send,
    {
        let shared = self.require_podcast(podcast_id)?;
        let mut podcast = shared.lock().await;
        let episode = podcast
            .episode_mut(episode_id)
            .ok_or_else(|| Error::NotFound(format!("episode {}", episode_id)))?;
        change(episode);
        self.db.save_episode(episode).await?;
        Ok(episode.clone())
    }

    fn require_podcast(&self, id: PodcastId) -> Result<SharedPodcast> {
        self.podcast(id)
            .ok_or_else(|| Error::NotFound(format!("podcast {}", id)))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<PodcastId, SharedPodcast>> {
        self.podcasts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<PodcastId, SharedPodcast>> {
        self.podcasts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DownloadCompletion for Library {
    async fn episode_exists(&self, episode_id: EpisodeId) -> bool {
        match self.db.episode_exists(episode_id).await {
            Ok(exists) => exists,
            Err(e) => {
                // Let the transfer run; recording the download will surface the problem
                error!(episode_id = episode_id.0, error = %e, "failed to check episode");
                true
            }
        }
    }

    async fn on_download_complete(&self, task: &DownloadTask, size: u64) -> Result<()> {
        let shared = self.require_podcast(task.podcast_id())?;
        let episode = {
            let mut podcast = shared.lock().await;
            let episode = podcast
                .episode_mut(task.episode_id())
                .ok_or_else(|| Error::NotFound(format!("episode {}", task.episode_id())))?;
            episode.on_downloaded(size, task.mime_type().as_deref());
            self.db.save_episode(episode).await?;
            episode.clone()
        };

        info!(
            podcast_id = task.podcast_id().0,
            episode_id = task.episode_id().0,
            size,
            "episode downloaded"
        );
        let _ = self.event_tx.send(Event::EpisodeDownloaded {
            episode_id: task.episode_id(),
            podcast_id: task.podcast_id(),
            size,
        });
        log_hook_error(
            "on_episode_downloaded",
            self.hooks
                .on_episode_downloaded(&episode, task.destination())
                .await,
        );
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
