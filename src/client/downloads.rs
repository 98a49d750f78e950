//! Enqueueing episodes and controlling their tasks.

use super::PodcastClient;
use crate::download::{CustomDownloader, DownloadTask};
use crate::error::Result;
use crate::model::Episode;
use crate::types::{EpisodeId, PodcastId, StatusSummary, TaskId, TaskSnapshot, TaskStatus};
use std::sync::Arc;

impl PodcastClient {
    /// Queue an episode for download
    ///
    /// Assigns the podcast folder and the episode filename on first use. An
    /// unfinished task for the same episode is reused instead of duplicated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) for an unknown podcast
    /// or episode and [`Error::ShuttingDown`](crate::Error::ShuttingDown) after
    /// shutdown began.
    pub async fn download_episode(
        &self,
        podcast_id: PodcastId,
        episode_id: EpisodeId,
    ) -> Result<Arc<DownloadTask>> {
        let request = self.library.prepare_download(podcast_id, episode_id).await?;
        let task = self.queue.queue_episode(request, false)?;
        tracing::info!(
            task_id = task.id().0,
            podcast_id = podcast_id.0,
            episode_id = episode_id.0,
            "episode queued for download"
        );
        Ok(task)
    }

    /// Queue several episodes of a podcast; stops at the first failure
    pub async fn download_episodes(
        &self,
        podcast_id: PodcastId,
        episode_ids: &[EpisodeId],
    ) -> Result<Vec<Arc<DownloadTask>>> {
        let mut tasks = Vec::with_capacity(episode_ids.len());
        for episode_id in episode_ids {
            tasks.push(self.download_episode(podcast_id, *episode_id).await?);
        }
        Ok(tasks)
    }

    /// Delete an episode's file, cancelling its download first
    pub async fn delete_episode(&self, podcast_id: PodcastId, episode_id: EpisodeId) -> Result<Episode> {
        let unfinished: Vec<TaskId> = self
            .queue
            .tasks()
            .iter()
            .filter(|t| t.episode_id() == episode_id && t.status().can_cancel())
            .map(|t| t.id())
            .collect();
        for id in unfinished {
            self.queue.cancel_task(id).await?;
        }
        self.library.delete_episode(podcast_id, episode_id).await
    }

    /// Start a task now regardless of the concurrency cap
    pub fn force_start(&self, id: TaskId) -> Result<()> {
        self.queue.force_start(id)
    }

    /// Pause a task
    pub fn pause_task(&self, id: TaskId) -> Result<TaskStatus> {
        self.queue.pause_task(id)
    }

    /// Cancel a task and delete its partial file
    pub async fn cancel_task(&self, id: TaskId) -> Result<TaskStatus> {
        self.queue.cancel_task(id).await
    }

    /// Re-queue a paused, failed or cancelled task
    pub fn queue_task(&self, id: TaskId) -> Result<()> {
        self.queue.queue_task(id)
    }

    /// Remove a finished task from the list
    pub fn remove_task(&self, id: TaskId) -> Result<()> {
        self.queue.remove_task(id)
    }

    /// Remove every done, failed and cancelled task
    pub fn cleanup_finished(&self) -> usize {
        self.queue.cleanup_finished()
    }

    /// Move a task in front of another
    pub fn move_task_before(&self, id: TaskId, before: TaskId) -> Result<()> {
        self.queue.move_before(id, before)
    }

    /// Move a task behind another
    pub fn move_task_after(&self, id: TaskId, after: TaskId) -> Result<()> {
        self.queue.move_after(id, after)
    }

    /// Snapshots of every listed task
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.queue.snapshots()
    }

    /// Aggregate status of the task list
    pub fn status_summary(&self) -> StatusSummary {
        StatusSummary::from_snapshots(&self.queue.snapshots())
    }

    /// Resume dispatching queued tasks
    pub fn enable_downloads(&self) {
        self.queue.enable();
    }

    /// Stop dispatching queued tasks; running ones finish
    pub fn disable_downloads(&self) {
        self.queue.disable();
    }

    /// Route matching episode URLs to a custom executor
    ///
    /// Registered downloaders are consulted in registration order before the
    /// default executor.
    pub fn register_downloader(&self, downloader: Arc<dyn CustomDownloader>) {
        self.registry.register(downloader);
    }
}
