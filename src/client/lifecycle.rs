//! Startup recovery and graceful shutdown.

use super::PodcastClient;
use crate::download::DownloadTask;
use crate::error::Result;
use crate::library::StartupReport;
use crate::types::Event;
use std::sync::Arc;

impl PodcastClient {
    /// Load subscriptions and recover interrupted downloads
    ///
    /// Episode states are reconciled with the download folders, and every
    /// partial file matching an episode becomes a paused task whose progress
    /// reflects the bytes already on disk. Orphaned partial files are deleted
    /// when `delete_orphaned_partials` is set.
    pub async fn start(&self) -> Result<StartupReport> {
        let report = self
            .library
            .load(self.config.download.delete_orphaned_partials)
            .await?;

        for resumable in &report.resumable {
            let task = Arc::new(DownloadTask::resumable(
                resumable.request.clone(),
                resumable.partial_size,
            ));
            tracing::info!(
                task_id = task.id().0,
                episode_id = resumable.request.episode_id.0,
                partial_size = resumable.partial_size,
                "offering interrupted download for resume"
            );
            self.queue.add_task(task)?;
        }

        self.emit_event(Event::PodcastListChanged);
        Ok(report)
    }

    /// Gracefully shut down the client
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new tasks and disables dispatch
    /// 2. Pauses every queued and running task (partial files stay on disk)
    /// 3. Waits for workers up to `shutdown_timeout`
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// The database pool closes when the last clone of the client is dropped.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        if !self.queue.shutdown(self.config.monitor.shutdown_timeout).await {
            tracing::warn!("Workers still running after timeout, proceeding with shutdown");
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
