//! Episode downloads
//!
//! - [`task`] - the per-episode [`DownloadTask`] state machine
//! - [`transfer`] - byte transfer executors ([`HttpTransfer`] and custom resolvers)
//! - [`queue`] - the bounded-concurrency [`DownloadQueueManager`]
//! - `worker` - runs one task's transfer to a terminal or paused state
//! - `status` - aggregate status and change detection for periodic refreshes
//!
//! The queue does not touch the episode store directly. It reaches it through a
//! [`DownloadCompletion`] implementation, which confirms an episode still exists
//! before and after a transfer and records finished downloads.

pub mod queue;
mod status;
pub mod task;
pub mod transfer;
mod worker;

pub use queue::DownloadQueueManager;
pub use task::{DownloadTask, TaskRequest};
pub use transfer::{
    CustomDownloader, HttpTransfer, TransferExecutor, TransferRegistry, TransferRequest,
    TransferStream,
};

use crate::types::EpisodeId;
use crate::Result;
use async_trait::async_trait;

/// Store-side callbacks of the download workers
#[async_trait]
pub trait DownloadCompletion: Send + Sync {
    /// Whether the episode is still in the store
    ///
    /// Checked before a transfer starts and again before its file is moved into
    /// place, since episodes can be purged while a task runs.
    async fn episode_exists(&self, episode_id: EpisodeId) -> bool;

    /// The task's file is at its destination; record the download
    ///
    /// # Errors
    /// A failure marks the task failed; the file stays where it is.
    async fn on_download_complete(&self, task: &DownloadTask, size: u64) -> Result<()>;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
