//! Worker: runs one task's transfer to a terminal or paused state

use super::task::DownloadTask;
use super::transfer::{TransferExecutor, TransferRequest};
use super::DownloadCompletion;
use crate::error::DownloadError;
use crate::speed_limiter::SpeedLimiter;
use crate::types::{TaskId, TaskStatus};
use futures::StreamExt;
use std::any::Any;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sent to the queue coordinator when a worker exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkerFinished {
    pub(crate) task_id: TaskId,
    pub(crate) status: TaskStatus,
}

/// Everything a worker needs, moved into its tokio task
pub(crate) struct WorkerContext {
    pub(crate) task: Arc<DownloadTask>,
    pub(crate) executor: Arc<dyn TransferExecutor>,
    pub(crate) limiter: SpeedLimiter,
    pub(crate) completion: Arc<dyn DownloadCompletion>,
    pub(crate) done_tx: mpsc::UnboundedSender<WorkerFinished>,
}

enum Outcome {
    /// All bytes are in the partial file
    Transferred(u64),
    /// Pause or cancel was requested
    Interrupted,
}

/// Run a worker in its own tokio task and turn a panic into a failed task
///
/// The coordinator always receives a [`WorkerFinished`] for the task, so a
/// misbehaving executor cannot keep its slot occupied.
pub(crate) async fn supervise_worker(ctx: WorkerContext) {
    let task = ctx.task.clone();
    let done_tx = ctx.done_tx.clone();

    let join_error = match tokio::spawn(run_worker(ctx)).await {
        Ok(()) => return,
        Err(e) if e.is_cancelled() => return,
        Err(e) => e,
    };
    let message = panic_message(join_error.into_panic());
    error!(task_id = task.id().0, error = %message, "download worker panicked");

    let status = failed(
        &task,
        DownloadError::Transfer(format!("Download worker panicked: {}", message)),
    )
    .await;
    let _ = done_tx.send(WorkerFinished {
        task_id: task.id(),
        status,
    });
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run the task's transfer and report the final status to the coordinator
///
/// Errors never escape: they become the task's `Failed` state and message.
async fn run_worker(ctx: WorkerContext) {
    let task = ctx.task.clone();
    let token = task.cancel_token();
    info!(task_id = task.id().0, episode_id = task.episode_id().0, "download started");

    let status = match transfer(&ctx, &token).await {
        Ok(Outcome::Interrupted) => stop(&task).await,
        Ok(Outcome::Transferred(size)) => match finish(&ctx, size).await {
            Ok(()) => task.status(),
            Err(e) => failed(&task, e).await,
        },
        Err(e) => failed(&task, e).await,
    };

    let _ = ctx.done_tx.send(WorkerFinished {
        task_id: task.id(),
        status,
    });
}

/// Record a failure, unless a cancel request got there first
async fn failed(task: &DownloadTask, error: DownloadError) -> TaskStatus {
    if matches!(error, DownloadError::EpisodeGone { .. }) {
        remove_partial(task).await;
    }
    if let Err(transition) = task.fail(&error) {
        warn!(task_id = task.id().0, error = %transition, "could not record failure");
        return task.status();
    }
    let status = task.status();
    if status == TaskStatus::Cancelled {
        remove_partial(task).await;
    } else {
        warn!(task_id = task.id().0, error = %error, "download failed");
    }
    status
}

/// Acknowledge a pause or cancel request
async fn stop(task: &DownloadTask) -> TaskStatus {
    match task.acknowledge_stop() {
        Ok(TaskStatus::Cancelled) => {
            remove_partial(task).await;
            info!(task_id = task.id().0, "download cancelled");
            TaskStatus::Cancelled
        }
        Ok(status) => {
            info!(task_id = task.id().0, progress = task.progress(), "download paused");
            status
        }
        Err(e) => {
            warn!(task_id = task.id().0, error = %e, "unexpected stop");
            task.status()
        }
    }
}

async fn transfer(
    ctx: &WorkerContext,
    token: &CancellationToken,
) -> Result<Outcome, DownloadError> {
    let task = &ctx.task;
    let episode_id = task.episode_id();
    if !ctx.completion.episode_exists(episode_id).await {
        return Err(DownloadError::EpisodeGone { episode_id });
    }

    let partial = task.partial_path();
    if let Some(parent) = partial.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let existing = tokio::fs::metadata(&partial)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    let request = TransferRequest {
        url: task.request().url.clone(),
        resume_from: existing,
        credentials: task.request().credentials.clone(),
    };
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return Ok(Outcome::Interrupted),
        opened = ctx.executor.open(&request) => opened?,
    };

    let resume_from = if opened.resumed { existing } else { 0 };
    if existing > 0 {
        debug!(task_id = task.id().0, existing, resumed = opened.resumed, "partial file found");
    }
    task.set_transfer_info(opened.total_size, resume_from, opened.mime_type.clone());

    let mut options = OpenOptions::new();
    if opened.resumed {
        options.append(true).create(true);
    } else {
        options.write(true).create(true).truncate(true);
    }
    let mut file = options.open(&partial).await?;

    let mut body = opened.body;
    let mut written = resume_from;
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            next = body.next() => Some(next),
        };
        let Some(next) = next else {
            file.flush().await?;
            return Ok(Outcome::Interrupted);
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        let len = chunk.len() as u64;

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                file.flush().await?;
                return Ok(Outcome::Interrupted);
            }
            _ = ctx.limiter.acquire(len) => {}
        }

        file.write_all(&chunk).await?;
        written += len;
        task.add_bytes(len);
    }
    file.flush().await?;
    drop(file);

    if let Some(expected) = opened.total_size
        && written != expected
    {
        return Err(DownloadError::IncompleteTransfer {
            expected,
            received: written,
        });
    }
    if token.is_cancelled() {
        return Ok(Outcome::Interrupted);
    }
    Ok(Outcome::Transferred(written))
}

/// Move the file into place and record the download on the episode
async fn finish(ctx: &WorkerContext, size: u64) -> Result<(), DownloadError> {
    let task = &ctx.task;
    let episode_id = task.episode_id();
    // The episode may have been purged while the transfer ran
    if !ctx.completion.episode_exists(episode_id).await {
        return Err(DownloadError::EpisodeGone { episode_id });
    }

    tokio::fs::rename(task.partial_path(), task.destination()).await?;
    ctx.completion
        .on_download_complete(task, size)
        .await
        .map_err(|e| DownloadError::Transfer(format!("Failed to record download: {}", e)))?;

    task.complete()?;
    info!(
        task_id = task.id().0,
        episode_id = episode_id.0,
        size,
        path = %task.destination().display(),
        "download finished"
    );
    Ok(())
}

async fn remove_partial(task: &DownloadTask) {
    let partial = task.partial_path();
    match tokio::fs::remove_file(&partial).await {
        Ok(()) => debug!(task_id = task.id().0, "partial file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(task_id = task.id().0, error = %e, "failed to remove partial file"),
    }
}
