//! Download task state machine
//!
//! A [`DownloadTask`] is the unit of work for one episode. Its observable state
//! lives behind a lock so the queue manager, the worker that owns the transfer, and
//! the status poller can all read and change it. Every status change goes through
//! [`TaskStatus::can_transition_to`]; an illegal change is rejected with
//! [`DownloadError::InvalidTransition`] and leaves the task untouched.
//!
//! Pause and cancel are cooperative: requesting either on a running task moves it
//! to `Pausing`/`Cancelling` and trips its cancellation token. The worker stops at
//! the next chunk boundary and acknowledges with `Paused`/`Cancelled`.

use crate::error::DownloadError;
use crate::model::Credentials;
use crate::types::{Activity, EpisodeId, PodcastId, TaskId, TaskSnapshot, TaskStatus};
use crate::utils::PARTIAL_SUFFIX;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Minimum interval between speed samples
const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Weight of the newest sample in the smoothed speed
const SPEED_SMOOTHING: f64 = 0.3;

/// Everything needed to create a task for an episode
#[derive(Clone, Debug)]
pub struct TaskRequest {
    /// Episode to download
    pub episode_id: EpisodeId,
    /// Podcast owning the episode
    pub podcast_id: PodcastId,
    /// Episode title (for display)
    pub title: String,
    /// Podcast title (for display)
    pub podcast_title: String,
    /// Media URL
    pub url: String,
    /// Final location of the downloaded file
    pub destination: PathBuf,
    /// Size announced by the feed (0 when unknown)
    pub expected_size: u64,
    /// Basic-auth credentials of the podcast
    pub credentials: Option<Credentials>,
    /// Transfer kind
    pub activity: Activity,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    progress: f64,
    speed_bps: u64,
    total_size: u64,
    downloaded: u64,
    error: Option<String>,
    mime_type: Option<String>,
    cancel: CancellationToken,
    sample_start: Option<Instant>,
    sample_bytes: u64,
}

impl TaskState {
    fn transition(&mut self, id: TaskId, to: TaskStatus) -> Result<(), DownloadError> {
        if !self.status.can_transition_to(to) {
            return Err(DownloadError::InvalidTransition {
                id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        if !to.is_active() {
            self.speed_bps = 0;
            self.sample_start = None;
            self.sample_bytes = 0;
        }
        Ok(())
    }

    fn recompute_progress(&mut self) {
        if self.total_size > 0 {
            let fraction = (self.downloaded as f64 / self.total_size as f64).min(1.0);
            self.progress = self.progress.max(fraction);
        }
    }
}

/// One episode download
#[derive(Debug)]
pub struct DownloadTask {
    id: TaskId,
    request: TaskRequest,
    state: Mutex<TaskState>,
}

impl DownloadTask {
    /// Create a task in `Queued` state, or `Paused` when `paused` is set
    pub fn new(request: TaskRequest, paused: bool) -> Self {
        let status = if paused {
            TaskStatus::Paused
        } else {
            TaskStatus::Queued
        };
        let total_size = request.expected_size;
        Self {
            id: TaskId::next(),
            request,
            state: Mutex::new(TaskState {
                status,
                progress: 0.0,
                speed_bps: 0,
                total_size,
                downloaded: 0,
                error: None,
                mime_type: None,
                cancel: CancellationToken::new(),
                sample_start: None,
                sample_bytes: 0,
            }),
        }
    }

    /// Create a paused task for a partial file found on disk
    ///
    /// Progress is reconstructed from the partial file's size.
    pub fn resumable(request: TaskRequest, partial_size: u64) -> Self {
        let task = Self::new(request, true);
        {
            let mut state = task.lock();
            state.downloaded = partial_size;
            state.recompute_progress();
        }
        task
    }

    /// Task ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Episode the task downloads
    pub fn episode_id(&self) -> EpisodeId {
        self.request.episode_id
    }

    /// Podcast owning the episode
    pub fn podcast_id(&self) -> PodcastId {
        self.request.podcast_id
    }

    /// Creation parameters
    pub fn request(&self) -> &TaskRequest {
        &self.request
    }

    /// Final location of the file
    pub fn destination(&self) -> &Path {
        &self.request.destination
    }

    /// Location of the in-progress file
    pub fn partial_path(&self) -> PathBuf {
        let mut name = self.request.destination.as_os_str().to_owned();
        name.push(PARTIAL_SUFFIX);
        PathBuf::from(name)
    }

    /// Current status
    pub fn status(&self) -> TaskStatus {
        self.lock().status
    }

    /// Progress fraction in [0, 1]
    pub fn progress(&self) -> f64 {
        self.lock().progress
    }

    /// Error message of a failed task
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// MIME type reported by the server
    pub fn mime_type(&self) -> Option<String> {
        self.lock().mime_type.clone()
    }

    /// Bytes transferred so far, including resumed bytes
    pub fn downloaded_bytes(&self) -> u64 {
        self.lock().downloaded
    }

    /// Token the worker watches for pause and cancel requests
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.lock().cancel.clone()
    }

    /// Copy of the observable fields
    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.lock();
        TaskSnapshot {
            id: self.id,
            episode_id: self.request.episode_id,
            podcast_id: self.request.podcast_id,
            title: self.request.title.clone(),
            podcast_title: self.request.podcast_title.clone(),
            status: state.status,
            progress: state.progress,
            speed_bps: state.speed_bps,
            total_size: state.total_size,
            downloaded_bytes: state.downloaded,
            error: state.error.clone(),
            activity: self.request.activity,
        }
    }

    /// Worker slot claimed the task (`Queued` -> `Downloading`)
    pub(crate) fn start(&self) -> Result<(), DownloadError> {
        let mut state = self.lock();
        state.transition(self.id, TaskStatus::Downloading)?;
        state.error = None;
        Ok(())
    }

    /// Request a pause
    ///
    /// A queued task pauses at once; a downloading task moves to `Pausing` until
    /// its worker stops. Pausing a paused task is a no-op.
    pub fn request_pause(&self) -> Result<TaskStatus, DownloadError> {
        let mut state = self.lock();
        match state.status {
            TaskStatus::Paused | TaskStatus::Pausing => {}
            TaskStatus::Queued => state.transition(self.id, TaskStatus::Paused)?,
            TaskStatus::Downloading => {
                state.transition(self.id, TaskStatus::Pausing)?;
                state.cancel.cancel();
            }
            _ => state.transition(self.id, TaskStatus::Pausing)?,
        }
        Ok(state.status)
    }

    /// Request a cancel
    ///
    /// Queued and paused tasks are cancelled at once; running tasks move to
    /// `Cancelling` until their worker stops.
    pub fn request_cancel(&self) -> Result<TaskStatus, DownloadError> {
        let mut state = self.lock();
        match state.status {
            TaskStatus::Cancelled | TaskStatus::Cancelling => {}
            TaskStatus::Queued | TaskStatus::Paused => {
                state.transition(self.id, TaskStatus::Cancelled)?;
                state.progress = 0.0;
                state.downloaded = 0;
            }
            TaskStatus::Downloading | TaskStatus::Pausing => {
                state.transition(self.id, TaskStatus::Cancelling)?;
                state.cancel.cancel();
            }
            _ => state.transition(self.id, TaskStatus::Cancelling)?,
        }
        Ok(state.status)
    }

    /// Explicit re-queue of a paused, failed or cancelled task
    pub fn request_queue(&self) -> Result<(), DownloadError> {
        let mut state = self.lock();
        state.transition(self.id, TaskStatus::Queued)?;
        state.error = None;
        state.cancel = CancellationToken::new();
        Ok(())
    }

    /// Response headers arrived
    pub(crate) fn set_transfer_info(
        &self,
        total_size: Option<u64>,
        resumed_from: u64,
        mime_type: Option<String>,
    ) {
        let mut state = self.lock();
        if let Some(total) = total_size.filter(|t| *t > 0) {
            state.total_size = total;
        }
        if resumed_from < state.downloaded {
            // Server ignored the range request, so the transfer starts over
            state.progress = 0.0;
        }
        state.downloaded = resumed_from;
        if mime_type.is_some() {
            state.mime_type = mime_type;
        }
        state.recompute_progress();
    }

    /// Account for a chunk written to the partial file
    pub(crate) fn add_bytes(&self, bytes: u64) {
        self.add_bytes_at(bytes, Instant::now());
    }

    pub(crate) fn add_bytes_at(&self, bytes: u64, now: Instant) {
        let mut state = self.lock();
        state.downloaded += bytes;
        state.recompute_progress();

        let start = *state.sample_start.get_or_insert(now);
        state.sample_bytes += bytes;
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= SPEED_SAMPLE_INTERVAL {
            let sample = state.sample_bytes as f64 / elapsed.as_secs_f64();
            state.speed_bps = if state.speed_bps == 0 {
                sample as u64
            } else {
                (SPEED_SMOOTHING * sample + (1.0 - SPEED_SMOOTHING) * state.speed_bps as f64)
                    as u64
            };
            state.sample_start = Some(now);
            state.sample_bytes = 0;
        }
    }

    /// Worker stopped because of a pause or cancel request
    ///
    /// Returns the acknowledged status (`Paused` or `Cancelled`).
    pub(crate) fn acknowledge_stop(&self) -> Result<TaskStatus, DownloadError> {
        let mut state = self.lock();
        let to = match state.status {
            TaskStatus::Cancelling => TaskStatus::Cancelled,
            _ => TaskStatus::Paused,
        };
        state.transition(self.id, to)?;
        if to == TaskStatus::Cancelled {
            state.progress = 0.0;
            state.downloaded = 0;
        }
        Ok(to)
    }

    /// Transfer finished and the file is in place
    pub(crate) fn complete(&self) -> Result<(), DownloadError> {
        let mut state = self.lock();
        if state.status == TaskStatus::Cancelling {
            // The file is already in place; only the cancel is acknowledged
            state.transition(self.id, TaskStatus::Cancelled)?;
            return Ok(());
        }
        state.transition(self.id, TaskStatus::Done)?;
        state.progress = 1.0;
        if state.total_size == 0 {
            state.total_size = state.downloaded;
        }
        Ok(())
    }

    /// Transfer failed; the message is kept for display
    pub(crate) fn fail(&self, error: &DownloadError) -> Result<(), DownloadError> {
        let mut state = self.lock();
        if state.status == TaskStatus::Cancelling {
            return state.transition(self.id, TaskStatus::Cancelled);
        }
        state.transition(self.id, TaskStatus::Failed)?;
        state.error = Some(error.to_string());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        // Every mutation leaves the state consistent before it can panic
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

