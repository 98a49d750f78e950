//! Download queue manager
//!
//! Tasks live in one ordered list behind a single lock. A coordinator task owns
//! dispatch: it wakes when the list changes or a worker reports back, starts the
//! first queued tasks in list order while slots are free, and polls task status on
//! a fixed interval while any worker is running.

use super::status::StatusTracker;
use super::task::{DownloadTask, TaskRequest};
use super::transfer::TransferRegistry;
use super::worker::{supervise_worker, WorkerContext, WorkerFinished};
use super::DownloadCompletion;
use crate::config::DownloadConfig;
use crate::error::DownloadError;
use crate::speed_limiter::SpeedLimiter;
use crate::types::{EpisodeId, Event, PodcastId, TaskId, TaskSnapshot, TaskStatus};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval between idle checks while waiting for workers to stop
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct QueueState {
    tasks: Vec<Arc<DownloadTask>>,
    enabled: bool,
    max_concurrent: usize,
    limit_downloads: bool,
    bandwidth_limit_kbps: f64,
    limit_rate: bool,
    /// Tasks with a live worker
    running: HashSet<TaskId>,
    /// Running tasks started by force_start, not counted against the cap
    forced: HashSet<TaskId>,
}

impl QueueState {
    fn position(&self, id: TaskId) -> Result<usize> {
        self.tasks
            .iter()
            .position(|t| t.id() == id)
            .ok_or(Error::Download(DownloadError::TaskNotFound(id)))
    }

    fn find(&self, id: TaskId) -> Result<Arc<DownloadTask>> {
        let index = self.position(id)?;
        Ok(self.tasks[index].clone())
    }

    fn slots_used(&self) -> usize {
        self.running
            .iter()
            .filter(|id| !self.forced.contains(id))
            .count()
    }

    fn speed_limit_bps(&self) -> Option<u64> {
        if self.limit_rate && self.bandwidth_limit_kbps > 0.0 {
            Some((self.bandwidth_limit_kbps * 1024.0) as u64)
        } else {
            None
        }
    }
}

struct Inner {
    state: Mutex<QueueState>,
    wake: Arc<Notify>,
    limiter: SpeedLimiter,
    registry: TransferRegistry,
    completion: Arc<dyn DownloadCompletion>,
    event_tx: broadcast::Sender<Event>,
    done_tx: mpsc::UnboundedSender<WorkerFinished>,
    accepting: AtomicBool,
    shutdown: CancellationToken,
}

/// Bounded-concurrency scheduler for [`DownloadTask`]s
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct DownloadQueueManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DownloadQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("DownloadQueueManager")
            .field("tasks", &state.tasks.len())
            .field("running", &state.running.len())
            .field("enabled", &state.enabled)
            .finish()
    }
}

impl DownloadQueueManager {
    /// Create the manager and spawn its coordinator
    ///
    /// Must be called from within a tokio runtime. Dispatch starts enabled.
    ///
    /// # Arguments
    ///
    /// * `config` - Concurrency and bandwidth settings
    /// * `status_refresh_interval` - Progress event interval while workers run
    /// * `registry` - Picks the executor for each episode URL
    /// * `completion` - Store callbacks of the workers
    /// * `event_tx` - Receives task events
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use podcast_dl::download::{HttpTransfer, TransferRegistry};
    /// use podcast_dl::{Config, Database, DownloadQueueManager, Library, NoOpHooks};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use tokio::sync::broadcast;
    ///
    /// # async fn example() -> podcast_dl::Result<()> {
    /// let config = Config::default();
    /// let db = Arc::new(Database::new(&config.persistence.database_path).await?);
    /// let (event_tx, _events) = broadcast::channel(64);
    /// let library = Arc::new(Library::new(
    ///     db,
    ///     &config.download,
    ///     Arc::new(NoOpHooks),
    ///     event_tx.clone(),
    /// ));
    ///
    /// let http = HttpTransfer::new("podcast-dl", Duration::from_secs(30))?;
    /// let queue = DownloadQueueManager::new(
    ///     &config.download,
    ///     Duration::from_secs(1),
    ///     TransferRegistry::new(Arc::new(http)),
    ///     library,
    ///     event_tx,
    /// );
    /// queue.pause_all();
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        config: &DownloadConfig,
        status_refresh_interval: Duration,
        registry: TransferRegistry,
        completion: Arc<dyn DownloadCompletion>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let wake = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState {
                tasks: Vec::new(),
                enabled: true,
                max_concurrent: config.max_concurrent_downloads.max(1),
                limit_downloads: config.limit_downloads_enabled,
                bandwidth_limit_kbps: config.bandwidth_limit_kbps,
                limit_rate: config.limit_rate_enabled,
                running: HashSet::new(),
                forced: HashSet::new(),
            }),
            wake: wake.clone(),
            limiter: SpeedLimiter::new(config.speed_limit_bps()),
            registry,
            completion,
            event_tx,
            done_tx,
            accepting: AtomicBool::new(true),
            shutdown: shutdown.clone(),
        });

        tokio::spawn(coordinate(
            Arc::downgrade(&inner),
            wake,
            done_rx,
            shutdown,
            status_refresh_interval,
        ));

        Self { inner }
    }

    /// Resume dispatch of queued tasks
    pub fn enable(&self) {
        let changed = {
            let mut state = self.inner.lock();
            !std::mem::replace(&mut state.enabled, true)
        };
        if changed {
            info!("download queue enabled");
            self.inner.emit(Event::QueueEnabled);
            self.inner.wake.notify_one();
        }
    }

    /// Stop dispatching new tasks; running tasks continue
    pub fn disable(&self) {
        let changed = {
            let mut state = self.inner.lock();
            std::mem::replace(&mut state.enabled, false)
        };
        if changed {
            info!("download queue disabled");
            self.inner.emit(Event::QueueDisabled);
        }
    }

    /// Whether dispatch is enabled
    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Add a task to the end of the list
    ///
    /// Adding a task that is already listed does nothing and returns false.
    ///
    /// # Errors
    /// Returns [`Error::ShuttingDown`] once shutdown has begun
    pub fn add_task(&self, task: Arc<DownloadTask>) -> Result<bool> {
        self.ensure_accepting()?;
        {
            let mut state = self.inner.lock();
            if state.tasks.iter().any(|t| t.id() == task.id()) {
                return Ok(false);
            }
            state.tasks.push(task.clone());
        }
        debug!(task_id = task.id().0, episode_id = task.episode_id().0, "task added");
        self.inner.emit(Event::TaskAdded {
            task: task.snapshot(),
        });
        self.inner.wake.notify_one();
        Ok(true)
    }

    /// Get or create the task for an episode and queue it
    ///
    /// A listed task for the same episode is reused: re-queued when it can be
    /// (unless `paused`), otherwise returned as is. A finished task is replaced by a
    /// fresh one.
    ///
    /// # Errors
    /// Returns [`Error::ShuttingDown`] once shutdown has begun
    pub fn queue_episode(&self, request: TaskRequest, paused: bool) -> Result<Arc<DownloadTask>> {
        self.ensure_accepting()?;

        let existing = {
            let state = self.inner.lock();
            state
                .tasks
                .iter()
                .find(|t| t.episode_id() == request.episode_id)
                .cloned()
        };

        if let Some(task) = existing {
            if task.status() != TaskStatus::Done {
                if !paused && task.status().can_queue() {
                    task.request_queue()?;
                    self.inner.wake.notify_one();
                }
                debug!(task_id = task.id().0, "reusing task for episode");
                return Ok(task);
            }
            self.remove_task(task.id())?;
        }

        let task = Arc::new(DownloadTask::new(request, paused));
        self.add_task(task.clone())?;
        Ok(task)
    }

    /// Start a task now, bypassing the concurrency cap and the enabled flag
    ///
    /// # Errors
    /// Returns error if the task is unknown or cannot be started from its state
    pub fn force_start(&self, id: TaskId) -> Result<()> {
        self.ensure_accepting()?;
        let task = {
            let mut state = self.inner.lock();
            let task = state.find(id)?;
            if state.running.contains(&id) {
                return Ok(());
            }
            if task.status().can_queue() {
                task.request_queue()?;
            }
            task.start()?;
            state.running.insert(id);
            state.forced.insert(id);
            task
        };
        info!(task_id = id.0, "force-starting download");
        self.inner.spawn_worker(task);
        Ok(())
    }

    /// Move a task directly in front of another
    ///
    /// # Errors
    /// Returns [`DownloadError::TaskNotFound`] if either task is unknown
    pub fn move_before(&self, id: TaskId, before: TaskId) -> Result<()> {
        self.relocate(id, before, 0)
    }

    /// Move a task directly behind another
    ///
    /// # Errors
    /// Returns [`DownloadError::TaskNotFound`] if either task is unknown
    pub fn move_after(&self, id: TaskId, after: TaskId) -> Result<()> {
        self.relocate(id, after, 1)
    }

    fn relocate(&self, id: TaskId, anchor: TaskId, offset: usize) -> Result<()> {
        if id == anchor {
            return Ok(());
        }
        let mut state = self.inner.lock();
        state.position(anchor)?;
        let from = state.position(id)?;
        let task = state.tasks.remove(from);
        let to = state.position(anchor)? + offset;
        state.tasks.insert(to, task);
        Ok(())
    }

    /// Pause a task (queued tasks pause at once, running ones at the next chunk)
    ///
    /// # Errors
    /// Returns error if the task is unknown or cannot be paused
    pub fn pause_task(&self, id: TaskId) -> Result<TaskStatus> {
        let task = self.inner.lock().find(id)?;
        let status = task.request_pause()?;
        debug!(task_id = id.0, status = ?status, "pause requested");
        self.inner.wake.notify_one();
        Ok(status)
    }

    /// Cancel a task; its partial file is deleted
    ///
    /// # Errors
    /// Returns error if the task is unknown or already finished
    pub async fn cancel_task(&self, id: TaskId) -> Result<TaskStatus> {
        let task = self.inner.lock().find(id)?;
        let status = task.request_cancel()?;
        debug!(task_id = id.0, status = ?status, "cancel requested");
        if status == TaskStatus::Cancelled {
            // No worker owns the partial file
            match tokio::fs::remove_file(task.partial_path()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(task_id = id.0, error = %e, "failed to remove partial file"),
            }
        }
        self.inner.wake.notify_one();
        Ok(status)
    }

    /// Re-queue a paused, failed or cancelled task
    ///
    /// # Errors
    /// Returns error if the task is unknown or cannot be queued
    pub fn queue_task(&self, id: TaskId) -> Result<()> {
        self.ensure_accepting()?;
        let task = self.inner.lock().find(id)?;
        task.request_queue()?;
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Remove a finished task from the list
    ///
    /// # Errors
    /// Returns error if the task is unknown or not in a removable state
    pub fn remove_task(&self, id: TaskId) -> Result<()> {
        {
            let mut state = self.inner.lock();
            let index = state.position(id)?;
            let status = state.tasks[index].status();
            if !status.can_remove() {
                return Err(Error::Download(DownloadError::NotRemovable { id, status }));
            }
            state.tasks.remove(index);
        }
        debug!(task_id = id.0, "task removed from list");
        self.inner.emit(Event::TaskRemoved { id });
        Ok(())
    }

    /// Remove every done, failed and cancelled task; returns how many were removed
    pub fn cleanup_finished(&self) -> usize {
        let removed: Vec<TaskId> = {
            let mut state = self.inner.lock();
            let (finished, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.tasks)
                .into_iter()
                .partition(|t| t.status().can_remove());
            state.tasks = kept;
            finished.iter().map(|t| t.id()).collect()
        };
        for id in &removed {
            self.inner.emit(Event::TaskRemoved { id: *id });
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "finished tasks cleaned up");
        }
        removed.len()
    }

    /// Whether any worker is running
    pub fn has_workers(&self) -> bool {
        !self.inner.lock().running.is_empty()
    }

    /// Whether any task is queued or owned by a worker
    pub fn are_queued_or_active_tasks(&self) -> bool {
        self.inner.lock().tasks.iter().any(|t| {
            let status = t.status();
            status == TaskStatus::Queued || status.is_active()
        })
    }

    /// Change the concurrency cap (clamped to at least 1)
    pub fn set_max_concurrent(&self, max: usize) {
        let (max_concurrent, enabled) = {
            let mut state = self.inner.lock();
            state.max_concurrent = max.max(1);
            (state.max_concurrent, state.limit_downloads)
        };
        self.download_limit_changed(max_concurrent, enabled);
    }

    /// Toggle enforcement of the concurrency cap
    pub fn set_limit_downloads_enabled(&self, enabled: bool) {
        let max_concurrent = {
            let mut state = self.inner.lock();
            state.limit_downloads = enabled;
            state.max_concurrent
        };
        self.download_limit_changed(max_concurrent, enabled);
    }

    /// Concurrency cap and whether it is enforced
    pub fn download_limit(&self) -> (usize, bool) {
        let state = self.inner.lock();
        (state.max_concurrent, state.limit_downloads)
    }

    fn download_limit_changed(&self, max_concurrent: usize, enabled: bool) {
        info!(max_concurrent, enabled, "download limit changed");
        self.inner.emit(Event::DownloadLimitChanged {
            max_concurrent,
            enabled,
        });
        self.inner.wake.notify_one();
    }

    /// Change the aggregate bandwidth cap (KiB/s) and whether it is enforced
    pub fn set_bandwidth_limit(&self, kbps: f64, enabled: bool) {
        let limit_bps = {
            let mut state = self.inner.lock();
            state.bandwidth_limit_kbps = kbps;
            state.limit_rate = enabled;
            state.speed_limit_bps()
        };
        self.inner.limiter.set_limit(limit_bps);
        info!(limit_bps = ?limit_bps, "bandwidth limit changed");
        self.inner.emit(Event::SpeedLimitChanged { limit_bps });
    }

    /// Current bandwidth cap in bytes per second (None = unlimited)
    pub fn speed_limit(&self) -> Option<u64> {
        self.inner.limiter.limit()
    }

    /// Snapshots of every listed task, in list order
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.inner.snapshots()
    }

    /// Listed tasks, in list order
    pub fn tasks(&self) -> Vec<Arc<DownloadTask>> {
        self.inner.lock().tasks.clone()
    }

    /// Look up a task
    pub fn task(&self, id: TaskId) -> Option<Arc<DownloadTask>> {
        self.inner.lock().find(id).ok()
    }

    /// Episodes with a task that has not finished
    ///
    /// These are protected from purging during feed updates.
    pub fn downloading_episodes(&self) -> HashSet<EpisodeId> {
        self.inner
            .lock()
            .tasks
            .iter()
            .filter(|t| !t.status().can_remove())
            .map(|t| t.episode_id())
            .collect()
    }

    /// Whether a podcast has a listed task that did not finish successfully
    ///
    /// Such tasks keep writing to (or resuming from) their destination, so the
    /// podcast's folder has to stay where it is.
    pub fn has_unfinished_tasks(&self, podcast_id: PodcastId) -> bool {
        self.inner
            .lock()
            .tasks
            .iter()
            .any(|t| t.podcast_id() == podcast_id && t.status() != TaskStatus::Done)
    }

    /// Cancel every unfinished task of a podcast
    pub async fn cancel_podcast(&self, podcast_id: PodcastId) {
        let ids: Vec<TaskId> = self
            .inner
            .lock()
            .tasks
            .iter()
            .filter(|t| t.podcast_id() == podcast_id && t.status().can_cancel())
            .map(|t| t.id())
            .collect();
        for id in ids {
            if let Err(e) = self.cancel_task(id).await {
                warn!(task_id = id.0, error = %e, "failed to cancel task");
            }
        }
    }

    /// Pause every queued and running task
    pub fn pause_all(&self) {
        for task in self.tasks() {
            if task.status().can_pause()
                && let Err(e) = task.request_pause()
            {
                warn!(task_id = task.id().0, error = %e, "failed to pause task");
            }
        }
    }

    /// Wait until no worker is running; returns false on timeout
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            while self.has_workers() {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Wait until no worker of a podcast is running; returns false on timeout
    pub async fn wait_podcast_idle(&self, podcast_id: PodcastId, timeout: Duration) -> bool {
        let busy = || {
            let state = self.inner.lock();
            state
                .tasks
                .iter()
                .any(|t| t.podcast_id() == podcast_id && state.running.contains(&t.id()))
        };
        let wait = async {
            while busy() {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Stop accepting tasks, pause everything and wait for workers
    ///
    /// Returns false when workers were still running after `timeout`. Partial files
    /// of paused tasks stay on disk for the next start.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        info!("shutting down download queue");
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.disable();
        self.pause_all();

        let idle = self.wait_idle(timeout).await;
        if idle {
            info!("all downloads stopped");
        } else {
            warn!("timeout waiting for downloads to stop, proceeding with shutdown");
        }
        self.inner.shutdown.cancel();
        idle
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.inner.accepting.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every mutation leaves the state consistent before it can panic
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.lock().tasks.iter().map(|t| t.snapshot()).collect()
    }

    /// Start queued tasks in list order while slots are free
    fn dispatch(&self) {
        if !self.accepting.load(Ordering::SeqCst) {
            return;
        }
        let started = {
            let mut state = self.lock();
            if !state.enabled {
                return;
            }
            let mut started = Vec::new();
            while !state.limit_downloads || state.slots_used() < state.max_concurrent {
                let next = state
                    .tasks
                    .iter()
                    .find(|t| t.status() == TaskStatus::Queued && !state.running.contains(&t.id()))
                    .cloned();
                let Some(task) = next else {
                    break;
                };
                if let Err(e) = task.start() {
                    warn!(task_id = task.id().0, error = %e, "failed to start task");
                    break;
                }
                state.running.insert(task.id());
                started.push(task);
            }
            started
        };

        for task in started {
            self.spawn_worker(task);
        }
    }

    fn spawn_worker(&self, task: Arc<DownloadTask>) {
        let ctx = WorkerContext {
            executor: self.registry.executor_for(&task.request().url),
            limiter: self.limiter.clone(),
            completion: self.completion.clone(),
            done_tx: self.done_tx.clone(),
            task,
        };
        tokio::spawn(supervise_worker(ctx));
    }

    fn worker_finished(&self, finished: WorkerFinished) {
        let mut state = self.lock();
        state.running.remove(&finished.task_id);
        state.forced.remove(&finished.task_id);
        debug!(
            task_id = finished.task_id.0,
            status = ?finished.status,
            running = state.running.len(),
            "worker finished"
        );
    }
}

/// Coordinator loop: the only place that frees slots and dispatches
///
/// Holds a weak reference so dropping every manager handle ends the loop.
async fn coordinate(
    inner: Weak<Inner>,
    wake: Arc<Notify>,
    mut done_rx: mpsc::UnboundedReceiver<WorkerFinished>,
    shutdown: CancellationToken,
    refresh_interval: Duration,
) {
    let mut tracker = StatusTracker::default();
    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let polling = match inner.upgrade() {
            Some(inner) => !inner.lock().running.is_empty(),
            None => break,
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            finished = done_rx.recv() => {
                let Some(finished) = finished else {
                    break;
                };
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.worker_finished(finished);
            }
            _ = wake.notified() => {}
            _ = ticker.tick(), if polling => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.dispatch();
        for event in tracker.poll(&inner.snapshots()) {
            inner.emit(event);
        }
    }
    debug!("download coordinator stopped");
}
