use super::transfer::{TransferExecutor, TransferRegistry, TransferRequest, TransferStream};
use super::{DownloadCompletion, DownloadQueueManager, DownloadTask, TaskRequest};
use crate::config::DownloadConfig;
use crate::error::DownloadError;
use crate::types::{Activity, EpisodeId, Event, PodcastId, TaskId, TaskStatus};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// In-memory executor serving `size` bytes in fixed chunks with a delay between them
pub(crate) struct FakeTransfer {
    pub(crate) size: u64,
    pub(crate) chunk_size: u64,
    pub(crate) chunk_delay: Duration,
    pub(crate) supports_resume: bool,
    /// Announced size, when it should differ from what is served
    pub(crate) announced_size: Option<u64>,
    fail_with: Mutex<Option<DownloadError>>,
    requests: Mutex<Vec<TransferRequest>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeTransfer {
    pub(crate) fn new(size: u64, chunk_size: u64, chunk_delay: Duration) -> Self {
        Self {
            size,
            chunk_size,
            chunk_delay,
            supports_resume: true,
            announced_size: None,
            fail_with: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Quick transfer of 1000 bytes
    pub(crate) fn quick() -> Self {
        Self::new(1000, 250, Duration::from_millis(1))
    }

    /// 1000 bytes over roughly a second
    pub(crate) fn slow() -> Self {
        Self::new(1000, 50, Duration::from_millis(50))
    }

    pub(crate) fn fail_with(&self, error: DownloadError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }

    pub(crate) fn succeed(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    pub(crate) fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of streams open at the same time
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransferExecutor for FakeTransfer {
    async fn open(&self, request: &TransferRequest) -> Result<TransferStream, DownloadError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(error);
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = ActiveGuard(self.active.clone());

        let resumed = self.supports_resume && request.resume_from > 0;
        let start = if resumed { request.resume_from.min(self.size) } else { 0 };
        let chunk_size = self.chunk_size;
        let delay = self.chunk_delay;
        let end = self.size;

        let body = stream::unfold((start, guard), move |(offset, guard)| async move {
            if offset >= end {
                return None;
            }
            tokio::time::sleep(delay).await;
            let len = chunk_size.min(end - offset);
            Some((Ok(vec![b'x'; len as usize]), (offset + len, guard)))
        })
        .boxed();

        Ok(TransferStream {
            total_size: Some(self.announced_size.unwrap_or(self.size)),
            mime_type: Some("audio/mpeg".to_string()),
            resumed,
            body,
        })
    }
}

/// Completion handler recording finished downloads
#[derive(Default)]
pub(crate) struct FakeCompletion {
    /// Episodes reported gone
    pub(crate) gone: Mutex<HashSet<EpisodeId>>,
    pub(crate) completed: Mutex<Vec<(TaskId, EpisodeId, u64)>>,
}

impl FakeCompletion {
    pub(crate) fn remove_episode(&self, episode_id: EpisodeId) {
        self.gone.lock().unwrap().insert(episode_id);
    }

    pub(crate) fn completed(&self) -> Vec<(TaskId, EpisodeId, u64)> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadCompletion for FakeCompletion {
    async fn episode_exists(&self, episode_id: EpisodeId) -> bool {
        !self.gone.lock().unwrap().contains(&episode_id)
    }

    async fn on_download_complete(&self, task: &DownloadTask, size: u64) -> crate::Result<()> {
        self.completed
            .lock()
            .unwrap()
            .push((task.id(), task.episode_id(), size));
        Ok(())
    }
}

pub(crate) fn request(dir: &Path, episode: i64) -> TaskRequest {
    TaskRequest {
        episode_id: EpisodeId(episode),
        podcast_id: PodcastId(1),
        title: format!("Episode {episode}"),
        podcast_title: "Fake Podcast".to_string(),
        url: format!("http://example.com/media/{episode}.mp3"),
        destination: dir.join(format!("episode-{episode}.mp3")),
        expected_size: 0,
        credentials: None,
        activity: Activity::Download,
    }
}

pub(crate) fn download_config(max_concurrent: usize) -> DownloadConfig {
    DownloadConfig {
        max_concurrent_downloads: max_concurrent,
        limit_downloads_enabled: true,
        limit_rate_enabled: false,
        ..DownloadConfig::default()
    }
}

pub(crate) struct QueueHarness {
    pub(crate) queue: DownloadQueueManager,
    pub(crate) transfer: Arc<FakeTransfer>,
    pub(crate) registry: TransferRegistry,
    pub(crate) completion: Arc<FakeCompletion>,
    pub(crate) events: broadcast::Receiver<Event>,
    pub(crate) dir: tempfile::TempDir,
}

impl QueueHarness {
    pub(crate) fn new(max_concurrent: usize, transfer: FakeTransfer) -> Self {
        let transfer = Arc::new(transfer);
        let completion = Arc::new(FakeCompletion::default());
        let (event_tx, events) = broadcast::channel(1024);
        let registry = TransferRegistry::new(transfer.clone());
        let queue = DownloadQueueManager::new(
            &download_config(max_concurrent),
            Duration::from_millis(20),
            registry.clone(),
            completion.clone(),
            event_tx,
        );
        Self {
            queue,
            transfer,
            registry,
            completion,
            events,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub(crate) fn request(&self, episode: i64) -> TaskRequest {
        request(self.dir.path(), episode)
    }

    pub(crate) fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Poll until `task` reaches `status`; panics after five seconds
pub(crate) async fn wait_for_status(task: &DownloadTask, status: TaskStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while task.status() != status {
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {} stuck in {} waiting for {}",
            task.id(),
            task.status(),
            status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until `predicate` holds; panics after five seconds
pub(crate) async fn wait_until(mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !predicate() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
