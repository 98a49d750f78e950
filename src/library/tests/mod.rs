mod filenames;
mod scan;

use super::*;
use crate::hooks::NoOpHooks;
use chrono::{TimeZone, Utc};
use tempfile::{NamedTempFile, TempDir};

struct Harness {
    library: Library,
    db: Arc<Database>,
    events: broadcast::Receiver<Event>,
    downloads: TempDir,
    _db_file: NamedTempFile,
}

async fn harness() -> Harness {
    harness_with(FilenameSource::Title, Arc::new(NoOpHooks)).await
}

async fn harness_with(source: FilenameSource, hooks: Arc<dyn ExtensionHooks>) -> Harness {
    let db_file = NamedTempFile::new().unwrap();
    let db = Arc::new(Database::new(db_file.path()).await.unwrap());
    let downloads = tempfile::tempdir().unwrap();
    let config = DownloadConfig {
        download_dir: downloads.path().to_path_buf(),
        filename_source: source,
        ..DownloadConfig::default()
    };
    let (event_tx, events) = broadcast::channel(64);
    Harness {
        library: Library::new(db.clone(), &config, hooks, event_tx),
        db,
        events,
        downloads,
        _db_file: db_file,
    }
}

impl Harness {
    /// Store a podcast with the given title and episodes (guid, title) and register it
    async fn podcast(&self, url: &str, title: &str, episodes: &[(&str, &str)]) -> PodcastId {
        let id = self.db.insert_podcast(url, None).await.unwrap();
        let mut podcast = Podcast::new(id, url);
        podcast.title = title.to_string();
        self.db.save_podcast(&podcast).await.unwrap();
        for (n, (guid, title)) in episodes.iter().enumerate() {
            let mut episode = Episode::new(id, *guid, format!("http://example.com/media/{guid}.mp3"));
            episode.title = title.to_string();
            episode.mime_type = "audio/mpeg".to_string();
            episode.published = Some(Utc.with_ymd_and_hms(2024, 1, n as u32 + 1, 12, 0, 0).unwrap());
            self.db.save_episode(&mut episode).await.unwrap();
            podcast.episodes.push(episode);
        }
        self.library.insert(podcast);
        id
    }

    async fn snapshot(&self, id: PodcastId) -> Podcast {
        self.library.podcast(id).unwrap().lock().await.clone()
    }

    async fn episode_id(&self, id: PodcastId, guid: &str) -> EpisodeId {
        self.snapshot(id)
            .await
            .episode_by_guid(guid)
            .and_then(|e| e.id)
            .unwrap()
    }

    fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
