mod redirects;

use super::*;
use crate::feed::test_helpers::{FakeFetcher, Scripted, day, entry, feed};
use tempfile::NamedTempFile;

const FEED_URL: &str = "http://example.com/feed.xml";

struct Harness {
    db: Arc<Database>,
    fetcher: Arc<FakeFetcher>,
    updater: FeedUpdater,
    podcast: Podcast,
    _db_file: NamedTempFile,
}

async fn harness() -> Harness {
    let db_file = NamedTempFile::new().unwrap();
    let db = Arc::new(Database::new(db_file.path()).await.unwrap());
    let fetcher = Arc::new(FakeFetcher::new());
    let updater = FeedUpdater::new(fetcher.clone(), db.clone(), 5, 50);
    let id = db.insert_podcast(FEED_URL, None).await.unwrap();
    Harness {
        db,
        fetcher,
        updater,
        podcast: Podcast::new(id, FEED_URL),
        _db_file: db_file,
    }
}

impl Harness {
    /// Run one update against the next scripted response
    async fn update(&mut self, max_episodes: usize) -> Result<Vec<Episode>> {
        self.updater
            .update(&mut self.podcast, max_episodes, &HashSet::new())
            .await
    }

    fn guids(&self) -> Vec<String> {
        self.podcast.episodes.iter().map(|e| e.guid.clone()).collect()
    }

    async fn stored_guids(&self) -> Vec<String> {
        self.db
            .load_episodes(self.podcast.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.guid)
            .collect()
    }
}
