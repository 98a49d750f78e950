mod migrations;

use crate::db::Database;
use crate::model::Episode;
use crate::types::PodcastId;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::NamedTempFile;

/// Fresh database in a temp file (keep the file alive for the test's duration)
async fn test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, n, 12, 0, 0).unwrap()
}

fn episode(podcast_id: PodcastId, guid: &str, published_day: u32) -> Episode {
    let mut ep = Episode::new(
        podcast_id,
        guid,
        format!("http://example.com/{guid}.mp3"),
    );
    ep.title = format!("Episode {guid}");
    ep.published = Some(day(published_day));
    ep
}
