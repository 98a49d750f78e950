use super::*;
use crate::download::DownloadTask;
use crate::types::TaskStatus;

/// Apply `change` to a stored episode and persist it
async fn edit_episode(h: &Harness, id: PodcastId, guid: &str, change: impl FnOnce(&mut Episode)) {
    let shared = h.library.podcast(id).unwrap();
    let mut podcast = shared.lock().await;
    let episode = podcast.episodes.iter_mut().find(|e| e.guid == guid).unwrap();
    change(episode);
    h.db.save_episode(episode).await.unwrap();
}

#[tokio::test]
async fn test_missing_download_becomes_deleted() {
    let h = harness().await;
    let id = h.podcast("http://example.com/feed", "Show", &[("a", "First")]).await;
    let episode_id = h.episode_id(id, "a").await;
    h.library.prepare_download(id, episode_id).await.unwrap();
    edit_episode(&h, id, "a", |e| e.on_downloaded(100, None)).await;

    let report = h.library.load(false).await.unwrap();
    assert_eq!(report.podcasts, 1);
    assert_eq!(report.reconciled, 1);

    let podcast = h.snapshot(id).await;
    let episode = podcast.episode(episode_id).unwrap();
    assert_eq!(episode.state, EpisodeState::Deleted);
    assert!(!episode.is_new);
    assert_eq!(h.db.load_episodes(id).await.unwrap()[0].state, EpisodeState::Deleted);
}

#[tokio::test]
async fn test_external_file_marks_episode_downloaded() {
    let h = harness().await;
    let id = h
        .podcast("http://example.com/feed", "Show", &[("a", "First"), ("b", "Second")])
        .await;
    {
        let shared = h.library.podcast(id).unwrap();
        let mut podcast = shared.lock().await;
        h.library.assign_folder(&mut podcast).await.unwrap();
    }
    let dir = h.downloads.path().join("Show");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("Second.mp3"), vec![0u8; 42]).await.unwrap();

    let report = h.library.load(false).await.unwrap();
    assert_eq!(report.reconciled, 1);

    let podcast = h.snapshot(id).await;
    let second = podcast.episode_by_guid("b").unwrap();
    assert_eq!(second.state, EpisodeState::Downloaded);
    assert_eq!(second.file_size, 42);
    assert_eq!(second.download_filename.as_deref(), Some("Second.mp3"));
    assert_eq!(podcast.episode_by_guid("a").unwrap().state, EpisodeState::Normal);

    // A second pass finds nothing to change
    assert_eq!(h.library.load(false).await.unwrap().reconciled, 0);
}

#[tokio::test]
async fn test_partial_file_offered_for_resume() {
    let h = harness().await;
    let id = h.podcast("http://example.com/feed", "Show", &[("a", "First")]).await;
    let episode_id = h.episode_id(id, "a").await;
    edit_episode(&h, id, "a", |e| e.file_size = 1000).await;
    let request = h.library.prepare_download(id, episode_id).await.unwrap();

    let partial = h.downloads.path().join("Show").join("First.mp3.partial");
    tokio::fs::create_dir_all(partial.parent().unwrap()).await.unwrap();
    tokio::fs::write(&partial, vec![0u8; 400]).await.unwrap();

    let report = h.library.load(true).await.unwrap();
    assert!(report.orphaned.is_empty());
    assert_eq!(report.resumable.len(), 1);
    let resumable = &report.resumable[0];
    assert_eq!(resumable.partial_size, 400);
    assert_eq!(resumable.request.episode_id, episode_id);
    assert_eq!(resumable.request.destination, request.destination);
    assert_eq!(resumable.request.expected_size, 1000);
    assert!(partial.exists());

    let task = DownloadTask::resumable(resumable.request.clone(), resumable.partial_size);
    assert_eq!(task.status(), TaskStatus::Paused);
    assert!((task.progress() - 0.4).abs() < f64::EPSILON);
    assert_eq!(task.partial_path(), partial);
}

#[tokio::test]
async fn test_orphaned_partials_deleted_when_configured() {
    let h = harness().await;
    let id = h.podcast("http://example.com/feed", "Show", &[("a", "First")]).await;
    let episode_id = h.episode_id(id, "a").await;
    h.library.prepare_download(id, episode_id).await.unwrap();

    let known = h.downloads.path().join("Show");
    let unknown = h.downloads.path().join("Gone Podcast");
    tokio::fs::create_dir_all(&known).await.unwrap();
    tokio::fs::create_dir_all(&unknown).await.unwrap();
    let stray = known.join("Stray.mp3.partial");
    let lost = unknown.join("Old.mp3.partial");
    tokio::fs::write(&stray, b"x").await.unwrap();
    tokio::fs::write(&lost, b"x").await.unwrap();
    tokio::fs::write(unknown.join("Old.mp3"), b"x").await.unwrap();

    let report = h.library.load(false).await.unwrap();
    assert_eq!(report.orphaned.len(), 2);
    assert!(stray.exists() && lost.exists());

    let report = h.library.load(true).await.unwrap();
    assert_eq!(report.orphaned.len(), 2);
    assert!(!stray.exists());
    assert!(!lost.exists());
    assert!(unknown.join("Old.mp3").exists());
}

#[tokio::test]
async fn test_load_with_empty_download_dir() {
    let h = harness().await;
    h.podcast("http://example.com/feed", "Show", &[("a", "First")]).await;
    let report = h.library.load(false).await.unwrap();
    assert_eq!(report.podcasts, 1);
    assert_eq!(report.reconciled, 0);
    assert!(report.resumable.is_empty());
    assert_eq!(h.library.len(), 1);
}
