use super::*;
use std::time::Duration;

#[tokio::test]
async fn test_subscribe_fetches_and_registers() {
    let mut h = ClientHarness::new().await;
    let id = h.subscribe_three().await;

    let podcast = h.podcast(id).await;
    assert_eq!(podcast.title, "Fake Podcast");
    assert_eq!(podcast.episodes.len(), 3);
    assert_eq!(podcast.download_folder.as_deref(), Some("Fake Podcast"));
    assert!(h.client.db.get_podcast_by_url(FEED_URL).await.unwrap().is_some());
    assert_eq!(h.hooks.subscribed.load(Ordering::SeqCst), 1);
    assert!(
        h.drain_events()
            .iter()
            .any(|e| matches!(e, Event::PodcastListChanged))
    );
}

#[tokio::test]
async fn test_subscribe_twice_is_duplicate() {
    let h = ClientHarness::new().await;
    h.subscribe_three().await;
    let err = h.client.subscribe_podcast(FEED_URL, None).await.unwrap_err();
    assert!(matches!(err, Error::Duplicate(_)));
    assert_eq!(h.client.library().len(), 1);
}

#[tokio::test]
async fn test_failed_subscribe_rolls_back() {
    let h = ClientHarness::new().await;
    h.fetcher
        .push(Scripted::Fail(FeedError::AuthenticationRequired));
    let err = h.client.subscribe_podcast(FEED_URL, None).await.unwrap_err();
    assert_eq!(err.feed_kind(), Some(FeedErrorKind::Authentication));
    assert!(h.client.db.get_podcast_by_url(FEED_URL).await.unwrap().is_none());
    assert!(h.client.library().is_empty());

    // Retrying with credentials works once the feed answers
    h.fetcher.push(Scripted::Updated(feed(vec![entry("a", Some(day(1)))])));
    let credentials = crate::model::Credentials {
        username: "user".into(),
        password: "secret".into(),
    };
    let id = h.client.subscribe_podcast(FEED_URL, Some(credentials)).await.unwrap();
    let requests = h.fetcher.requests();
    assert_eq!(
        requests.last().unwrap().credentials.as_ref().map(|c| c.username.as_str()),
        Some("user")
    );
    assert_eq!(h.podcast(id).await.episodes.len(), 1);
}

#[tokio::test]
async fn test_subscribe_to_feed_without_episodes_fails() {
    let h = ClientHarness::new().await;
    h.fetcher.push(Scripted::Updated(feed(Vec::new())));
    let err = h.client.subscribe_podcast(FEED_URL, None).await.unwrap_err();
    assert!(matches!(err, Error::Feed(FeedError::InvalidFeed(_))));
    assert!(h.client.db.get_podcast_by_url(FEED_URL).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unsubscribe_removes_everything() {
    let mut h = ClientHarness::new().await;
    let id = h.subscribe_three().await;
    let episode_id = h.episode_id(id, "c").await;
    let task = h.client.download_episode(id, episode_id).await.unwrap();
    wait_for_status(&task, TaskStatus::Done).await;
    let folder = h.dir.path().join("downloads").join("Fake Podcast");
    assert!(folder.exists());
    h.drain_events();

    h.client.unsubscribe_podcast(id).await.unwrap();
    assert!(!folder.exists());
    assert!(h.client.library().podcast(id).is_none());
    assert!(h.client.db.get_podcast_by_url(FEED_URL).await.unwrap().is_none());
    assert!(h.client.db.load_episodes(id).await.unwrap().is_empty());
    assert_eq!(h.hooks.removed.load(Ordering::SeqCst), 1);
    assert!(
        h.drain_events()
            .iter()
            .any(|e| matches!(e, Event::PodcastListChanged))
    );

    let err = h.client.unsubscribe_podcast(id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_unsubscribe_cancels_running_downloads() {
    let h = ClientHarness::with(FakeTransfer::slow(), |_| {}).await;
    let id = h.subscribe_three().await;
    let episode_id = h.episode_id(id, "a").await;
    let task = h.client.download_episode(id, episode_id).await.unwrap();
    wait_for_status(&task, TaskStatus::Downloading).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !task.partial_path().exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let folder = h.dir.path().join("downloads").join("Fake Podcast");

    // The worker has acknowledged the cancel before the folder goes away
    h.client.unsubscribe_podcast(id).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Cancelled);
    assert!(!h.client.queue.has_workers());
    assert!(!task.partial_path().exists());
    assert!(!folder.exists());
}
