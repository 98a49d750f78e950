use super::*;

fn episode(title: &str, url: &str, mime: &str) -> Episode {
    let mut episode = Episode::new(PodcastId(1), "guid", url);
    episode.title = title.to_string();
    episode.mime_type = mime.to_string();
    episode
}

#[test]
fn test_folder_name_prefers_title() {
    let mut podcast = Podcast::new(PodcastId(1), "http://example.com/feeds/show.xml");
    assert_eq!(desired_folder_name(&podcast), "show");

    podcast.title = "Late Night: Talk?".to_string();
    assert_eq!(desired_folder_name(&podcast), "Late Night Talk");
}

#[test]
fn test_folder_name_falls_back_to_digest() {
    let podcast = Podcast::new(PodcastId(1), "http://example.com/");
    assert_eq!(
        desired_folder_name(&podcast),
        crate::utils::url_digest("http://example.com/")
    );
}

#[test]
fn test_filename_from_title_or_url() {
    let ep = episode("Episode 1: Pilot", "http://example.com/media/ep1.mp3", "audio/mpeg");
    assert_eq!(
        desired_filename(&ep, FilenameSource::Title),
        ("Episode 1 Pilot".to_string(), ".mp3".to_string())
    );
    assert_eq!(
        desired_filename(&ep, FilenameSource::Url),
        ("ep1".to_string(), ".mp3".to_string())
    );
}

#[test]
fn test_filename_extension_from_mimetype() {
    let ep = episode("Interview", "http://example.com/media?id=3", "audio/ogg");
    assert_eq!(
        desired_filename(&ep, FilenameSource::Title),
        ("Interview".to_string(), ".ogg".to_string())
    );

    // An implausible URL extension is ignored
    let ep = episode("Interview", "http://example.com/get.php-download", "audio/mpeg");
    assert_eq!(desired_filename(&ep, FilenameSource::Title).1, ".mp3");
}

#[test]
fn test_filename_falls_back_when_title_empty() {
    let ep = episode("", "http://example.com/media/ep7.m4a", "audio/mp4");
    assert_eq!(
        desired_filename(&ep, FilenameSource::Title),
        ("ep7".to_string(), ".m4a".to_string())
    );
}

#[tokio::test]
async fn test_folder_collisions_get_suffix() {
    let h = harness().await;
    let a = h.podcast("http://a.example.com/feed", "Show", &[]).await;
    let b = h.podcast("http://b.example.com/feed", "Show", &[]).await;

    let shared_a = h.library.podcast(a).unwrap();
    let shared_b = h.library.podcast(b).unwrap();
    let folder_a = h.library.assign_folder(&mut *shared_a.lock().await).await.unwrap();
    let folder_b = h.library.assign_folder(&mut *shared_b.lock().await).await.unwrap();
    assert_eq!(folder_a, "Show");
    assert_eq!(folder_b, "Show (2)");

    // Unchanged title keeps the assignment
    let again = h.library.assign_folder(&mut *shared_b.lock().await).await.unwrap();
    assert_eq!(again, "Show (2)");

    let folders = h.db.podcast_folders().await.unwrap();
    assert!(folders.contains("Show") && folders.contains("Show (2)"));
}

#[tokio::test]
async fn test_title_change_renames_folder_on_disk() {
    let h = harness().await;
    let id = h.podcast("http://example.com/feed", "Old Name", &[]).await;
    let shared = h.library.podcast(id).unwrap();
    let mut podcast = shared.lock().await;
    h.library.assign_folder(&mut podcast).await.unwrap();

    let old_dir = h.downloads.path().join("Old Name");
    tokio::fs::create_dir_all(&old_dir).await.unwrap();
    tokio::fs::write(old_dir.join("ep.mp3"), b"audio").await.unwrap();

    podcast.title = "New Name".to_string();
    let folder = h.library.assign_folder(&mut podcast).await.unwrap();
    assert_eq!(folder, "New Name");
    assert!(!old_dir.exists());
    assert!(h.downloads.path().join("New Name").join("ep.mp3").exists());
}

#[tokio::test]
async fn test_filename_collisions_within_podcast() {
    let h = harness().await;
    let id = h
        .podcast("http://example.com/feed", "Show", &[("a", "Same"), ("b", "Same")])
        .await;
    let shared = h.library.podcast(id).unwrap();
    let podcast = shared.lock().await;

    let mut first = podcast.episodes[0].clone();
    let mut second = podcast.episodes[1].clone();
    assert_eq!(h.library.assign_filename(&podcast, &mut first).await.unwrap(), "Same.mp3");
    assert_eq!(h.library.assign_filename(&podcast, &mut second).await.unwrap(), "Same (2).mp3");
    // Assigned names are sticky
    assert_eq!(h.library.assign_filename(&podcast, &mut first).await.unwrap(), "Same.mp3");
}

#[tokio::test]
async fn test_prepare_download_assigns_folder_and_filename() {
    let h = harness().await;
    let id = h
        .podcast("http://example.com/feed", "My Show", &[("a", "First")])
        .await;
    let episode_id = h.episode_id(id, "a").await;

    let request = h.library.prepare_download(id, episode_id).await.unwrap();
    assert_eq!(request.episode_id, episode_id);
    assert_eq!(request.podcast_id, id);
    assert_eq!(
        request.destination,
        h.downloads.path().join("My Show").join("First.mp3")
    );
    assert_eq!(request.url, "http://example.com/media/a.mp3");

    let podcast = h.snapshot(id).await;
    assert_eq!(podcast.download_folder.as_deref(), Some("My Show"));
    assert_eq!(
        podcast.episode(episode_id).unwrap().download_filename.as_deref(),
        Some("First.mp3")
    );

    let stored = h.db.load_episodes(id).await.unwrap();
    assert_eq!(stored[0].download_filename.as_deref(), Some("First.mp3"));
}

#[tokio::test]
async fn test_prepare_download_unknown_episode() {
    let h = harness().await;
    let id = h.podcast("http://example.com/feed", "Show", &[]).await;
    let err = h.library.prepare_download(id, EpisodeId(999)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = h
        .library
        .prepare_download(PodcastId(999), EpisodeId(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
