//! Common test utilities for podcast-dl integration tests

#![allow(dead_code)]

use podcast_dl::{Config, PodcastClient, TaskSnapshot, TaskStatus};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Size of every media file served by [`mount_media`]
pub const MEDIA_SIZE: usize = 1000;

/// Config rooted in `dir` with a fast status refresh
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.persistence.database_path = dir.join("podcasts.db");
    config.monitor.status_refresh_interval = Duration::from_millis(20);
    config.monitor.shutdown_timeout = Duration::from_secs(5);
    config.feeds.request_timeout = Duration::from_secs(5);
    config
}

/// RSS document whose items point at `/media/<guid>.mp3` on `base`
///
/// Items are `(guid, title, day of January 2024)`.
pub fn rss_feed(base: &str, title: &str, items: &[(&str, &str, u32)]) -> String {
    let items: String = items
        .iter()
        .map(|(guid, item_title, day)| {
            format!(
                r#"
        <item>
            <title>{item_title}</title>
            <guid>{guid}</guid>
            <pubDate>{weekday}, {day:02} Jan 2024 12:00:00 +0000</pubDate>
            <description>Notes for {item_title}</description>
            <enclosure url="{base}/media/{guid}.mp3" length="{MEDIA_SIZE}" type="audio/mpeg"/>
        </item>"#,
                weekday = weekday(*day),
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
    <channel>
        <title>{title}</title>
        <link>{base}</link>
        <description>Integration test feed</description>{items}
    </channel>
</rss>"#
    )
}

fn weekday(day: u32) -> &'static str {
    // January 1st 2024 was a Monday
    ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"][((day + 6) % 7) as usize]
}

/// Deterministic media body for `guid`
pub fn media_body(guid: &str) -> Vec<u8> {
    guid.bytes().cycle().take(MEDIA_SIZE).collect()
}

/// Serve `body` at `route` with the given ETag
pub async fn mount_feed(server: &MockServer, route: &str, body: String, etag: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", etag)
                .set_body_raw(body, "application/rss+xml"),
        )
        .mount(server)
        .await;
}

/// Serve the full media file of `guid`
pub async fn mount_media(server: &MockServer, guid: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/media/{guid}.mp3")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(media_body(guid), "audio/mpeg"))
        .mount(server)
        .await;
}

/// Serve the tail of `guid`'s media file for a range request starting at `offset`
pub async fn mount_media_range(server: &MockServer, guid: &str, offset: usize) {
    let body = media_body(guid);
    Mock::given(method("GET"))
        .and(path(format!("/media/{guid}.mp3")))
        .and(header("Range", format!("bytes={offset}-").as_str()))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header(
                    "Content-Range",
                    format!("bytes {}-{}/{}", offset, MEDIA_SIZE - 1, MEDIA_SIZE).as_str(),
                )
                .set_body_raw(body[offset..].to_vec(), "audio/mpeg"),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// Poll the task list until `predicate` holds; panics after ten seconds
pub async fn wait_for_tasks(
    client: &PodcastClient,
    mut predicate: impl FnMut(&[TaskSnapshot]) -> bool,
) -> Vec<TaskSnapshot> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let tasks = client.tasks();
        if predicate(&tasks) {
            return tasks;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task list never reached the expected state: {tasks:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until every task is done
pub async fn wait_all_done(client: &PodcastClient, count: usize) -> Vec<TaskSnapshot> {
    wait_for_tasks(client, |tasks| {
        tasks.len() == count && tasks.iter().all(|t| t.status == TaskStatus::Done)
    })
    .await
}
