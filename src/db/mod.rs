//! Database layer for podcast-dl
//!
//! Handles SQLite persistence for podcasts and their episodes.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`podcasts`] - Subscription CRUD and folder names
//! - [`episodes`] - Episode CRUD, statistics and retention purge

use crate::model::{Credentials, Episode, Podcast};
use crate::types::{EpisodeId, EpisodeState, PodcastId, RetentionStrategy};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod episodes;
mod migrations;
mod podcasts;

/// Podcast record from database
#[derive(Debug, Clone, FromRow)]
pub struct PodcastRow {
    /// Unique database ID
    pub id: i64,
    /// Feed URL
    pub url: String,
    /// Title
    pub title: String,
    /// Website
    pub link: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Cover art URL
    pub cover_url: Option<String>,
    /// Payment/donation URL
    pub payment_url: Option<String>,
    /// ETag of the last fetched response
    pub http_etag: Option<String>,
    /// Last-Modified of the last fetched response
    pub http_last_modified: Option<String>,
    /// Basic-auth username
    pub auth_username: Option<String>,
    /// Basic-auth password
    pub auth_password: Option<String>,
    /// Folder name inside the download directory
    pub download_folder: Option<String>,
    /// Mark new episodes as archived
    pub auto_archive: bool,
    /// Excluded from batch updates
    pub pause_subscription: bool,
    /// Retention strategy code (see [`RetentionStrategy::to_i32`])
    pub download_strategy: i32,
    /// Section/category label
    pub section: String,
    /// Unix timestamp of the last successful update
    pub last_update: Option<i64>,
}

impl From<PodcastRow> for Podcast {
    fn from(row: PodcastRow) -> Self {
        let credentials = match (row.auth_username, row.auth_password) {
            (Some(username), password) if !username.is_empty() => Some(Credentials {
                username,
                password: password.unwrap_or_default(),
            }),
            _ => None,
        };
        let mut podcast = Podcast::new(PodcastId(row.id), row.url);
        podcast.title = row.title;
        podcast.link = row.link;
        podcast.description = row.description;
        podcast.cover_url = row.cover_url;
        podcast.payment_url = row.payment_url;
        podcast.http_etag = row.http_etag;
        podcast.http_last_modified = row.http_last_modified;
        podcast.credentials = credentials;
        podcast.download_folder = row.download_folder;
        podcast.auto_archive = row.auto_archive;
        podcast.pause_subscription = row.pause_subscription;
        podcast.download_strategy = RetentionStrategy::from_i32(row.download_strategy);
        podcast.section = row.section;
        podcast.last_update = row.last_update.and_then(from_timestamp);
        podcast
    }
}

/// Episode record from database
#[derive(Debug, Clone, FromRow)]
pub struct EpisodeRow {
    /// Unique database ID
    pub id: i64,
    /// Owning podcast
    pub podcast_id: i64,
    /// Feed-supplied unique identifier
    pub guid: String,
    /// Title
    pub title: String,
    /// Enclosure URL
    pub url: String,
    /// Enclosure MIME type
    pub mime_type: String,
    /// File size in bytes
    pub file_size: i64,
    /// Unix timestamp of publication
    pub published: Option<i64>,
    /// Plain-text description
    pub description: Option<String>,
    /// HTML description
    pub description_html: Option<String>,
    /// Web page of the episode
    pub link: Option<String>,
    /// Payment/donation URL
    pub payment_url: Option<String>,
    /// Duration in seconds
    pub total_time: i64,
    /// Playback position in seconds
    pub current_position: i64,
    /// Unix timestamp of the last playback report
    pub last_playback: Option<i64>,
    /// State code (see [`EpisodeState::to_i32`])
    pub state: i32,
    /// Unplayed/unseen
    pub is_new: bool,
    /// Exempt from automatic deletion
    pub archive: bool,
    /// Local filename
    pub download_filename: Option<String>,
}

impl From<EpisodeRow> for Episode {
    fn from(row: EpisodeRow) -> Self {
        let mut episode = Episode::new(PodcastId(row.podcast_id), row.guid, row.url);
        episode.id = Some(EpisodeId(row.id));
        episode.title = row.title;
        episode.mime_type = row.mime_type;
        episode.file_size = row.file_size.max(0) as u64;
        episode.published = row.published.and_then(from_timestamp);
        episode.description = row.description;
        episode.description_html = row.description_html;
        episode.link = row.link;
        episode.payment_url = row.payment_url;
        episode.total_time = row.total_time.max(0) as u64;
        episode.current_position = row.current_position.max(0) as u64;
        episode.last_playback = row.last_playback.and_then(from_timestamp);
        episode.state = EpisodeState::from_i32(row.state);
        episode.is_new = row.is_new;
        episode.archive = row.archive;
        episode.download_filename = row.download_filename;
        episode
    }
}

fn from_timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Database handle for podcast-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
