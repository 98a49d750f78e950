use super::Episode;
use crate::types::{EpisodeId, PodcastId, RetentionStrategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP basic-auth credentials for a feed and its enclosures
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

/// A feed subscription and its episodes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Podcast {
    /// Database ID
    pub id: PodcastId,
    /// Feed URL (unique across subscriptions)
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
    /// Feed credentials
    pub credentials: Option<Credentials>,
    /// Folder name inside the download directory (assigned lazily)
    pub download_folder: Option<String>,
    /// Mark new episodes as archived
    pub auto_archive: bool,
    /// Exclude from batch updates
    pub pause_subscription: bool,
    /// How many episodes of an update are marked new
    pub download_strategy: RetentionStrategy,
    /// Section/category label
    pub section: String,
    /// Last successful update
    pub last_update: Option<DateTime<Utc>>,
    /// Transient error message of the last update (not persisted)
    #[serde(skip)]
    pub error: Option<String>,
    /// Duplicate GUIDs discarded during the last update (not persisted)
    #[serde(skip)]
    pub duplicate_guids: usize,
    /// Episodes, newest first
    #[serde(skip)]
    pub episodes: Vec<Episode>,
}

impl Podcast {
    /// Create a subscription record for a feed URL
    pub fn new(id: PodcastId, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id,
            title: url.clone(),
            url,
            link: None,
            description: None,
            cover_url: None,
            payment_url: None,
            http_etag: None,
            http_last_modified: None,
            credentials: None,
            download_folder: None,
            auto_archive: false,
            pause_subscription: false,
            download_strategy: RetentionStrategy::Default,
            section: String::new(),
            last_update: None,
            error: None,
            duplicate_guids: 0,
            episodes: Vec::new(),
        }
    }

    /// Keep episodes ordered by publication date, newest first
    pub fn sort_episodes(&mut self) {
        self.episodes
            .sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    }

    /// Find an episode by GUID
    pub fn episode_by_guid(&self, guid: &str) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.guid == guid)
    }

    /// Find an episode by database ID
    pub fn episode(&self, id: EpisodeId) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.id == Some(id))
    }

    /// Find an episode by database ID for mutation
    pub fn episode_mut(&mut self, id: EpisodeId) -> Option<&mut Episode> {
        self.episodes.iter_mut().find(|e| e.id == Some(id))
    }

    /// Publication time of the newest episode
    pub fn latest_published(&self) -> Option<DateTime<Utc>> {
        self.episodes.iter().filter_map(|e| e.published).max()
    }

    /// Record the outcome of an update on the transient error field
    pub(crate) fn set_update_error(&mut self, message: Option<String>) {
        self.error = message;
    }
}
