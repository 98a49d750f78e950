use crate::types::{EpisodeId, EpisodeState, PodcastId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single feed entry with a downloadable enclosure
///
/// Identity is the GUID within the owning podcast. `state` and `is_new` are coupled:
/// use [`Episode::set_state`], [`Episode::mark_new`] and [`Episode::mark_old`] rather
/// than writing the fields directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Database ID (None until first saved)
    pub id: Option<EpisodeId>,
    /// Owning podcast
    pub podcast_id: PodcastId,
    /// Feed-supplied unique identifier
    pub guid: String,
    /// Title
    pub title: String,
    /// Enclosure URL
    pub url: String,
    /// Enclosure MIME type
    pub mime_type: String,
    /// File size in bytes (0 when unknown)
    pub file_size: u64,
    /// Publication time
    pub published: Option<DateTime<Utc>>,
    /// Plain-text description
    pub description: Option<String>,
    /// HTML description
    pub description_html: Option<String>,
    /// Web page of the episode
    pub link: Option<String>,
    /// Payment/donation URL
    pub payment_url: Option<String>,
    /// Duration in seconds (0 when unknown)
    pub total_time: u64,
    /// Playback position in seconds
    pub current_position: u64,
    /// When playback position was last reported
    pub last_playback: Option<DateTime<Utc>>,
    /// Local file lifecycle
    pub state: EpisodeState,
    /// Unplayed/unseen
    pub is_new: bool,
    /// Exempt from automatic deletion
    pub archive: bool,
    /// Local filename inside the podcast folder (assigned lazily)
    pub download_filename: Option<String>,
}

impl Episode {
    /// Create a fresh, unsaved episode
    pub fn new(podcast_id: PodcastId, guid: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            podcast_id,
            guid: guid.into(),
            title: String::new(),
            url: url.into(),
            mime_type: "application/octet-stream".to_string(),
            file_size: 0,
            published: None,
            description: None,
            description_html: None,
            link: None,
            payment_url: None,
            total_time: 0,
            current_position: 0,
            last_playback: None,
            state: EpisodeState::Normal,
            is_new: false,
            archive: false,
            download_filename: None,
        }
    }

    /// Change the file state
    ///
    /// Entering `Deleted` clears `is_new`.
    pub fn set_state(&mut self, state: EpisodeState) {
        self.state = state;
        if state == EpisodeState::Deleted {
            self.is_new = false;
        }
    }

    /// Mark as new; a deleted episode is undeleted
    pub fn mark_new(&mut self) {
        if self.state == EpisodeState::Deleted {
            self.state = EpisodeState::Normal;
        }
        self.is_new = true;
    }

    /// Mark as not new; the file state is left alone
    pub fn mark_old(&mut self) {
        self.is_new = false;
    }

    /// Record a completed download
    pub fn on_downloaded(&mut self, file_size: u64, mime_type: Option<&str>) {
        self.state = EpisodeState::Downloaded;
        self.is_new = true;
        self.file_size = file_size;
        if let Some(mime) = mime_type
            && !mime.is_empty()
        {
            self.mime_type = mime.to_string();
        }
    }

    /// Set the description, keeping at most one of the plain and HTML variants
    pub fn set_description(&mut self, plain: Option<String>, html: Option<String>) {
        match html {
            Some(html) if !html.trim().is_empty() => {
                self.description_html = Some(html);
                self.description = None;
            }
            _ => {
                self.description = plain;
                self.description_html = None;
            }
        }
    }

    /// Record a playback position report
    pub fn report_playback(&mut self, position: u64, total: u64, at: DateTime<Utc>) {
        self.current_position = position;
        if total > 0 {
            self.total_time = total;
        }
        self.last_playback = Some(at);
    }

    /// Publication time used for ordering (unknown dates sort last)
    pub fn sort_key(&self) -> i64 {
        self.published.map(|p| p.timestamp()).unwrap_or(i64::MIN)
    }
}
