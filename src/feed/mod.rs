//! Feed fetching and parsing
//!
//! The update engine consumes feeds through two collaborator traits:
//! - [`FeedFetcher`] performs the conditional GET and classifies the outcome into a
//!   [`FetchResult`] or a typed [`FeedError`]
//! - [`Feed`] exposes the parsed channel metadata, its entries, and the RFC 5005
//!   continuation link
//!
//! [`HttpFeedFetcher`] is the production fetcher; tests substitute in-memory fakes.

mod http;
mod parser;

pub use http::HttpFeedFetcher;
pub use parser::{discover_feed_link, parse_duration, parse_feed};

use crate::error::FeedError;
use crate::model::Credentials;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One entry of a feed that carries downloadable media
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedEntry {
    /// Entry identifier (falls back to the media URL, then the link)
    pub guid: String,
    /// Title
    pub title: String,
    /// Enclosure URL
    pub media_url: String,
    /// Enclosure MIME type
    pub mime_type: Option<String>,
    /// Enclosure size in bytes (0 when not announced)
    pub file_size: u64,
    /// Publication time
    pub published: Option<DateTime<Utc>>,
    /// Plain-text description
    pub description: Option<String>,
    /// HTML description
    pub description_html: Option<String>,
    /// Web page of the entry
    pub link: Option<String>,
    /// Payment/donation URL
    pub payment_url: Option<String>,
    /// Duration in seconds (0 when unknown)
    pub total_time: u64,
}

/// A parsed feed document
///
/// Metadata getters return None when the feed does not carry the field, so callers
/// keep the values they already have.
pub trait Feed: Send + Sync {
    /// Channel title
    fn title(&self) -> Option<&str>;
    /// Channel website
    fn link(&self) -> Option<&str>;
    /// Channel description
    fn description(&self) -> Option<&str>;
    /// Cover art URL
    fn cover_url(&self) -> Option<&str>;
    /// Payment/donation URL
    fn payment_url(&self) -> Option<&str>;
    /// ETag of the response this feed came from
    fn http_etag(&self) -> Option<&str>;
    /// Last-Modified of the response this feed came from
    fn http_last_modified(&self) -> Option<&str>;
    /// Entries with downloadable media, in document order
    fn entries(&self) -> &[FeedEntry];
    /// RFC 5005 "next" page URL
    fn next_page_url(&self) -> Option<&str>;
}

/// Concrete [`Feed`] produced by [`parse_feed`]
#[derive(Clone, Debug, Default)]
pub struct ParsedFeed {
    /// Channel title
    pub title: Option<String>,
    /// Channel website
    pub link: Option<String>,
    /// Channel description
    pub description: Option<String>,
    /// Cover art URL
    pub cover_url: Option<String>,
    /// Payment/donation URL
    pub payment_url: Option<String>,
    /// Response ETag
    pub http_etag: Option<String>,
    /// Response Last-Modified
    pub http_last_modified: Option<String>,
    /// Media entries
    pub entries: Vec<FeedEntry>,
    /// Continuation URL
    pub next_page: Option<String>,
}

impl Feed for ParsedFeed {
    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
    fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn cover_url(&self) -> Option<&str> {
        self.cover_url.as_deref()
    }
    fn payment_url(&self) -> Option<&str> {
        self.payment_url.as_deref()
    }
    fn http_etag(&self) -> Option<&str> {
        self.http_etag.as_deref()
    }
    fn http_last_modified(&self) -> Option<&str> {
        self.http_last_modified.as_deref()
    }
    fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }
    fn next_page_url(&self) -> Option<&str> {
        self.next_page.as_deref()
    }
}

/// What to fetch and how to make the request conditional
#[derive(Clone, Debug, Default)]
pub struct FetchRequest {
    /// Feed URL
    pub url: String,
    /// Stored ETag, sent as If-None-Match
    pub etag: Option<String>,
    /// Stored Last-Modified, sent as If-Modified-Since
    pub last_modified: Option<String>,
    /// Basic-auth credentials
    pub credentials: Option<Credentials>,
    /// Retention limit of the podcast (0 = unbounded)
    pub max_episodes: usize,
}

/// Outcome of a successful conditional GET
pub enum FetchResult {
    /// The feed changed; here is the first page
    Updated(Box<dyn Feed>),
    /// The server confirmed the stored ETag/Last-Modified
    NotModified {
        /// ETag to store (None keeps the stored one)
        etag: Option<String>,
        /// Last-Modified to store (None keeps the stored one)
        last_modified: Option<String>,
    },
    /// The feed moved permanently
    NewLocation(String),
}

impl std::fmt::Debug for FetchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchResult::Updated(feed) => f
                .debug_struct("Updated")
                .field("entries", &feed.entries().len())
                .finish(),
            FetchResult::NotModified { etag, last_modified } => f
                .debug_struct("NotModified")
                .field("etag", etag)
                .field("last_modified", last_modified)
                .finish(),
            FetchResult::NewLocation(url) => f.debug_tuple("NewLocation").field(url).finish(),
        }
    }
}

/// Retrieves feeds
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Conditional GET of the feed's first page
    async fn fetch_channel(&self, request: &FetchRequest) -> Result<FetchResult, FeedError>;

    /// Unconditional GET of a continuation page
    ///
    /// Returns None when the page exists but cannot be used (for example, it is
    /// not a feed), which ends pagination without failing the update.
    async fn fetch_next_page(
        &self,
        request: &FetchRequest,
        url: &str,
    ) -> Result<Option<Box<dyn Feed>>, FeedError>;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
