//! Error types for podcast-dl
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`] is the top-level error returned by every fallible public operation
//! - [`FeedError`] classifies feed fetch outcomes that are not successful updates
//! - [`DownloadError`] covers task state violations and transfer failures
//! - [`DatabaseError`] wraps persistence failures with the failed operation in the message
//!
//! Feed and download errors are caught at podcast/task granularity and converted into
//! state plus message. Store-layer errors propagate to the caller of the save.

use crate::types::{EpisodeId, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for podcast-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for podcast-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Feed could not be fetched or parsed
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Podcast, episode or task not found
    #[error("not found: {0}")]
    NotFound(String),

    /// The podcast URL is already subscribed
    #[error("already subscribed: {0}")]
    Duplicate(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns the feed error kind when this error came from a feed fetch
    pub fn feed_kind(&self) -> Option<FeedErrorKind> {
        match self {
            Error::Feed(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Broad classification of a [`FeedError`]
///
/// Drives how a batch update reports the failure: transient errors are shown and
/// retried on the next update, authentication errors are handed back to the caller
/// so it can prompt for credentials, permanent errors mark the subscription as broken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedErrorKind {
    /// Connection error, timeout, server error, rate limit or captive portal
    Transient,
    /// Credentials are missing or were rejected
    Authentication,
    /// Feed is gone, unsubscribed by the server, or unparseable
    Permanent,
}

/// Feed fetch failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The server asked for credentials and none were supplied
    #[error("authentication required")]
    AuthenticationRequired,

    /// The supplied credentials were rejected
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The feed does not exist (HTTP 404)
    #[error("feed not found")]
    NotFound,

    /// The server asked clients to stop polling this feed (HTTP 403, 410)
    #[error("feed asks to be unsubscribed: {0}")]
    Unsubscribe(String),

    /// The body could not be parsed as RSS or Atom
    #[error("invalid feed: {0}")]
    InvalidFeed(String),

    /// The request never produced an HTTP response
    #[error("feed unreachable: {0}")]
    Offline(String),

    /// The server rejected the request (HTTP 400)
    #[error("bad request")]
    BadRequest,

    /// The server is throttling requests (HTTP 429)
    #[error("rate limited")]
    RateLimited,

    /// The server failed (HTTP 5xx)
    #[error("internal server error (HTTP {0})")]
    InternalServerError(u16),

    /// A redirect led to an HTML login page instead of the feed
    #[error("redirected to a login page: {0}")]
    WifiLogin(String),

    /// Status code outside the handled set
    #[error("unknown HTTP status code {0}")]
    UnknownStatusCode(u16),

    /// The feed moved to a URL another subscription already uses
    #[error("feed moved to {0}, which is already subscribed")]
    LocationTaken(String),

    /// Permanent redirects exceeded the configured limit
    #[error("too many redirects")]
    TooManyRedirects,
}

impl FeedError {
    /// Classify this error for reporting
    pub fn kind(&self) -> FeedErrorKind {
        match self {
            FeedError::AuthenticationRequired | FeedError::AuthenticationFailed => {
                FeedErrorKind::Authentication
            }
            FeedError::Offline(_)
            | FeedError::BadRequest
            | FeedError::RateLimited
            | FeedError::InternalServerError(_)
            | FeedError::WifiLogin(_) => FeedErrorKind::Transient,
            FeedError::NotFound
            | FeedError::Unsubscribe(_)
            | FeedError::InvalidFeed(_)
            | FeedError::UnknownStatusCode(_)
            | FeedError::LocationTaken(_)
            | FeedError::TooManyRedirects => FeedErrorKind::Permanent,
        }
    }
}

/// Download-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// Task is not in a state that allows the requested transition
    #[error("task {id} cannot go from {from} to {to}")]
    InvalidTransition {
        /// The task that rejected the transition
        id: TaskId,
        /// The state the task was in
        from: TaskStatus,
        /// The requested state
        to: TaskStatus,
    },

    /// No task with this id exists in the queue
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// Only done, failed and cancelled tasks can leave the task list
    #[error("task {id} is {status} and cannot be removed")]
    NotRemovable {
        /// The task
        id: TaskId,
        /// Its current state
        status: TaskStatus,
    },

    /// The episode was removed while its task was running
    #[error("episode {episode_id} no longer exists")]
    EpisodeGone {
        /// The purged episode
        episode_id: EpisodeId,
    },

    /// The server answered with an error status
    #[error("HTTP status {status}")]
    HttpStatus {
        /// The HTTP status code
        status: u16,
    },

    /// The server asked for credentials
    #[error("authentication required")]
    AuthenticationRequired,

    /// Network or disk failure during the transfer
    #[error("{0}")]
    Transfer(String),

    /// The stream ended before the announced size was reached
    #[error("incomplete transfer: received {received} of {expected} bytes")]
    IncompleteTransfer {
        /// Size announced by the server
        expected: u64,
        /// Bytes actually on disk
        received: u64,
    },
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::Transfer(e.to_string())
    }
}
