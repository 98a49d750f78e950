//! # podcast-dl
//!
//! Backend library for podcast clients: subscriptions, feed updates and a
//! bounded-concurrency episode download queue.
//!
//! ## Design Philosophy
//!
//! podcast-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Restart-safe** - Interrupted downloads are found on disk and offered for resume
//! - **Pluggable** - Feed fetching, episode transfers and extension hooks are traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use podcast_dl::{Config, PodcastClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PodcastClient::new(Config::default()).await?;
//!     client.start().await?;
//!
//!     // Subscribe to events
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let podcast_id = client.subscribe_podcast("https://example.com/feed.xml", None).await?;
//!     for episode in client.update_podcast(podcast_id).await? {
//!         if let Some(episode_id) = episode.id {
//!             client.download_episode(podcast_id, episode_id).await?;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Client facade (decomposed into focused submodules)
pub mod client;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Download tasks, transfers and the download queue
pub mod download;
/// Error types
pub mod error;
/// Feed fetching and parsing
pub mod feed;
/// Extension hooks
pub mod hooks;
/// In-memory podcast registry and filesystem reconciliation
pub mod library;
/// Podcast and episode records
pub mod model;
/// Speed limiting with token bucket
pub mod speed_limiter;
/// Core types and events
pub mod types;
/// Feed update engine
pub mod updater;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use client::{PodcastClient, UpdateFailure, UpdateReport};
pub use config::{Config, DownloadConfig, FeedConfig, FilenameSource, MonitorConfig, PersistenceConfig};
pub use db::Database;
pub use download::{DownloadQueueManager, DownloadTask, TaskRequest};
pub use error::{DatabaseError, DownloadError, Error, FeedError, FeedErrorKind, Result};
pub use hooks::{ExtensionHooks, NoOpHooks};
pub use library::{Library, StartupReport};
pub use model::{Credentials, Episode, Podcast};
pub use types::{
    Activity, EpisodeId, EpisodeState, Event, PodcastId, PodcastStatistics, RetentionStrategy,
    StatusSummary, TaskId, TaskSnapshot, TaskStatus,
};

/// Helper function to run the client with graceful signal handling.
///
/// Waits for a termination signal and then calls the client's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use podcast_dl::{Config, PodcastClient, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = PodcastClient::new(Config::default()).await?;
///     client.start().await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(client).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(client: PodcastClient) -> Result<()> {
    wait_for_signal().await;
    client.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
