//! Extension hooks
//!
//! Extensions observe subscription and download lifecycle points. The hook
//! implementation is injected into [`PodcastClient`](crate::PodcastClient) at
//! construction; [`NoOpHooks`] is used when nothing is supplied.
//!
//! Hooks run inline on the task that triggered them, after the triggering change
//! has been persisted. A failing hook is logged and never undoes that change.

use crate::model::{Episode, Podcast};
use async_trait::async_trait;
use std::path::Path;

/// Lifecycle callbacks for extensions
///
/// Every method has an empty default, so implementations override only what
/// they need.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use podcast_dl::hooks::ExtensionHooks;
/// use podcast_dl::model::Episode;
/// use std::path::Path;
///
/// struct Announce;
///
/// #[async_trait]
/// impl ExtensionHooks for Announce {
///     async fn on_episode_downloaded(&self, episode: &Episode, path: &Path) -> Result<(), String> {
///         println!("{} saved to {}", episode.title, path.display());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ExtensionHooks: Send + Sync {
    /// A new subscription finished its first update
    async fn on_podcast_subscribed(&self, _podcast: &Podcast) -> Result<(), String> {
        Ok(())
    }

    /// A podcast update finished (new episodes are passed in, possibly empty)
    async fn on_podcast_updated(
        &self,
        _podcast: &Podcast,
        _new_episodes: &[Episode],
    ) -> Result<(), String> {
        Ok(())
    }

    /// A subscription is about to be removed
    async fn on_podcast_removed(&self, _podcast: &Podcast) -> Result<(), String> {
        Ok(())
    }

    /// An episode file was downloaded and moved into place
    async fn on_episode_downloaded(&self, _episode: &Episode, _path: &Path) -> Result<(), String> {
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHooks;

#[async_trait]
impl ExtensionHooks for NoOpHooks {}

/// Log a hook failure without propagating it
pub(crate) fn log_hook_error(hook: &str, result: Result<(), String>) {
    if let Err(e) = result {
        tracing::warn!(hook, error = %e, "extension hook failed");
    }
}
