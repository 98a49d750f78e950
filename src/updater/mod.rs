//! Feed update engine
//!
//! [`FeedUpdater::update`] reconciles a podcast's stored episodes with a freshly
//! fetched feed:
//!
//! 1. Conditional GET through the [`FeedFetcher`]; `NewLocation` rewrites the
//!    podcast URL and retries, `NotModified` only refreshes the caching headers
//! 2. Channel metadata is refreshed
//! 3. Each page's entries are sorted newest first, truncated to the remaining quota,
//!    de-duplicated by GUID and merged into existing episodes or inserted as new ones
//! 4. Continuation pages are followed while more history is wanted or a page was
//!    entirely new
//! 5. Episodes the feed no longer lists are purged unless downloaded or downloading,
//!    then the retention limit is applied
//!
//! The caller holds the podcast exclusively for the duration of the update, so two
//! updates of the same podcast never interleave.

use crate::db::Database;
use crate::error::FeedError;
use crate::feed::{Feed, FeedEntry, FeedFetcher, FetchRequest, FetchResult};
use crate::model::{Episode, Podcast};
use crate::types::{EpisodeId, EpisodeState, RetentionStrategy};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Episodes published this long before the newest known episode are not marked new
const NEW_EPISODE_WINDOW_DAYS: i64 = 7;

/// How far into the future a publication date may be trusted as the reference
const FUTURE_DATE_TOLERANCE_DAYS: i64 = 1;

/// Running state of one update pass across all pages
#[derive(Debug, Default)]
struct MergeState {
    /// Position of each stored episode in `podcast.episodes`, by GUID
    index: HashMap<String, usize>,
    /// GUIDs listed by the feed during this pass
    seen: HashSet<String>,
    /// Episodes inserted during this pass
    added: Vec<EpisodeId>,
    /// Entries discarded because their GUID was already seen
    duplicates: usize,
    /// Episodes marked new so far
    marked_new: usize,
}

/// Per-page merge counters
#[derive(Debug, Default)]
struct PageStats {
    /// Entries not discarded as duplicates
    listed: usize,
    /// Entries that became new episodes
    inserted: usize,
}

/// Applies fetched feeds to podcasts
pub struct FeedUpdater {
    fetcher: Arc<dyn FeedFetcher>,
    db: Arc<Database>,
    max_redirects: usize,
    max_pages: usize,
}

impl FeedUpdater {
    /// Create an updater
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of feed documents
    /// * `db` - Episode store the updates are merged into
    /// * `max_redirects` - `NewLocation` results followed in one update
    /// * `max_pages` - Continuation pages fetched in one update
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use podcast_dl::feed::HttpFeedFetcher;
    /// use podcast_dl::updater::FeedUpdater;
    /// use podcast_dl::{Database, FeedConfig};
    /// use std::path::Path;
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> podcast_dl::Result<()> {
    /// let config = FeedConfig::default();
    /// let db = Arc::new(Database::new(Path::new("podcasts.db")).await?);
    /// let fetcher = Arc::new(HttpFeedFetcher::new(&config)?);
    /// let updater = FeedUpdater::new(fetcher, db, config.max_redirects, config.max_pages);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        db: Arc<Database>,
        max_redirects: usize,
        max_pages: usize,
    ) -> Self {
        Self {
            fetcher,
            db,
            max_redirects,
            max_pages,
        }
    }

    /// Update a podcast from its feed
    ///
    /// `max_episodes` bounds the retained episodes (0 = unbounded) and `downloading`
    /// holds the episodes with an active download task, which are never purged.
    /// Returns the episodes created by this update that are marked new.
    ///
    /// # Errors
    /// Feed failures are returned as [`Error::Feed`](crate::Error::Feed) before any
    /// episode is touched; store failures propagate as they happen.
    pub async fn update(
        &self,
        podcast: &mut Podcast,
        max_episodes: usize,
        downloading: &HashSet<EpisodeId>,
    ) -> Result<Vec<Episode>> {
        let mut redirects = 0;

        loop {
            let request = FetchRequest {
                url: podcast.url.clone(),
                etag: podcast.http_etag.clone(),
                last_modified: podcast.http_last_modified.clone(),
                credentials: podcast.credentials.clone(),
                max_episodes,
            };

            match self.fetcher.fetch_channel(&request).await? {
                FetchResult::NewLocation(url) => {
                    redirects += 1;
                    if redirects > self.max_redirects {
                        return Err(FeedError::TooManyRedirects.into());
                    }
                    if let Some(other) = self.db.get_podcast_by_url(&url).await?
                        && other.id != podcast.id
                    {
                        return Err(FeedError::LocationTaken(url).into());
                    }

                    info!(podcast_id = podcast.id.0, from = %podcast.url, to = %url, "feed moved");
                    podcast.url = url;
                    podcast.http_etag = None;
                    podcast.http_last_modified = None;
                    self.db.save_podcast(podcast).await?;
                }
                FetchResult::NotModified {
                    etag,
                    last_modified,
                } => {
                    debug!(podcast_id = podcast.id.0, "feed not modified");
                    podcast.set_update_error(None);
                    let etag = etag.or_else(|| podcast.http_etag.clone());
                    let last_modified = last_modified.or_else(|| podcast.http_last_modified.clone());
                    if etag != podcast.http_etag || last_modified != podcast.http_last_modified {
                        podcast.http_etag = etag;
                        podcast.http_last_modified = last_modified;
                        self.db.save_podcast(podcast).await?;
                    }
                    return Ok(Vec::new());
                }
                FetchResult::Updated(feed) => {
                    return self
                        .apply(podcast, feed, &request, max_episodes, downloading)
                        .await;
                }
            }
        }
    }

    async fn apply(
        &self,
        podcast: &mut Podcast,
        feed: Box<dyn Feed>,
        request: &FetchRequest,
        max_episodes: usize,
        downloading: &HashSet<EpisodeId>,
    ) -> Result<Vec<Episode>> {
        refresh_metadata(podcast, feed.as_ref());

        let existing_count = podcast.episodes.len();
        let reference = self.newest_reference(podcast).await?;
        let mut state = MergeState {
            index: podcast
                .episodes
                .iter()
                .enumerate()
                .map(|(i, e)| (e.guid.clone(), i))
                .collect(),
            ..MergeState::default()
        };

        let wants_history = max_episodes > 0 && existing_count < max_episodes;
        let mut page = feed;
        let mut pages_fetched = 0;

        loop {
            let seen_before = state.seen.len();
            let stats = self
                .merge_page(podcast, page.as_ref(), max_episodes, reference, &mut state)
                .await?;
            let newly_seen = state.seen.len() - seen_before;

            let Some(next_url) = page.next_page_url().map(str::to_string) else {
                break;
            };
            let all_new = stats.listed > 0 && stats.inserted == stats.listed;
            if !(wants_history || all_new) {
                break;
            }
            if newly_seen == 0 {
                debug!(podcast_id = podcast.id.0, "page listed nothing new, stopping pagination");
                break;
            }
            if max_episodes > 0 && state.seen.len() >= max_episodes {
                break;
            }
            if pages_fetched >= self.max_pages {
                debug!(podcast_id = podcast.id.0, pages = pages_fetched, "page limit reached");
                break;
            }

            pages_fetched += 1;
            debug!(podcast_id = podcast.id.0, url = %next_url, "fetching next page");
            match self.fetcher.fetch_next_page(request, &next_url).await {
                Ok(Some(next)) => page = next,
                Ok(None) => break,
                Err(e) => {
                    warn!(podcast_id = podcast.id.0, url = %next_url, error = %e, "failed to fetch next page");
                    break;
                }
            }
        }

        self.purge_unlisted(podcast, &state.seen, downloading).await?;

        let purged = self.db.purge(max_episodes, podcast.id, downloading).await?;
        if !purged.is_empty() {
            podcast
                .episodes
                .retain(|e| e.id.is_none_or(|id| !purged.contains(&id)));
        }
        podcast.sort_episodes();

        podcast.duplicate_guids = state.duplicates;
        if state.duplicates > 0 {
            warn!(
                podcast_id = podcast.id.0,
                duplicates = state.duplicates,
                "feed lists duplicate GUIDs, extra entries discarded"
            );
            podcast.set_update_error(Some(format!(
                "Discarded {} episodes with duplicate GUIDs",
                state.duplicates
            )));
        } else {
            podcast.set_update_error(None);
        }
        podcast.last_update = Some(Utc::now());
        self.db.save_podcast(podcast).await?;

        let new_episodes: Vec<Episode> = podcast
            .episodes
            .iter()
            .filter(|e| e.is_new && e.id.is_some_and(|id| state.added.contains(&id)))
            .cloned()
            .collect();

        info!(
            podcast_id = podcast.id.0,
            title = %podcast.title,
            added = state.added.len(),
            new = new_episodes.len(),
            pages = pages_fetched + 1,
            "podcast updated"
        );
        Ok(new_episodes)
    }

    /// Merge one page of entries into the podcast
    async fn merge_page(
        &self,
        podcast: &mut Podcast,
        page: &dyn Feed,
        max_episodes: usize,
        reference: Option<DateTime<Utc>>,
        state: &mut MergeState,
    ) -> Result<PageStats> {
        let mut entries: Vec<&FeedEntry> = page.entries().iter().collect();
        entries.sort_by_key(|e| {
            std::cmp::Reverse(e.published.map(|p| p.timestamp()).unwrap_or(i64::MIN))
        });
        if max_episodes > 0 {
            entries.truncate(max_episodes.saturating_sub(state.seen.len()));
        }

        let cutoff = reference.map(|r| r - Duration::days(NEW_EPISODE_WINDOW_DAYS));
        let mut stats = PageStats::default();

        for entry in entries {
            if !state.seen.insert(entry.guid.clone()) {
                state.duplicates += 1;
                debug!(podcast_id = podcast.id.0, guid = %entry.guid, "duplicate GUID discarded");
                continue;
            }
            stats.listed += 1;

            if let Some(&index) = state.index.get(&entry.guid) {
                let existing = &mut podcast.episodes[index];
                let before = existing.clone();
                apply_entry(existing, entry);
                if *existing != before {
                    self.db.save_episode(existing).await?;
                }
                continue;
            }

            let mut episode = Episode::new(podcast.id, entry.guid.clone(), entry.media_url.clone());
            apply_entry(&mut episode, entry);
            episode.archive = podcast.auto_archive;

            let too_old = matches!((cutoff, episode.published), (Some(c), Some(p)) if p < c);
            let over_strategy_limit =
                podcast.download_strategy == RetentionStrategy::LatestOnly && state.marked_new >= 1;
            episode.is_new = !too_old && !over_strategy_limit;
            if episode.is_new {
                state.marked_new += 1;
            } else {
                debug!(
                    podcast_id = podcast.id.0,
                    guid = %entry.guid,
                    too_old,
                    "new episode not marked new"
                );
            }

            let id = self.db.save_episode(&mut episode).await?;
            state.added.push(id);
            stats.inserted += 1;
            state.index.insert(entry.guid.clone(), podcast.episodes.len());
            podcast.episodes.push(episode);
        }

        Ok(stats)
    }

    /// Delete episodes the feed stopped listing
    async fn purge_unlisted(
        &self,
        podcast: &mut Podcast,
        seen: &HashSet<String>,
        downloading: &HashSet<EpisodeId>,
    ) -> Result<()> {
        let unlisted: Vec<String> = podcast
            .episodes
            .iter()
            .filter(|e| {
                !seen.contains(&e.guid)
                    && e.state != EpisodeState::Downloaded
                    && !e.id.is_some_and(|id| downloading.contains(&id))
            })
            .map(|e| e.guid.clone())
            .collect();

        for guid in &unlisted {
            debug!(podcast_id = podcast.id.0, guid = %guid, "episode no longer in feed, deleting");
            self.db.delete_episode_by_guid(podcast.id, guid).await?;
        }
        if !unlisted.is_empty() {
            podcast.episodes.retain(|e| !unlisted.contains(&e.guid));
        }
        Ok(())
    }

    /// Newest stored publication date, capped slightly ahead of now
    async fn newest_reference(&self, podcast: &Podcast) -> Result<Option<DateTime<Utc>>> {
        let stored = self.db.get_last_published(podcast.id).await?;
        let cap = Utc::now() + Duration::days(FUTURE_DATE_TOLERANCE_DAYS);
        Ok(stored.or_else(|| podcast.latest_published()).map(|p| p.min(cap)))
    }
}

fn refresh_metadata(podcast: &mut Podcast, feed: &dyn Feed) {
    if let Some(title) = feed.title() {
        podcast.title = title.to_string();
    }
    if let Some(link) = feed.link() {
        podcast.link = Some(link.to_string());
    }
    if let Some(description) = feed.description() {
        podcast.description = Some(description.to_string());
    }
    if let Some(cover) = feed.cover_url() {
        podcast.cover_url = Some(cover.to_string());
    }
    if let Some(payment) = feed.payment_url() {
        podcast.payment_url = Some(payment.to_string());
    }
    podcast.http_etag = feed.http_etag().map(str::to_string);
    podcast.http_last_modified = feed.http_last_modified().map(str::to_string);
}

/// Copy the feed-controlled fields of an entry onto an episode
fn apply_entry(episode: &mut Episode, entry: &FeedEntry) {
    episode.title = entry.title.clone();
    episode.url = entry.media_url.clone();
    episode.published = entry.published;
    episode.link = entry.link.clone();
    episode.payment_url = entry.payment_url.clone();
    episode.set_description(entry.description.clone(), entry.description_html.clone());
    if let Some(mime) = &entry.mime_type {
        episode.mime_type = mime.clone();
    }
    if entry.total_time > 0 {
        episode.total_time = entry.total_time;
    }
    // A downloaded file knows its real size better than the feed does
    if episode.state != EpisodeState::Downloaded {
        episode.file_size = entry.file_size;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
