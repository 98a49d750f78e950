//! Episode CRUD, statistics and retention purge.

use crate::error::DatabaseError;
use crate::model::Episode;
use crate::types::{EpisodeId, EpisodeState, PodcastId, PodcastStatistics};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::{Database, EpisodeRow};

const EPISODE_COLUMNS: &str = r#"
    id, podcast_id, guid, title, url, mime_type, file_size, published,
    description, description_html, link, payment_url, total_time,
    current_position, last_playback, state, is_new, archive, download_filename
"#;

impl Database {
    /// Insert or update an episode
    ///
    /// An episode without an ID is inserted and receives one.
    pub async fn save_episode(&self, episode: &mut Episode) -> Result<EpisodeId> {
        match episode.id {
            Some(id) => {
                self.update_episode(id, episode).await?;
                Ok(id)
            }
            None => {
                let id = self.insert_episode(episode).await?;
                episode.id = Some(id);
                Ok(id)
            }
        }
    }

    async fn insert_episode(&self, episode: &Episode) -> Result<EpisodeId> {
        let result = sqlx::query(
            r#"
            INSERT INTO episodes (
                podcast_id, guid, title, url, mime_type, file_size, published,
                description, description_html, link, payment_url, total_time,
                current_position, last_playback, state, is_new, archive,
                download_filename
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(episode.podcast_id)
        .bind(&episode.guid)
        .bind(&episode.title)
        .bind(&episode.url)
        .bind(&episode.mime_type)
        .bind(episode.file_size as i64)
        .bind(episode.published.map(|t| t.timestamp()))
        .bind(&episode.description)
        .bind(&episode.description_html)
        .bind(&episode.link)
        .bind(&episode.payment_url)
        .bind(episode.total_time as i64)
        .bind(episode.current_position as i64)
        .bind(episode.last_playback.map(|t| t.timestamp()))
        .bind(episode.state.to_i32())
        .bind(episode.is_new)
        .bind(episode.archive)
        .bind(&episode.download_filename)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "Episode {} already exists in podcast {}",
                    episode.guid, episode.podcast_id
                )))
            } else {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert episode: {}",
                    e
                )))
            }
        })?;

        Ok(EpisodeId(result.last_insert_rowid()))
    }

    async fn update_episode(&self, id: EpisodeId, episode: &Episode) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE episodes SET
                guid = ?, title = ?, url = ?, mime_type = ?, file_size = ?,
                published = ?, description = ?, description_html = ?, link = ?,
                payment_url = ?, total_time = ?, current_position = ?,
                last_playback = ?, state = ?, is_new = ?, archive = ?,
                download_filename = ?
            WHERE id = ?
            "#,
        )
        .bind(&episode.guid)
        .bind(&episode.title)
        .bind(&episode.url)
        .bind(&episode.mime_type)
        .bind(episode.file_size as i64)
        .bind(episode.published.map(|t| t.timestamp()))
        .bind(&episode.description)
        .bind(&episode.description_html)
        .bind(&episode.link)
        .bind(&episode.payment_url)
        .bind(episode.total_time as i64)
        .bind(episode.current_position as i64)
        .bind(episode.last_playback.map(|t| t.timestamp()))
        .bind(episode.state.to_i32())
        .bind(episode.is_new)
        .bind(episode.archive)
        .bind(&episode.download_filename)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update episode: {}",
                e
            )))
        })?;
        Ok(())
    }

    /// Delete one episode of a podcast by GUID
    pub async fn delete_episode_by_guid(&self, podcast_id: PodcastId, guid: &str) -> Result<()> {
        sqlx::query("DELETE FROM episodes WHERE podcast_id = ? AND guid = ?")
            .bind(podcast_id)
            .bind(guid)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete episode: {}",
                    e
                )))
            })?;
        Ok(())
    }

    /// All episodes of a podcast, newest first
    pub async fn load_episodes(&self, podcast_id: PodcastId) -> Result<Vec<Episode>> {
        let sql = format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes WHERE podcast_id = ? \
             ORDER BY published DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, EpisodeRow>(&sql)
            .bind(podcast_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to load episodes: {}",
                    e
                )))
            })?;
        Ok(rows.into_iter().map(Episode::from).collect())
    }

    /// Look up one episode of a podcast by GUID
    pub async fn get_episode_by_guid(
        &self,
        podcast_id: PodcastId,
        guid: &str,
    ) -> Result<Option<Episode>> {
        let sql =
            format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE podcast_id = ? AND guid = ?");
        let row = sqlx::query_as::<_, EpisodeRow>(&sql)
            .bind(podcast_id)
            .bind(guid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get episode: {}",
                    e
                )))
            })?;
        Ok(row.map(Episode::from))
    }

    /// Whether an episode row still exists
    pub async fn episode_exists(&self, id: EpisodeId) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM episodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to check episode: {}",
                    e
                )))
            })?;
        Ok(found.is_some())
    }

    /// Local filenames assigned within one podcast
    pub async fn episode_filenames(&self, podcast_id: PodcastId) -> Result<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT download_filename FROM episodes \
             WHERE podcast_id = ? AND download_filename IS NOT NULL",
        )
        .bind(podcast_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list episode filenames: {}",
                e
            )))
        })?;
        Ok(names.into_iter().collect())
    }

    /// Delete episodes beyond the `max_episodes` newest of a podcast
    ///
    /// Downloaded episodes and the `protected` IDs (episodes being downloaded) are
    /// never deleted. A `max_episodes` of 0 disables the purge. Returns the IDs
    /// that were deleted.
    pub async fn purge(
        &self,
        max_episodes: usize,
        podcast_id: PodcastId,
        protected: &HashSet<EpisodeId>,
    ) -> Result<Vec<EpisodeId>> {
        if max_episodes == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<EpisodeId> = sqlx::query_scalar(
            r#"
            SELECT id FROM episodes
            WHERE podcast_id = ? AND state <> ? AND id NOT IN (
                SELECT id FROM episodes
                WHERE podcast_id = ?
                ORDER BY published DESC, id DESC
                LIMIT ?
            )
            "#,
        )
        .bind(podcast_id)
        .bind(EpisodeState::Downloaded.to_i32())
        .bind(podcast_id)
        .bind(max_episodes as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to select episodes to purge: {}",
                e
            )))
        })?;

        let mut deleted = Vec::new();
        for id in candidates.into_iter().filter(|id| !protected.contains(id)) {
            sqlx::query("DELETE FROM episodes WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to purge episode: {}",
                        e
                    )))
                })?;
            deleted.push(id);
        }

        if !deleted.is_empty() {
            tracing::debug!(
                podcast_id = podcast_id.0,
                count = deleted.len(),
                "purged episodes beyond retention limit"
            );
        }
        Ok(deleted)
    }

    /// Episode counts for one podcast, or all podcasts when `podcast_id` is None
    pub async fn get_podcast_statistics(
        &self,
        podcast_id: Option<PodcastId>,
    ) -> Result<PodcastStatistics> {
        let (total, deleted, new, downloaded, unplayed): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(state = ?), 0),
                    COALESCE(SUM(is_new AND state = ?), 0),
                    COALESCE(SUM(state = ?), 0),
                    COALESCE(SUM(is_new AND state = ?), 0)
                FROM episodes
                WHERE ? IS NULL OR podcast_id = ?
                "#,
            )
            .bind(EpisodeState::Deleted.to_i32())
            .bind(EpisodeState::Normal.to_i32())
            .bind(EpisodeState::Downloaded.to_i32())
            .bind(EpisodeState::Downloaded.to_i32())
            .bind(podcast_id)
            .bind(podcast_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get podcast statistics: {}",
                    e
                )))
            })?;

        Ok(PodcastStatistics {
            total: total.max(0) as u64,
            deleted: deleted.max(0) as u64,
            new: new.max(0) as u64,
            downloaded: downloaded.max(0) as u64,
            unplayed: unplayed.max(0) as u64,
        })
    }

    /// Publication time of a podcast's newest stored episode
    pub async fn get_last_published(&self, podcast_id: PodcastId) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(published) FROM episodes WHERE podcast_id = ?")
                .bind(podcast_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get last published: {}",
                        e
                    )))
                })?;
        Ok(latest.and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }
}
