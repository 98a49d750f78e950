//! Podcast subscription CRUD operations.

use crate::error::DatabaseError;
use crate::model::{Credentials, Podcast};
use crate::types::PodcastId;
use crate::{Error, Result};
use std::collections::HashSet;

use super::{Database, PodcastRow};

const PODCAST_COLUMNS: &str = r#"
    id, url, title, link, description, cover_url, payment_url,
    http_etag, http_last_modified, auth_username, auth_password,
    download_folder, auto_archive, pause_subscription, download_strategy,
    section, last_update
"#;

impl Database {
    /// Insert a new subscription row and return its ID
    ///
    /// Fails with [`Error::Duplicate`] when the URL is already subscribed.
    pub async fn insert_podcast(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<PodcastId> {
        let result = sqlx::query(
            r#"
            INSERT INTO podcasts (url, title, auth_username, auth_password)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(url)
        .bind(url)
        .bind(credentials.map(|c| c.username.as_str()))
        .bind(credentials.map(|c| c.password.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                Error::Duplicate(url.to_string())
            } else {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert podcast: {}",
                    e
                )))
            }
        })?;

        Ok(PodcastId(result.last_insert_rowid()))
    }

    /// Persist every podcast field (episodes are saved separately)
    pub async fn save_podcast(&self, podcast: &Podcast) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE podcasts SET
                url = ?, title = ?, link = ?, description = ?, cover_url = ?,
                payment_url = ?, http_etag = ?, http_last_modified = ?,
                auth_username = ?, auth_password = ?, download_folder = ?,
                auto_archive = ?, pause_subscription = ?, download_strategy = ?,
                section = ?, last_update = ?
            WHERE id = ?
            "#,
        )
        .bind(&podcast.url)
        .bind(&podcast.title)
        .bind(&podcast.link)
        .bind(&podcast.description)
        .bind(&podcast.cover_url)
        .bind(&podcast.payment_url)
        .bind(&podcast.http_etag)
        .bind(&podcast.http_last_modified)
        .bind(podcast.credentials.as_ref().map(|c| c.username.as_str()))
        .bind(podcast.credentials.as_ref().map(|c| c.password.as_str()))
        .bind(&podcast.download_folder)
        .bind(podcast.auto_archive)
        .bind(podcast.pause_subscription)
        .bind(podcast.download_strategy.to_i32())
        .bind(&podcast.section)
        .bind(podcast.last_update.map(|t| t.timestamp()))
        .bind(podcast.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "Podcast {} conflicts with another subscription: {}",
                    podcast.id, e
                )))
            } else {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to save podcast: {}",
                    e
                )))
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "podcast {}",
                podcast.id
            ))));
        }
        Ok(())
    }

    /// Delete a subscription; its episodes cascade
    pub async fn delete_podcast(&self, id: PodcastId) -> Result<()> {
        sqlx::query("DELETE FROM podcasts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete podcast: {}",
                    e
                )))
            })?;
        Ok(())
    }

    /// Look up a subscription by feed URL (episodes are not loaded)
    pub async fn get_podcast_by_url(&self, url: &str) -> Result<Option<Podcast>> {
        let sql = format!("SELECT {PODCAST_COLUMNS} FROM podcasts WHERE url = ?");
        let row = sqlx::query_as::<_, PodcastRow>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get podcast by URL: {}",
                    e
                )))
            })?;

        Ok(row.map(Podcast::from))
    }

    /// Load every subscription with its episodes, newest episodes first
    pub async fn load_podcasts(&self) -> Result<Vec<Podcast>> {
        let sql =
            format!("SELECT {PODCAST_COLUMNS} FROM podcasts ORDER BY title COLLATE NOCASE");
        let rows = sqlx::query_as::<_, PodcastRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to load podcasts: {}",
                    e
                )))
            })?;

        let mut podcasts = Vec::with_capacity(rows.len());
        for row in rows {
            let mut podcast = Podcast::from(row);
            podcast.episodes = self.load_episodes(podcast.id).await?;
            podcasts.push(podcast);
        }
        Ok(podcasts)
    }

    /// Folder names assigned to any subscription
    pub async fn podcast_folders(&self) -> Result<HashSet<String>> {
        let folders: Vec<String> = sqlx::query_scalar(
            "SELECT download_folder FROM podcasts WHERE download_folder IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list podcast folders: {}",
                e
            )))
        })?;
        Ok(folders.into_iter().collect())
    }
}
