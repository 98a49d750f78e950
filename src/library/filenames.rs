//! Folder and filename assignment
//!
//! The desired names are pure functions of the podcast/episode; collisions are
//! resolved against the names already assigned in the store with
//! [`resolve_unique_name`], so a repeated call with an unchanged title keeps the
//! name assigned last time.

use super::Library;
use crate::config::FilenameSource;
use crate::model::{Episode, Podcast};
use crate::utils::{
    extension_from_mimetype, filename_from_url, resolve_unique_name, sanitize_filename,
    split_extension, url_digest, MAX_FILENAME_LENGTH, MAX_FOLDERNAME_LENGTH,
};
use crate::Result;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Longest extension taken from a URL
const MAX_EXTENSION_LENGTH: usize = 6;

/// Folder name a podcast would get without collisions
///
/// The sanitized title, or the last URL segment while the podcast has no real
/// title yet, or the URL digest as last resort.
pub fn desired_folder_name(podcast: &Podcast) -> String {
    if podcast.title != podcast.url {
        let title = sanitize_filename(&podcast.title, MAX_FOLDERNAME_LENGTH);
        if !title.is_empty() {
            return title;
        }
    }
    filename_from_url(&podcast.url)
        .map(|name| sanitize_filename(split_extension(&name).0, MAX_FOLDERNAME_LENGTH))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| url_digest(&podcast.url))
}

/// Filename stem and extension an episode would get without collisions
pub fn desired_filename(episode: &Episode, source: FilenameSource) -> (String, String) {
    let url_name = filename_from_url(&episode.url).unwrap_or_default();
    let (url_stem, url_ext) = split_extension(&url_name);

    let ext = if is_plausible_extension(url_ext) {
        url_ext.to_ascii_lowercase()
    } else {
        extension_from_mimetype(&episode.mime_type)
            .unwrap_or_default()
            .to_string()
    };

    let title = sanitize_filename(&episode.title, MAX_FILENAME_LENGTH);
    let from_url = sanitize_filename(url_stem, MAX_FILENAME_LENGTH);
    let candidates = match source {
        FilenameSource::Title => [title, from_url],
        FilenameSource::Url => [from_url, title],
    };
    let stem = candidates
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| url_digest(&episode.url));

    (stem, ext)
}

fn is_plausible_extension(ext: &str) -> bool {
    ext.len() > 1
        && ext.len() <= MAX_EXTENSION_LENGTH
        && ext[1..].chars().all(|c| c.is_ascii_alphanumeric())
}

impl Library {
    /// Assign (or re-assign after a title change) the podcast's download folder
    ///
    /// An existing folder on disk is renamed along with the assignment. The
    /// podcast is saved when its folder changed.
    pub async fn assign_folder(&self, podcast: &mut Podcast) -> Result<String> {
        let taken = self.db.podcast_folders().await?;
        let folder = resolve_unique_name(
            &desired_folder_name(podcast),
            "",
            &taken,
            podcast.download_folder.as_deref(),
        );
        if podcast.download_folder.as_deref() == Some(folder.as_str()) {
            return Ok(folder);
        }

        if let Some(old) = podcast.download_folder.take() {
            let from = self.download_dir.join(&old);
            let to = self.download_dir.join(&folder);
            if tokio::fs::try_exists(&from).await.unwrap_or(false) {
                match tokio::fs::rename(&from, &to).await {
                    Ok(()) => info!(podcast_id = podcast.id.0, from = %old, to = %folder, "renamed download folder"),
                    Err(e) => {
                        warn!(podcast_id = podcast.id.0, error = %e, "failed to rename download folder, keeping it");
                        podcast.download_folder = Some(old.clone());
                        return Ok(old);
                    }
                }
            }
        }

        debug!(podcast_id = podcast.id.0, folder = %folder, "assigned download folder");
        podcast.download_folder = Some(folder.clone());
        self.db.save_podcast(podcast).await?;
        Ok(folder)
    }

    /// Directory holding a podcast's files
    pub fn podcast_dir(&self, podcast: &Podcast) -> PathBuf {
        match &podcast.download_folder {
            Some(folder) => self.download_dir.join(folder),
            None => self.download_dir.join(desired_folder_name(podcast)),
        }
    }

    /// Local filename of an episode, assigned and saved on first use
    pub async fn assign_filename(&self, podcast: &Podcast, episode: &mut Episode) -> Result<String> {
        if let Some(name) = &episode.download_filename {
            return Ok(name.clone());
        }

        let (stem, ext) = desired_filename(episode, self.filename_source);
        let taken = self.db.episode_filenames(podcast.id).await?;
        let name = resolve_unique_name(&stem, &ext, &taken, None);
        debug!(
            podcast_id = podcast.id.0,
            guid = %episode.guid,
            filename = %name,
            "assigned episode filename"
        );
        episode.download_filename = Some(name.clone());
        self.db.save_episode(episode).await?;
        Ok(name)
    }

    /// Full path of an episode's file, when it has a filename
    pub fn episode_path(&self, podcast: &Podcast, episode: &Episode) -> Option<PathBuf> {
        episode
            .download_filename
            .as_ref()
            .map(|name| self.podcast_dir(podcast).join(name))
    }
}
