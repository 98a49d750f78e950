//! Startup reconciliation of the download directory with the store

use super::filenames::desired_filename;
use super::Library;
use crate::download::TaskRequest;
use crate::model::{Episode, Podcast};
use crate::types::EpisodeState;
use crate::utils::{sanitize_filename, url_digest, MAX_FILENAME_LENGTH, PARTIAL_SUFFIX};
use crate::Result;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A partial file matched to an episode, offered for resumed download
#[derive(Clone, Debug)]
pub struct ResumableDownload {
    /// Task parameters for the episode
    pub request: TaskRequest,
    /// Bytes already in the partial file
    pub partial_size: u64,
}

/// What [`Library::load`] found
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Subscriptions loaded
    pub podcasts: usize,
    /// Episodes whose state was corrected from the filesystem
    pub reconciled: usize,
    /// Partial downloads of known episodes
    pub resumable: Vec<ResumableDownload>,
    /// Partial files matching no episode (deleted when so configured)
    pub orphaned: Vec<PathBuf>,
}

/// Regular files of a directory with their sizes; empty when the directory is missing
async fn list_files(dir: &Path) -> Result<HashMap<String, u64>> {
    let mut files = HashMap::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_file()
            && let Some(name) = entry.file_name().to_str()
        {
            files.insert(name.to_string(), metadata.len());
        }
    }
    Ok(files)
}

/// Names an externally downloaded file of `episode` may have
fn candidate_names(library: &Library, episode: &Episode) -> Vec<String> {
    let (stem, ext) = desired_filename(episode, library.filename_source);
    let mut names = vec![
        format!("{stem}{ext}"),
        format!("{}{ext}", url_digest(&episode.url)),
    ];
    let guid = sanitize_filename(&episode.guid, MAX_FILENAME_LENGTH);
    if !guid.is_empty() {
        names.push(format!("{guid}{ext}"));
    }
    names
}

impl Library {
    /// Load every subscription, reconcile it with the filesystem and find partial files
    ///
    /// Loaded podcasts replace the in-memory registry.
    pub async fn load(&self, delete_orphans: bool) -> Result<StartupReport> {
        let podcasts = self.db.load_podcasts().await?;
        let mut report = StartupReport {
            podcasts: podcasts.len(),
            ..StartupReport::default()
        };

        let mut folders = HashSet::new();
        for mut podcast in podcasts {
            report.reconciled += self.reconcile(&mut podcast).await?;
            let (resumable, orphaned) = self.scan_partials(&podcast).await?;
            report.resumable.extend(resumable);
            report.orphaned.extend(orphaned);
            if let Some(folder) = &podcast.download_folder {
                folders.insert(folder.clone());
            }
            self.insert(podcast);
        }
        report.orphaned.extend(self.scan_unknown_folders(&folders).await?);

        for path in &report.orphaned {
            if delete_orphans {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => info!(path = %path.display(), "deleted orphaned partial file"),
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to delete orphaned partial file"),
                }
            } else {
                warn!(path = %path.display(), "orphaned partial file");
            }
        }

        info!(
            podcasts = report.podcasts,
            reconciled = report.reconciled,
            resumable = report.resumable.len(),
            orphaned = report.orphaned.len(),
            "library loaded"
        );
        Ok(report)
    }

    /// Correct episode states from the files present in the podcast's folder
    ///
    /// A downloaded episode whose file is gone becomes `Deleted`. An episode whose
    /// file is present (under its assigned name, or a name it would be given) becomes
    /// `Downloaded`. Returns the number of episodes changed.
    pub async fn reconcile(&self, podcast: &mut Podcast) -> Result<usize> {
        let files = list_files(&self.podcast_dir(podcast)).await?;
        let mut claimed: HashSet<String> = podcast
            .episodes
            .iter()
            .filter_map(|e| e.download_filename.clone())
            .collect();

        let mut changed = 0;
        for episode in podcast.episodes.iter_mut() {
            let found = match &episode.download_filename {
                Some(name) => files.get(name).map(|size| (name.clone(), *size)),
                None => candidate_names(self, episode)
                    .into_iter()
                    .filter(|name| !claimed.contains(name))
                    .find_map(|name| files.get(&name).map(|size| (name, *size))),
            };

            let updated = match found {
                None if episode.state == EpisodeState::Downloaded => {
                    debug!(guid = %episode.guid, "downloaded file is gone");
                    episode.set_state(EpisodeState::Deleted);
                    true
                }
                Some((name, size)) if episode.state != EpisodeState::Downloaded => {
                    debug!(guid = %episode.guid, filename = %name, "found downloaded file");
                    claimed.insert(name.clone());
                    episode.download_filename = Some(name);
                    episode.set_state(EpisodeState::Downloaded);
                    episode.file_size = size;
                    true
                }
                _ => false,
            };
            if updated {
                self.db.save_episode(episode).await?;
                changed += 1;
            }
        }

        if changed > 0 {
            info!(podcast_id = podcast.id.0, changed, "reconciled episodes with download folder");
        }
        Ok(changed)
    }

    /// Partial files of a podcast: those matching an undownloaded episode, and the rest
    pub async fn scan_partials(
        &self,
        podcast: &Podcast,
    ) -> Result<(Vec<ResumableDownload>, Vec<PathBuf>)> {
        let dir = self.podcast_dir(podcast);
        let mut resumable = Vec::new();
        let mut orphaned = Vec::new();

        for (name, size) in list_files(&dir).await? {
            let Some(target) = name.strip_suffix(PARTIAL_SUFFIX) else {
                continue;
            };
            let request = podcast
                .episodes
                .iter()
                .find(|e| {
                    e.download_filename.as_deref() == Some(target)
                        && e.state != EpisodeState::Downloaded
                })
                .and_then(|episode| self.task_request(podcast, episode));
            match request {
                Some(request) => {
                    debug!(
                        podcast_id = podcast.id.0,
                        episode_id = request.episode_id.0,
                        partial_size = size,
                        "found resumable download"
                    );
                    resumable.push(ResumableDownload {
                        request,
                        partial_size: size,
                    });
                }
                None => orphaned.push(dir.join(&name)),
            }
        }
        Ok((resumable, orphaned))
    }

    /// Partial files in download folders that belong to no subscription
    async fn scan_unknown_folders(&self, known: &HashSet<String>) -> Result<Vec<PathBuf>> {
        let mut orphaned = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.download_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(orphaned),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if known.contains(&name) || !entry.file_type().await?.is_dir() {
                continue;
            }
            for file in list_files(&entry.path()).await?.into_keys() {
                if file.ends_with(PARTIAL_SUFFIX) {
                    orphaned.push(entry.path().join(file));
                }
            }
        }
        Ok(orphaned)
    }
}
