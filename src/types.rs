//! Core types for podcast-dl

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Declares an `i64` row-id newtype usable directly as an sqlx bind parameter
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

row_id!(
    /// Database identifier of a podcast subscription
    PodcastId
);

row_id!(
    /// Database identifier of an episode
    EpisodeId
);

/// Process-local identifier of a download task
///
/// Tasks are not persisted, so ids only need to be unique within one process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Allocate the next task id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an episode's local file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeState {
    /// Not downloaded
    #[default]
    Normal,
    /// File is present in the podcast's download folder
    Downloaded,
    /// File was downloaded and later removed
    Deleted,
}

impl EpisodeState {
    /// Convert integer state code to EpisodeState
    pub fn from_i32(state: i32) -> Self {
        match state {
            1 => EpisodeState::Downloaded,
            2 => EpisodeState::Deleted,
            _ => EpisodeState::Normal,
        }
    }

    /// Convert EpisodeState to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            EpisodeState::Normal => 0,
            EpisodeState::Downloaded => 1,
            EpisodeState::Deleted => 2,
        }
    }
}

/// Policy for how many episodes of one update are marked new
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionStrategy {
    /// Every genuinely new episode is marked new
    #[default]
    Default,
    /// At most one episode per update is marked new
    LatestOnly,
}

impl RetentionStrategy {
    /// Convert integer code to RetentionStrategy
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => RetentionStrategy::LatestOnly,
            _ => RetentionStrategy::Default,
        }
    }

    /// Convert RetentionStrategy to integer code
    pub fn to_i32(&self) -> i32 {
        match self {
            RetentionStrategy::Default => 0,
            RetentionStrategy::LatestOnly => 1,
        }
    }
}

/// Download task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for a worker slot
    Queued,
    /// A worker is transferring bytes
    Downloading,
    /// Pause requested, worker has not stopped yet
    Pausing,
    /// Stopped with the partial file kept for resume
    Paused,
    /// Cancel requested, worker has not stopped yet
    Cancelling,
    /// Stopped with the partial file deleted
    Cancelled,
    /// Transfer error, message captured on the task
    Failed,
    /// Transfer complete and the file is in place
    Done,
}

impl TaskStatus {
    /// Whether an explicit re-queue is allowed
    pub fn can_queue(&self) -> bool {
        matches!(
            self,
            TaskStatus::Paused | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether a pause request is allowed
    pub fn can_pause(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Downloading)
    }

    /// Whether a cancel request is allowed
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            TaskStatus::Queued | TaskStatus::Downloading | TaskStatus::Pausing | TaskStatus::Paused
        )
    }

    /// Whether the task may be removed from the visible task list
    pub fn can_remove(&self) -> bool {
        matches!(
            self,
            TaskStatus::Cancelled | TaskStatus::Failed | TaskStatus::Done
        )
    }

    /// Whether a worker currently owns the task
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Downloading | TaskStatus::Pausing | TaskStatus::Cancelling
        )
    }

    /// Transition table of the task state machine
    ///
    /// Queued tasks have no worker to acknowledge a pause or cancel, so they move
    /// straight to `Paused` or `Cancelled`. A pausing task can still be cancelled,
    /// and may finish or fail before the worker observes the request.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Queued, Downloading | Paused | Cancelled) => true,
            (Downloading, Pausing | Cancelling | Failed | Done) => true,
            (Pausing, Paused | Cancelling | Failed | Done) => true,
            (Cancelling, Cancelled) => true,
            (Paused, Queued | Cancelled) => true,
            (Failed | Cancelled, Queued) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Pausing => "pausing",
            TaskStatus::Paused => "paused",
            TaskStatus::Cancelling => "cancelling",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
            TaskStatus::Done => "done",
        };
        f.write_str(name)
    }
}

/// What kind of transfer a task performs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    /// Episode download into the podcast folder
    #[default]
    Download,
    /// Copy of a downloaded episode onto an external device
    SyncTransfer,
}

/// Episode counts for one podcast, or for all podcasts together
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastStatistics {
    /// All episodes
    pub total: u64,
    /// Episodes in the deleted state
    pub deleted: u64,
    /// Not-downloaded episodes still marked new
    pub new: u64,
    /// Episodes in the downloaded state
    pub downloaded: u64,
    /// Downloaded episodes not played yet
    pub unplayed: u64,
}

/// Point-in-time copy of a task's observable fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task ID
    pub id: TaskId,
    /// Episode the task downloads
    pub episode_id: EpisodeId,
    /// Podcast owning the episode
    pub podcast_id: PodcastId,
    /// Episode title
    pub title: String,
    /// Podcast title
    pub podcast_title: String,
    /// Current status
    pub status: TaskStatus,
    /// Progress fraction (0.0 to 1.0)
    pub progress: f64,
    /// Smoothed transfer speed in bytes per second
    pub speed_bps: u64,
    /// Total size in bytes (0 while unknown)
    pub total_size: u64,
    /// Bytes on disk
    pub downloaded_bytes: u64,
    /// Error message when failed
    pub error: Option<String>,
    /// Transfer kind
    pub activity: Activity,
}

/// Aggregate view over the task list, recomputed on every status refresh
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    /// Tasks waiting for a slot
    pub queued: usize,
    /// Tasks owned by a worker (downloading, pausing, cancelling)
    pub active: usize,
    /// Paused tasks
    pub paused: usize,
    /// Failed tasks
    pub failed: usize,
    /// Completed tasks still listed
    pub done: usize,
    /// Cancelled tasks still listed
    pub cancelled: usize,
    /// Sum of the smoothed speeds of active tasks
    pub speed_bps: u64,
    /// Combined progress of queued and active tasks (0.0 to 100.0)
    pub percent: f64,
}

/// Event emitted by the library
///
/// Subscribers receive these over a broadcast channel; the display layer decides
/// how to render them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task added to the task list
    TaskAdded {
        /// Snapshot at insertion
        task: TaskSnapshot,
    },

    /// Task changed since the last status refresh
    TaskUpdated {
        /// Current snapshot
        task: TaskSnapshot,
    },

    /// Task removed from the task list
    TaskRemoved {
        /// Task ID
        id: TaskId,
    },

    /// Aggregate status recomputed
    SummaryUpdated {
        /// Current summary
        summary: StatusSummary,
    },

    /// Episode file downloaded and moved into place
    EpisodeDownloaded {
        /// Episode ID
        episode_id: EpisodeId,
        /// Podcast ID
        podcast_id: PodcastId,
        /// Final file size in bytes
        size: u64,
    },

    /// A feed update produced new episodes
    NewEpisodesAvailable {
        /// Podcast ID
        podcast_id: PodcastId,
        /// The new episodes
        episode_ids: Vec<EpisodeId>,
    },

    /// Podcast subscribed, removed, or its metadata changed
    PodcastListChanged,

    /// A podcast was updated successfully
    PodcastUpdated {
        /// Podcast ID
        podcast_id: PodcastId,
        /// Number of new episodes
        new_episodes: usize,
    },

    /// A podcast update failed
    PodcastUpdateFailed {
        /// Podcast ID
        podcast_id: PodcastId,
        /// Error message
        error: String,
    },

    /// Queue dispatch resumed
    QueueEnabled,

    /// Queue dispatch suspended
    QueueDisabled,

    /// Bandwidth cap changed
    SpeedLimitChanged {
        /// New limit in bytes per second (None = unlimited)
        limit_bps: Option<u64>,
    },

    /// Concurrency cap or its enforcement changed
    DownloadLimitChanged {
        /// Maximum concurrent downloads
        max_concurrent: usize,
        /// Whether the cap is enforced
        enabled: bool,
    },

    /// Shutdown finished
    Shutdown,
}
