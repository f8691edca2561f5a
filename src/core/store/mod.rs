mod memory;
mod sqlite;

pub use memory::InMemoryJobStore;
pub use sqlite::SqliteJobStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::config::NoisettConfig;
use crate::core::error::JobError;
use crate::core::jobs::can_transition;
use crate::core::types::{Favorite, FavoritePage, Job, JobPage, JobQuery, JobStatus, NewJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Sqlite => "sqlite",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(StoreKind::Memory),
            "sqlite" => Some(StoreKind::Sqlite),
            _ => None,
        }
    }
}

/// Pure read-modify-write step applied atomically by `JobStore::update`.
/// Stores may call it more than once when a compare-and-swap loses a race.
pub type JobMutator<'a> = &'a (dyn Fn(Job) -> Result<Job, JobError> + Send + Sync);

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, new: NewJob) -> Result<Job, JobError>;

    async fn get(&self, id: &str) -> Result<Job, JobError>;

    /// Linearizable per job id. Returns the committed job, or the mutator's
    /// error with nothing written.
    async fn update(&self, id: &str, mutator: JobMutator<'_>) -> Result<Job, JobError>;

    /// Newest first.
    async fn list(&self, query: &JobQuery) -> Result<JobPage, JobError>;

    async fn delete(&self, id: &str) -> Result<(), JobError>;
}

/// Per-user image bookmarks. Keyed by `(user_id, job_id, image_index)`.
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    /// Fails with [`JobError::FavoriteExists`] when the key is taken.
    async fn add_favorite(&self, favorite: Favorite) -> Result<Favorite, JobError>;

    /// Newest first.
    async fn list_favorites(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<FavoritePage, JobError>;

    /// Returns whether anything was removed.
    async fn remove_favorite(
        &self,
        user_id: &str,
        job_id: &str,
        image_index: u32,
    ) -> Result<bool, JobError>;

    /// Drops every bookmark pointing at `job_id`.
    async fn remove_job_favorites(&self, job_id: &str) -> Result<usize, JobError>;
}

/// Both halves of one backing store.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub favorites: Arc<dyn FavoriteStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryJobStore::new());
        Self {
            jobs: store.clone(),
            favorites: store,
        }
    }

    fn sqlite(store: SqliteJobStore) -> Self {
        let store = Arc::new(store);
        Self {
            jobs: store.clone(),
            favorites: store,
        }
    }
}

pub async fn open_store(config: &NoisettConfig) -> Result<Stores, JobError> {
    let stores = match config.store {
        StoreKind::Memory => Stores::in_memory(),
        StoreKind::Sqlite => Stores::sqlite(SqliteJobStore::open(&config.database_path()).await?),
    };
    info!("Job store ready ({})", config.store.as_str());
    Ok(stores)
}

/// Checks that `after` is a legal successor of `before`. Every store runs
/// this on each update so no caller can commit a regression.
pub fn validate_successor(before: &Job, after: &Job) -> Result<(), JobError> {
    let reject = |reason: &str| JobError::Rejected {
        id: before.id.clone(),
        reason: reason.to_string(),
    };

    if before == after {
        return Ok(());
    }
    if before.is_terminal() {
        return Err(JobError::AlreadyTerminal {
            id: before.id.clone(),
            status: before.status,
        });
    }
    if before.id != after.id
        || before.prompt != after.prompt
        || before.asset_type != after.asset_type
        || before.model != after.model
        || before.quality != after.quality
        || before.count != after.count
        || before.user_id != after.user_id
        || before.created_at != after.created_at
    {
        return Err(reject("creation parameters are immutable"));
    }
    if !can_transition(before.status, after.status) {
        return Err(JobError::InvalidTransition {
            id: before.id.clone(),
            from: before.status,
            to: after.status,
        });
    }
    if !(0.0..=100.0).contains(&after.progress) || after.progress < before.progress {
        return Err(reject("progress must stay within 0..=100 and never decrease"));
    }
    if (after.progress >= 100.0) != (after.status == JobStatus::Complete) {
        return Err(reject("progress reaches 100 only on completion"));
    }
    let images_ok = if after.status == JobStatus::Complete {
        after.images.len() == after.count as usize
    } else {
        after.images.is_empty()
    };
    if !images_ok {
        return Err(reject("images are delivered all at once on completion"));
    }
    if after.error_message.is_some() != (after.status == JobStatus::Failed) {
        return Err(reject("error_message is set only on failure"));
    }
    if before.started_at.is_some() && before.started_at != after.started_at {
        return Err(reject("started_at is set once"));
    }
    if before.completed_at.is_some() && before.completed_at != after.completed_at {
        return Err(reject("completed_at is set once"));
    }
    if after.is_terminal() != after.completed_at.is_some() {
        return Err(reject("completed_at marks terminal states"));
    }
    Ok(())
}
