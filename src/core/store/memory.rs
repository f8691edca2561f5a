use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

use super::{FavoriteStore, JobMutator, JobStore, validate_successor};
use crate::core::error::JobError;
use crate::core::types::{Favorite, FavoritePage, Job, JobPage, JobQuery, NewJob};

struct Slot {
    job: Job,
    seq: u64,
}

/// Process-local store. Each job sits behind its own lock, so updates to
/// different jobs never wait on each other.
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Arc<Mutex<Slot>>>>,
    next_seq: AtomicU64,
    /// Insertion order, oldest first.
    favorites: Mutex<Vec<Favorite>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            favorites: Mutex::new(Vec::new()),
        }
    }

    async fn slot(&self, id: &str) -> Result<Arc<Mutex<Slot>>, JobError> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, JobError> {
        let job = Job::queued(new);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.jobs.write().await.insert(
            job.id.clone(),
            Arc::new(Mutex::new(Slot {
                job: job.clone(),
                seq,
            })),
        );
        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Job, JobError> {
        let slot = self.slot(id).await?;
        let guard = slot.lock().await;
        Ok(guard.job.clone())
    }

    async fn update(&self, id: &str, mutator: JobMutator<'_>) -> Result<Job, JobError> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let next = mutator(guard.job.clone())?;
        validate_successor(&guard.job, &next)?;
        guard.job = next.clone();
        Ok(next)
    }

    async fn list(&self, query: &JobQuery) -> Result<JobPage, JobError> {
        let slots: Vec<Arc<Mutex<Slot>>> = self.jobs.read().await.values().cloned().collect();
        let mut matching = Vec::new();
        for slot in slots {
            let guard = slot.lock().await;
            let job = &guard.job;
            if query.user_id.as_ref().is_some_and(|u| *u != job.user_id) {
                continue;
            }
            if query.status.is_some_and(|s| s != job.status) {
                continue;
            }
            matching.push((job.created_at, guard.seq, job.clone()));
        }
        matching.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        let total = matching.len();
        let jobs = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(_, _, job)| job)
            .collect();
        Ok(JobPage { jobs, total })
    }

    async fn delete(&self, id: &str) -> Result<(), JobError> {
        self.jobs
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl FavoriteStore for InMemoryJobStore {
    async fn add_favorite(&self, favorite: Favorite) -> Result<Favorite, JobError> {
        let mut favorites = self.favorites.lock().await;
        let taken = favorites.iter().any(|f| {
            f.user_id == favorite.user_id
                && f.job_id == favorite.job_id
                && f.image_index == favorite.image_index
        });
        if taken {
            return Err(JobError::FavoriteExists {
                job_id: favorite.job_id,
                image_index: favorite.image_index,
            });
        }
        favorites.push(favorite.clone());
        Ok(favorite)
    }

    async fn list_favorites(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<FavoritePage, JobError> {
        let favorites = self.favorites.lock().await;
        let mine: Vec<&Favorite> = favorites
            .iter()
            .rev()
            .filter(|f| f.user_id == user_id)
            .collect();
        Ok(FavoritePage {
            total: mine.len(),
            favorites: mine.into_iter().skip(offset).take(limit).cloned().collect(),
        })
    }

    async fn remove_favorite(
        &self,
        user_id: &str,
        job_id: &str,
        image_index: u32,
    ) -> Result<bool, JobError> {
        let mut favorites = self.favorites.lock().await;
        let before = favorites.len();
        favorites.retain(|f| {
            !(f.user_id == user_id && f.job_id == job_id && f.image_index == image_index)
        });
        Ok(favorites.len() < before)
    }

    async fn remove_job_favorites(&self, job_id: &str) -> Result<usize, JobError> {
        let mut favorites = self.favorites.lock().await;
        let before = favorites.len();
        favorites.retain(|f| f.job_id != job_id);
        Ok(before - favorites.len())
    }
}
