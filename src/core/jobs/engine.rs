use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::progress::StoreProgress;
use crate::core::config::NoisettConfig;
use crate::core::error::{ErrorCode, JobError};
use crate::core::generator::{GenerationRequest, ImageGenerator};
use crate::core::store::JobStore;
use crate::core::types::{GeneratedImage, Job, JobPage, JobQuery, JobStatus, NewJob};

const RECOVERY_PAGE: usize = 100;
/// Extra time, capped by the job timeout, before another process's
/// `processing` job is treated as abandoned.
const RECOVERY_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Ceiling for a job in `processing`; time spent queued does not count.
    pub job_timeout: Duration,
    pub max_concurrent_jobs: usize,
    pub poll_interval: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &NoisettConfig) -> Self {
        Self {
            job_timeout: config.job_timeout(),
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&NoisettConfig::default())
    }
}

enum Outcome {
    Images(Vec<GeneratedImage>),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Owns the job state machine and the background tasks that drive it.
#[derive(Clone)]
pub struct JobEngine {
    store: Arc<dyn JobStore>,
    generator: Arc<dyn ImageGenerator>,
    settings: EngineSettings,
    permits: Arc<Semaphore>,
    running: Arc<Mutex<HashMap<String, CancellationToken>>>,
    shutdown: CancellationToken,
}

impl JobEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        generator: Arc<dyn ImageGenerator>,
        settings: EngineSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
        Self {
            store,
            generator,
            settings,
            permits,
            running: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn generator(&self) -> &Arc<dyn ImageGenerator> {
        &self.generator
    }

    /// Records a queued job and schedules it. Returns as soon as the job exists.
    pub async fn submit(&self, new: NewJob) -> Result<Job, JobError> {
        let job = self.store.create(new).await?;
        info!(
            "Job {} queued ({} x {} via {}, user {})",
            job.id,
            job.count,
            job.asset_type.as_str(),
            job.model.as_str(),
            job.user_id
        );
        self.schedule(job.id.clone()).await;
        Ok(job)
    }

    async fn schedule(&self, id: String) {
        let token = self.shutdown.child_token();
        self.running.lock().await.insert(id.clone(), token.clone());
        let engine = self.clone();
        tokio::spawn(async move {
            engine.drive(&id, token).await;
            engine.running.lock().await.remove(&id);
        });
    }

    pub async fn get(&self, id: &str) -> Result<Job, JobError> {
        self.store.get(id).await
    }

    pub async fn list(&self, query: &JobQuery) -> Result<JobPage, JobError> {
        self.store.list(query).await
    }

    /// Marks the job cancelled right away, then stops its task.
    pub async fn cancel(&self, id: &str) -> Result<Job, JobError> {
        let job = self
            .store
            .update(id, &|mut job: Job| {
                if job.is_terminal() {
                    return Err(JobError::AlreadyTerminal {
                        id: job.id,
                        status: job.status,
                    });
                }
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                Ok(job)
            })
            .await?;
        if let Some(token) = self.running.lock().await.get(id) {
            token.cancel();
        }
        info!("Job {} cancelled at {:.0}%", id, job.progress);
        Ok(job)
    }

    /// Removes a finished job from history.
    pub async fn delete(&self, id: &str) -> Result<(), JobError> {
        let job = self.store.get(id).await?;
        if !job.is_terminal() {
            return Err(JobError::StillActive {
                id: job.id,
                status: job.status,
            });
        }
        self.store.delete(id).await?;
        self.generator.discard(id).await;
        info!("Job {} deleted", id);
        Ok(())
    }

    /// Polls until the job is terminal or `deadline` passes, returning the
    /// last observed state either way.
    pub async fn wait(&self, id: &str, deadline: Duration) -> Result<Job, JobError> {
        let started = Instant::now();
        loop {
            let job = self.store.get(id).await?;
            if job.is_terminal() || started.elapsed() >= deadline {
                return Ok(job);
            }
            let remaining = deadline.saturating_sub(started.elapsed());
            tokio::time::sleep(self.settings.poll_interval.min(remaining)).await;
        }
    }

    /// Picks up work left behind by a previous process: queued jobs are
    /// scheduled again, jobs caught mid-processing are failed once no live
    /// engine could still be running them.
    ///
    /// Another process sharing the store fails its own jobs by
    /// `started_at + job_timeout`, so a `processing` job is only treated as
    /// orphaned after that deadline plus a grace period. Younger ones get a
    /// deferred check that does nothing if their owner finishes first.
    pub async fn recover_interrupted(&self) -> Result<usize, JobError> {
        let mut recovered = 0;
        let mut deferred = 0;
        for job in self.collect_all(JobStatus::Queued).await? {
            if self.running.lock().await.contains_key(&job.id) {
                continue;
            }
            self.schedule(job.id.clone()).await;
            recovered += 1;
        }
        for job in self.collect_all(JobStatus::Processing).await? {
            if self.running.lock().await.contains_key(&job.id) {
                continue;
            }
            match self.orphaned_in(&job) {
                None => {
                    if self.fail_interrupted(&job.id).await {
                        recovered += 1;
                    }
                }
                Some(wait) => {
                    self.fail_if_still_processing(job.id.clone(), wait);
                    deferred += 1;
                }
            }
        }
        if recovered > 0 {
            info!("Recovered {} interrupted jobs", recovered);
        }
        if deferred > 0 {
            info!(
                "{} jobs are processing elsewhere; checking them again after their deadline",
                deferred
            );
        }
        Ok(recovered)
    }

    /// Time left before a `processing` job owned by someone else counts as
    /// abandoned. `None` once that point has passed.
    fn orphaned_in(&self, job: &Job) -> Option<Duration> {
        let started_at = job.started_at?;
        let grace = self.settings.job_timeout.min(RECOVERY_GRACE);
        let deadline = started_at
            + chrono::Duration::from_std(self.settings.job_timeout + grace).ok()?;
        (deadline - Utc::now()).to_std().ok().filter(|d| !d.is_zero())
    }

    fn fail_if_still_processing(&self, id: String, wait: Duration) {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = engine.shutdown.cancelled() => {}
                _ = tokio::time::sleep(wait) => {
                    engine.fail_interrupted(&id).await;
                }
            }
        });
    }

    async fn fail_interrupted(&self, id: &str) -> bool {
        let fail = fail_with(
            "Job interrupted before completion".to_string(),
            ErrorCode::GenerationFailed,
        );
        match self.store.update(id, &fail).await {
            Ok(_) => {
                self.generator.discard(id).await;
                true
            }
            Err(e) => {
                debug!("Job {} not recovered: {}", id, e);
                false
            }
        }
    }

    async fn collect_all(&self, status: JobStatus) -> Result<Vec<Job>, JobError> {
        let mut jobs = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .store
                .list(&JobQuery {
                    user_id: None,
                    status: Some(status),
                    limit: RECOVERY_PAGE,
                    offset,
                })
                .await?;
            let fetched = page.jobs.len();
            jobs.extend(page.jobs);
            offset += fetched;
            if fetched < RECOVERY_PAGE || offset >= page.total {
                return Ok(jobs);
            }
        }
    }

    /// Fails in-flight jobs and stops every task. Queued jobs stay queued for
    /// the next `recover_interrupted`.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.running.lock().await.keys().cloned().collect();
        for id in ids {
            let fail = fail_with(
                "Job interrupted by server shutdown".to_string(),
                ErrorCode::GenerationFailed,
            );
            match self.store.update(&id, &fail).await {
                Ok(_) => {
                    info!("Job {} interrupted by shutdown", id);
                    self.generator.discard(&id).await;
                }
                Err(e) => debug!("Job {} left as is on shutdown: {}", id, e),
            }
        }
        self.shutdown.cancel();
    }

    async fn drive(&self, id: &str, token: CancellationToken) {
        let _permit = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Job {} left the queue before starting", id);
                return;
            }
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Worker pool closed: {}", e);
                    return;
                }
            },
        };

        let job = match self.store.update(id, &start_processing).await {
            Ok(job) => job,
            Err(e) => {
                debug!("Job {} not started: {}", id, e);
                return;
            }
        };
        info!("Job {} processing", id);

        let outcome = self.generate(&job, &token).await;
        let (message, code) = match outcome {
            Outcome::Cancelled => {
                self.generator.discard(id).await;
                return;
            }
            Outcome::Images(images) if images.len() == job.count as usize => {
                match self.store.update(id, &complete_with(images)).await {
                    Ok(job) => info!("Job {} finished as {}", id, job.status),
                    Err(e) => {
                        info!("Discarding result for job {}: {}", id, e);
                        self.generator.discard(id).await;
                    }
                }
                return;
            }
            Outcome::Images(images) => (
                format!(
                    "Backend returned {} images, expected {}",
                    images.len(),
                    job.count
                ),
                ErrorCode::GenerationFailed,
            ),
            Outcome::Failed(message) => {
                warn!("Job {} failed: {}", id, message);
                (message, ErrorCode::GenerationFailed)
            }
            Outcome::TimedOut => {
                let message = format!(
                    "Generation timed out after {}s",
                    self.settings.job_timeout.as_secs()
                );
                warn!("Job {} {}", id, message.to_lowercase());
                (message, ErrorCode::GenerationTimeout)
            }
        };
        // Files go before the failure is visible to pollers.
        self.generator.discard(id).await;
        match self.store.update(id, &fail_with(message, code)).await {
            Ok(job) => info!("Job {} finished as {}", id, job.status),
            Err(e) => info!("Discarding result for job {}: {}", id, e),
        }
    }

    async fn generate(&self, job: &Job, token: &CancellationToken) -> Outcome {
        let request = GenerationRequest {
            job_id: job.id.clone(),
            prompt: job.prompt.clone(),
            asset_type: job.asset_type,
            model: job.model,
            quality: job.quality,
            count: job.count,
        };
        let generator = self.generator.clone();
        let sink = StoreProgress::new(self.store.clone(), job.id.clone());
        let mut handle =
            tokio::spawn(async move { generator.generate(&request, &sink).await });

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                handle.abort();
                let _ = handle.await;
                Outcome::Cancelled
            }
            joined = tokio::time::timeout(self.settings.job_timeout, &mut handle) => match joined {
                Err(_) => {
                    handle.abort();
                    let _ = handle.await;
                    Outcome::TimedOut
                }
                Ok(Err(e)) => {
                    error!("Generator task for job {} crashed: {}", job.id, e);
                    Outcome::Failed("Internal error while generating images".to_string())
                }
                Ok(Ok(Ok(images))) => Outcome::Images(images),
                Ok(Ok(Err(failure))) => Outcome::Failed(failure.to_string()),
            },
        }
    }
}

fn require_processing(job: &Job, to: JobStatus) -> Result<(), JobError> {
    match job.status {
        JobStatus::Processing => Ok(()),
        status if status.is_terminal() => Err(JobError::AlreadyTerminal {
            id: job.id.clone(),
            status,
        }),
        status => Err(JobError::InvalidTransition {
            id: job.id.clone(),
            from: status,
            to,
        }),
    }
}

fn start_processing(mut job: Job) -> Result<Job, JobError> {
    if job.status != JobStatus::Queued {
        return Err(JobError::InvalidTransition {
            id: job.id,
            from: job.status,
            to: JobStatus::Processing,
        });
    }
    job.status = JobStatus::Processing;
    job.started_at = Some(Utc::now());
    Ok(job)
}

fn complete_with(
    images: Vec<GeneratedImage>,
) -> impl Fn(Job) -> Result<Job, JobError> + Send + Sync {
    move |mut job: Job| {
        require_processing(&job, JobStatus::Complete)?;
        job.status = JobStatus::Complete;
        job.progress = 100.0;
        job.images = images.clone();
        job.completed_at = Some(Utc::now());
        Ok(job)
    }
}

fn fail_with(
    message: String,
    code: ErrorCode,
) -> impl Fn(Job) -> Result<Job, JobError> + Send + Sync {
    move |mut job: Job| {
        require_processing(&job, JobStatus::Failed)?;
        job.status = JobStatus::Failed;
        job.error_message = Some(message.clone());
        job.error_code = Some(code);
        job.completed_at = Some(Utc::now());
        Ok(job)
    }
}
