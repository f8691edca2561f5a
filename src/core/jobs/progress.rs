use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::PROCESSING_PROGRESS_CAP;
use crate::core::generator::ProgressSink;
use crate::core::store::JobStore;
use crate::core::types::{Job, JobStatus};

/// Writes adapter progress into the store for one job.
pub(super) struct StoreProgress {
    store: Arc<dyn JobStore>,
    job_id: String,
}

impl StoreProgress {
    pub(super) fn new(store: Arc<dyn JobStore>, job_id: String) -> Self {
        Self { store, job_id }
    }
}

pub(super) fn to_percent(fraction: f32) -> f32 {
    if fraction.is_nan() {
        return 0.0;
    }
    (fraction * 100.0).clamp(0.0, PROCESSING_PROGRESS_CAP)
}

#[async_trait]
impl ProgressSink for StoreProgress {
    async fn report(&self, fraction: f32) {
        let percent = to_percent(fraction);
        let result = self
            .store
            .update(&self.job_id, &move |mut job: Job| {
                if job.status == JobStatus::Processing && percent > job.progress {
                    job.progress = percent;
                }
                Ok(job)
            })
            .await;
        if let Err(e) = result {
            debug!("Progress for job {} not recorded: {}", self.job_id, e);
        }
    }
}
