mod engine;
mod progress;

pub use engine::{EngineSettings, JobEngine};

use crate::core::types::JobStatus;

/// Progress ceiling while a job is still processing; only completion writes 100.
pub const PROCESSING_PROGRESS_CAP: f32 = 99.0;

pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    if from == to {
        return !from.is_terminal();
    }
    match from {
        JobStatus::Queued => matches!(to, JobStatus::Processing | JobStatus::Cancelled),
        JobStatus::Processing => matches!(
            to,
            JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled
        ),
        JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled => false,
    }
}

/// Human summary of where a job stands, shared by the status and wait commands.
pub fn describe(job: &crate::core::types::Job) -> String {
    match job.status {
        JobStatus::Queued => "Job is queued, waiting to start".to_string(),
        JobStatus::Processing => format!("Job is processing ({:.0}% complete)", job.progress),
        JobStatus::Complete => format!("Job complete with {} images", job.images.len()),
        JobStatus::Failed => format!(
            "Job failed: {}",
            job.error_message.as_deref().unwrap_or("Unknown error")
        ),
        JobStatus::Cancelled => "Job was cancelled".to_string(),
    }
}

#[cfg(test)]
mod tests;
