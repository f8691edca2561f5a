use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::JobStatus;

/// Machine-readable error vocabulary shared by every surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    PromptEmpty,
    PromptTooLong,
    InvalidCount,
    JobNotFound,
    JobAlreadyComplete,
    JobAlreadyCancelled,
    JobAlreadyFailed,
    FavoriteNotFound,
    FavoriteAlreadyExists,
    ModelUnavailable,
    ModelNotFound,
    GenerationFailed,
    GenerationTimeout,
    RateLimited,
    InternalError,
    ServiceUnavailable,
}

pub struct ErrorTemplate {
    pub message: &'static str,
    pub suggestion: &'static str,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::PromptEmpty => "PROMPT_EMPTY",
            ErrorCode::PromptTooLong => "PROMPT_TOO_LONG",
            ErrorCode::InvalidCount => "INVALID_COUNT",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::JobAlreadyComplete => "JOB_ALREADY_COMPLETE",
            ErrorCode::JobAlreadyCancelled => "JOB_ALREADY_CANCELLED",
            ErrorCode::JobAlreadyFailed => "JOB_ALREADY_FAILED",
            ErrorCode::FavoriteNotFound => "FAVORITE_NOT_FOUND",
            ErrorCode::FavoriteAlreadyExists => "FAVORITE_ALREADY_EXISTS",
            ErrorCode::ModelUnavailable => "MODEL_UNAVAILABLE",
            ErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorCode::GenerationFailed => "GENERATION_FAILED",
            ErrorCode::GenerationTimeout => "GENERATION_TIMEOUT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn template(self) -> ErrorTemplate {
        let (message, suggestion) = match self {
            ErrorCode::ValidationError => (
                "Input validation failed",
                "Check the command schema and provide valid input",
            ),
            ErrorCode::PromptEmpty => (
                "Prompt cannot be empty",
                "Provide a description of the image you want to generate",
            ),
            ErrorCode::PromptTooLong => (
                "Prompt exceeds maximum length (500 characters)",
                "Shorten your prompt or split into multiple requests",
            ),
            ErrorCode::InvalidCount => (
                "Count must be between 1 and 4",
                "Specify a count between 1 and 4",
            ),
            ErrorCode::JobNotFound => (
                "Generation job not found",
                "Check the job ID or list recent jobs with job.list",
            ),
            ErrorCode::JobAlreadyComplete => (
                "Cannot modify a completed job",
                "Start a new generation instead",
            ),
            ErrorCode::JobAlreadyCancelled => (
                "Job was already cancelled",
                "Start a new generation instead",
            ),
            ErrorCode::JobAlreadyFailed => (
                "Job has already failed",
                "Start a new generation instead",
            ),
            ErrorCode::FavoriteNotFound => (
                "Favorite not found",
                "Check the job ID and image index, or use favorites.list",
            ),
            ErrorCode::FavoriteAlreadyExists => (
                "Image is already in favorites",
                "Use favorites.list to see your current favorites",
            ),
            ErrorCode::ModelUnavailable => (
                "Selected model is not currently available",
                "Try a different model or wait and retry",
            ),
            ErrorCode::ModelNotFound => (
                "Model not found",
                "Use model.list to see available models",
            ),
            ErrorCode::GenerationFailed => (
                "Image generation failed",
                "Try with a different prompt or model",
            ),
            ErrorCode::GenerationTimeout => (
                "Generation timed out",
                "Try with 'draft' quality for faster results",
            ),
            ErrorCode::RateLimited => ("Too many requests", "Wait a moment and try again"),
            ErrorCode::InternalError => (
                "An internal error occurred",
                "Please try again or report this issue",
            ),
            ErrorCode::ServiceUnavailable => (
                "Service is temporarily unavailable",
                "Please try again in a few moments",
            ),
        };
        ErrorTemplate {
            message,
            suggestion,
        }
    }

    /// Error class used by transports to pick a status code.
    pub fn class(self) -> ErrorClass {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::PromptEmpty
            | ErrorCode::PromptTooLong
            | ErrorCode::InvalidCount => ErrorClass::Validation,
            ErrorCode::JobNotFound | ErrorCode::ModelNotFound | ErrorCode::FavoriteNotFound => {
                ErrorClass::NotFound
            }
            ErrorCode::JobAlreadyComplete
            | ErrorCode::JobAlreadyCancelled
            | ErrorCode::JobAlreadyFailed
            | ErrorCode::FavoriteAlreadyExists => ErrorClass::Conflict,
            ErrorCode::ModelUnavailable
            | ErrorCode::GenerationFailed
            | ErrorCode::GenerationTimeout
            | ErrorCode::ServiceUnavailable => ErrorClass::Backend,
            ErrorCode::RateLimited => ErrorClass::RateLimited,
            ErrorCode::InternalError => ErrorClass::Internal,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Conflict,
    Backend,
    RateLimited,
    Internal,
}

/// Failures raised by job and favorite stores and the lifecycle engine.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {id} is already {status}")]
    AlreadyTerminal { id: String, status: JobStatus },

    #[error("job {id} is still {status}")]
    StillActive { id: String, status: JobStatus },

    #[error("rejected update for job {id}: {reason}")]
    Rejected { id: String, reason: String },

    #[error("image {image_index} of job {job_id} is already a favorite")]
    FavoriteExists { job_id: String, image_index: u32 },

    #[error("job {0} kept changing underneath the update")]
    Contended(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    pub fn code(&self) -> ErrorCode {
        match self {
            JobError::NotFound(_) => ErrorCode::JobNotFound,
            JobError::AlreadyTerminal { status, .. } => match status {
                JobStatus::Cancelled => ErrorCode::JobAlreadyCancelled,
                JobStatus::Failed => ErrorCode::JobAlreadyFailed,
                _ => ErrorCode::JobAlreadyComplete,
            },
            JobError::StillActive { .. } => ErrorCode::ValidationError,
            JobError::FavoriteExists { .. } => ErrorCode::FavoriteAlreadyExists,
            _ => ErrorCode::InternalError,
        }
    }
}
