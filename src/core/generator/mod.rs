pub mod providers;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{AssetType, GeneratedImage, ModelId, QualityPreset};

pub use registry::build_generator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Mock,
    Fireworks,
    Huggingface,
    Replicate,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Mock,
        BackendKind::Fireworks,
        BackendKind::Huggingface,
        BackendKind::Replicate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Mock => "mock",
            BackendKind::Fireworks => "fireworks",
            BackendKind::Huggingface => "huggingface",
            BackendKind::Replicate => "replicate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(BackendKind::Mock),
            "fireworks" => Some(BackendKind::Fireworks),
            "huggingface" | "hf" => Some(BackendKind::Huggingface),
            "replicate" => Some(BackendKind::Replicate),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum BackendStatus {
    Available,
    NoApiKey,
    Unavailable(String),
}

impl BackendStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, BackendStatus::Available)
    }

    pub fn describe(&self) -> String {
        match self {
            BackendStatus::Available => "available".to_string(),
            BackendStatus::NoApiKey => "missing API key".to_string(),
            BackendStatus::Unavailable(reason) => format!("unavailable ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub job_id: String,
    pub prompt: String,
    pub asset_type: AssetType,
    pub model: ModelId,
    pub quality: QualityPreset,
    pub count: u32,
}

impl GenerationRequest {
    pub fn full_prompt(&self) -> String {
        self.asset_type.render_prompt(&self.prompt)
    }

    pub fn negative_prompt(&self) -> String {
        self.asset_type.info().negative_prompt
    }

    pub fn size(&self) -> u32 {
        self.quality.info().width
    }
}

#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("{backend} API error ({status}): {body}")]
    Api {
        backend: BackendKind,
        status: u16,
        body: String,
    },
    #[error("{0} API key is not configured")]
    MissingApiKey(BackendKind),
    #[error("unexpected response from {backend}: {reason}")]
    InvalidResponse {
        backend: BackendKind,
        reason: String,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not store image: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Backend(String),
}

/// Receives fractional progress in `[0, 1]` while a batch is produced.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, fraction: f32);
}

/// Sink for callers that do not track progress.
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _fraction: f32) {}
}

/// An image backend. Implementations do not retry; the engine owns that policy.
/// Dropping the returned future must abandon the in-flight work.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn backend(&self) -> BackendKind;

    async fn health_check(&self) -> BackendStatus;

    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<GeneratedImage>, GenerationFailure>;

    /// Drops anything stored for `job_id`. Called when a batch will never be
    /// delivered and when a finished job is deleted.
    async fn discard(&self, _job_id: &str) {}
}
