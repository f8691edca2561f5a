use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::ErrorCode;

pub const MAX_PROMPT_CHARS: usize = 500;
pub const MIN_IMAGE_COUNT: u32 = 1;
pub const MAX_IMAGE_COUNT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Icons,
    #[default]
    Product,
    Logo,
    Premium,
}

impl AssetType {
    pub const ALL: [AssetType; 4] = [
        AssetType::Icons,
        AssetType::Product,
        AssetType::Logo,
        AssetType::Premium,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Icons => "icons",
            AssetType::Product => "product",
            AssetType::Logo => "logo",
            AssetType::Premium => "premium",
        }
    }

    pub fn info(self) -> AssetTypeInfo {
        let (name, description, prompt_template, negative_prompt, recommended_for): (
            &str,
            &str,
            &str,
            &str,
            &[&str],
        ) = match self {
            AssetType::Icons => (
                "Icons (Fluent 2)",
                "Minimal vector-style icons for UI",
                "{subject}, Fluent 2 design icon, minimal vector style, simple shapes, clean lines, professional UI icon",
                "photorealistic, 3d render, complex, detailed background, shadows",
                &["UI elements", "app icons", "buttons", "navigation"],
            ),
            AssetType::Product => (
                "Product Illustrations",
                "Clean illustrations for product pages and documentation",
                "{subject}, product illustration style, clean modern design, soft gradients, professional, brand-aligned",
                "cluttered, amateur, stock photo, watermark, text",
                &["documentation", "product pages", "feature callouts", "diagrams"],
            ),
            AssetType::Logo => (
                "Logo Illustrations",
                "Simple iconic illustrations for branding",
                "{subject}, simple iconic illustration, minimal design, memorable, scalable, brand-friendly",
                "complex, detailed, photorealistic, busy background",
                &["app tiles", "feature icons", "badges", "small graphics"],
            ),
            AssetType::Premium => (
                "Premium Illustrations",
                "Rich marketing-grade illustrations",
                "{subject}, premium editorial illustration, high quality, detailed, professional marketing art, rich colors",
                "amateur, stock photo, generic, watermark, low quality",
                &["marketing", "hero images", "campaigns", "presentations"],
            ),
        };
        AssetTypeInfo {
            id: self,
            name: name.to_string(),
            description: description.to_string(),
            prompt_template: prompt_template.to_string(),
            negative_prompt: negative_prompt.to_string(),
            recommended_for: recommended_for.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Expands the asset type's template around the user's subject.
    pub fn render_prompt(self, subject: &str) -> String {
        self.info().prompt_template.replace("{subject}", subject.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetTypeInfo {
    pub id: AssetType,
    pub name: String,
    pub description: String,
    pub prompt_template: String,
    pub negative_prompt: String,
    pub recommended_for: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    #[default]
    Hidream,
    Flux,
    Sd35,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [ModelId::Hidream, ModelId::Flux, ModelId::Sd35];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::Hidream => "hidream",
            ModelId::Flux => "flux",
            ModelId::Sd35 => "sd35",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn info(self) -> ModelInfo {
        match self {
            ModelId::Hidream => ModelInfo {
                id: self,
                name: "HiDream-I1".to_string(),
                description: "High-quality image generation model with commercial license"
                    .to_string(),
                license: "Apache-2.0".to_string(),
                commercial_ok: true,
                available: true,
                default_steps: 28,
                default_guidance: 5.0,
            },
            ModelId::Flux => ModelInfo {
                id: self,
                name: "FLUX.1-dev".to_string(),
                description: "State-of-the-art image generation (non-commercial)".to_string(),
                license: "FLUX.1-dev Non-Commercial License".to_string(),
                commercial_ok: false,
                available: true,
                default_steps: 30,
                default_guidance: 3.5,
            },
            ModelId::Sd35 => ModelInfo {
                id: self,
                name: "Stable Diffusion 3.5".to_string(),
                description: "Stable Diffusion with improved quality".to_string(),
                license: "Stability AI Community License".to_string(),
                commercial_ok: true,
                available: false,
                default_steps: 28,
                default_guidance: 7.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: ModelId,
    pub name: String,
    pub description: String,
    pub license: String,
    pub commercial_ok: bool,
    pub available: bool,
    pub default_steps: u32,
    pub default_guidance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Draft,
    #[default]
    Standard,
    High,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 3] = [
        QualityPreset::Draft,
        QualityPreset::Standard,
        QualityPreset::High,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QualityPreset::Draft => "draft",
            QualityPreset::Standard => "standard",
            QualityPreset::High => "high",
        }
    }

    pub fn info(self) -> QualityPresetInfo {
        let (steps, size, use_upscaler, description, estimated_seconds) = match self {
            QualityPreset::Draft => (4, 512, false, "Quick ideation, lower quality", 2),
            QualityPreset::Standard => (8, 1024, false, "Balanced quality for most use cases", 5),
            QualityPreset::High => (12, 1024, true, "Higher quality with upscaling", 10),
        };
        QualityPresetInfo {
            name: self,
            steps,
            width: size,
            height: size,
            use_refiner: false,
            use_upscaler,
            description: description.to_string(),
            estimated_seconds,
        }
    }

    /// Queue-inclusive estimate for a single image, used by `asset.generate`.
    pub fn base_job_seconds(self) -> u32 {
        match self {
            QualityPreset::Draft => 10,
            QualityPreset::Standard => 20,
            QualityPreset::High => 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityPresetInfo {
    pub name: QualityPreset,
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub use_refiner: bool,
    pub use_upscaler: bool,
    pub description: String,
    pub estimated_seconds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "complete" => Some(JobStatus::Complete),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedImage {
    pub index: u32,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
}

/// Parameters fixed at creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub prompt: String,
    pub asset_type: AssetType,
    pub model: ModelId,
    pub quality: QualityPreset,
    pub count: u32,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub prompt: String,
    pub asset_type: AssetType,
    pub model: ModelId,
    pub quality: QualityPreset,
    pub count: u32,
    pub progress: f32,
    pub images: Vec<GeneratedImage>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_code: Option<ErrorCode>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub user_id: String,
}

impl Job {
    pub fn queued(new: NewJob) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            prompt: new.prompt,
            asset_type: new.asset_type,
            model: new.model,
            quality: new.quality,
            count: new.count,
            progress: 0.0,
            images: Vec::new(),
            error_message: None,
            error_code: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            user_id: new.user_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Filter for `JobStore::list`. `user_id: None` spans every owner.
#[derive(Debug, Clone, PartialEq)]
pub struct JobQuery {
    pub user_id: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl JobQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            status: None,
            limit: 20,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: usize,
}

/// One image from a finished job that its owner bookmarked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Favorite {
    pub user_id: String,
    pub job_id: String,
    pub image_index: u32,
    pub image_url: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl Favorite {
    /// Bookmarks `images[index]` of `job`. `None` when the job has no such image.
    pub fn of(job: &Job, index: u32) -> Option<Self> {
        let image = job.images.iter().find(|image| image.index == index)?;
        Some(Self {
            user_id: job.user_id.clone(),
            job_id: job.id.clone(),
            image_index: index,
            image_url: image.url.clone(),
            prompt: job.prompt.clone(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FavoritePage {
    pub favorites: Vec<Favorite>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(AssetType::Premium).unwrap(),
            serde_json::json!("premium")
        );
        assert_eq!(
            serde_json::to_value(ModelId::Sd35).unwrap(),
            serde_json::json!("sd35")
        );
        assert_eq!(
            serde_json::to_value(JobStatus::Cancelled).unwrap(),
            serde_json::json!("cancelled")
        );
    }

    #[test]
    fn defaults_follow_catalog() {
        assert_eq!(AssetType::default(), AssetType::Product);
        assert_eq!(ModelId::default(), ModelId::Hidream);
        assert_eq!(QualityPreset::default(), QualityPreset::Standard);
    }

    #[test]
    fn render_prompt_fills_subject() {
        let prompt = AssetType::Icons.render_prompt("  cloud ");
        assert!(prompt.starts_with("cloud, Fluent 2 design icon"));
    }

    #[test]
    fn only_sd35_is_unavailable() {
        for model in ModelId::ALL {
            assert_eq!(model.info().available, model != ModelId::Sd35);
        }
        assert!(!ModelId::Flux.info().commercial_ok);
    }

    #[test]
    fn model_parse_is_case_insensitive() {
        assert_eq!(ModelId::parse("FLUX"), Some(ModelId::Flux));
        assert_eq!(ModelId::parse("dalle"), None);
    }

    #[test]
    fn queued_job_starts_empty() {
        let job = Job::queued(NewJob {
            prompt: "cloud icon".into(),
            asset_type: AssetType::Icons,
            model: ModelId::Hidream,
            quality: QualityPreset::Draft,
            count: 2,
            user_id: "ana".into(),
        });
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
        assert!(job.images.is_empty());
        assert!(job.started_at.is_none() && job.completed_at.is_none());
        assert!(uuid::Uuid::parse_str(&job.id).is_ok());
    }
}
