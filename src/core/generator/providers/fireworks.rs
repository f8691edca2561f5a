use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use super::{image_filename, random_seed, remove_job_images, store_image, truncate_body};
use crate::core::generator::{
    BackendKind, BackendStatus, GenerationFailure, GenerationRequest, ImageGenerator,
    ProgressSink,
};
use crate::core::types::{GeneratedImage, ModelId};

const BASE_URL: &str = "https://api.fireworks.ai/inference/v1/workflows";

#[derive(Serialize)]
struct TextToImageRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    seed: u64,
}

/// Fireworks.ai FLUX workflows. HiDream has no hosted equivalent here and
/// falls back to FLUX schnell.
pub struct FireworksGenerator {
    api_key: Option<String>,
    images_dir: PathBuf,
    client: Client,
}

impl FireworksGenerator {
    pub fn new(api_key: Option<String>, images_dir: PathBuf) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            images_dir,
            client,
        }
    }

    fn model_path(model: ModelId) -> &'static str {
        match model {
            ModelId::Sd35 => "accounts/fireworks/models/flux-1-dev-fp8",
            ModelId::Flux | ModelId::Hidream => "accounts/fireworks/models/flux-1-schnell-fp8",
        }
    }
}

#[async_trait]
impl ImageGenerator for FireworksGenerator {
    fn backend(&self) -> BackendKind {
        BackendKind::Fireworks
    }

    async fn health_check(&self) -> BackendStatus {
        match &self.api_key {
            Some(_) => BackendStatus::Available,
            None => BackendStatus::NoApiKey,
        }
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<GeneratedImage>, GenerationFailure> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationFailure::MissingApiKey(BackendKind::Fireworks))?;
        let url = format!("{BASE_URL}/{}/text_to_image", Self::model_path(request.model));
        let prompt = request.full_prompt();
        let size = request.size();

        let mut images = Vec::with_capacity(request.count as usize);
        for i in 0..request.count {
            let seed = random_seed();
            let body = TextToImageRequest {
                prompt: &prompt,
                width: size,
                height: size,
                seed,
            };
            let res = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .header("Accept", "image/jpeg")
                .json(&body)
                .send()
                .await?;
            if !res.status().is_success() {
                return Err(GenerationFailure::Api {
                    backend: BackendKind::Fireworks,
                    status: res.status().as_u16(),
                    body: truncate_body(res.text().await.unwrap_or_default()),
                });
            }
            let bytes = res.bytes().await?;
            let filename = image_filename("fireworks", &request.job_id, i, seed, "jpg");
            let url = store_image(&self.images_dir, &filename, &bytes).await?;
            images.push(GeneratedImage {
                index: i,
                url,
                width: size,
                height: size,
                seed,
            });
            progress.report((i + 1) as f32 / request.count as f32).await;
        }
        Ok(images)
    }

    async fn discard(&self, job_id: &str) {
        remove_job_images(&self.images_dir, job_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generator::NoProgress;
    use crate::core::types::{AssetType, QualityPreset};

    #[tokio::test]
    async fn missing_key_reports_unhealthy_and_fails_fast() {
        let generator = FireworksGenerator::new(None, PathBuf::from("unused"));
        assert_eq!(generator.health_check().await, BackendStatus::NoApiKey);

        let request = GenerationRequest {
            job_id: "j".into(),
            prompt: "cloud".into(),
            asset_type: AssetType::Logo,
            model: ModelId::Flux,
            quality: QualityPreset::Draft,
            count: 1,
        };
        let err = generator.generate(&request, &NoProgress).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationFailure::MissingApiKey(BackendKind::Fireworks)
        ));
    }

    #[test]
    fn hidream_falls_back_to_schnell() {
        assert_eq!(
            FireworksGenerator::model_path(ModelId::Hidream),
            FireworksGenerator::model_path(ModelId::Flux)
        );
    }
}
