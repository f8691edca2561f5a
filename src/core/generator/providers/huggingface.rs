use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::time::Duration;

use super::{image_filename, random_seed, remove_job_images, store_image, truncate_body};
use crate::core::generator::{
    BackendKind, BackendStatus, GenerationFailure, GenerationRequest, ImageGenerator,
    ProgressSink,
};
use crate::core::types::{GeneratedImage, ModelId};

const BASE_URL: &str = "https://router.huggingface.co/hf-inference/models";

pub struct HuggingFaceGenerator {
    token: Option<String>,
    images_dir: PathBuf,
    client: Client,
}

impl HuggingFaceGenerator {
    pub fn new(token: Option<String>, images_dir: PathBuf) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            token,
            images_dir,
            client,
        }
    }

    fn model_path(model: ModelId) -> &'static str {
        match model {
            ModelId::Sd35 => "stabilityai/stable-diffusion-3.5-large",
            ModelId::Flux | ModelId::Hidream => "black-forest-labs/FLUX.1-schnell",
        }
    }
}

#[async_trait]
impl ImageGenerator for HuggingFaceGenerator {
    fn backend(&self) -> BackendKind {
        BackendKind::Huggingface
    }

    async fn health_check(&self) -> BackendStatus {
        match &self.token {
            Some(_) => BackendStatus::Available,
            None => BackendStatus::NoApiKey,
        }
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<GeneratedImage>, GenerationFailure> {
        let token = self
            .token
            .as_deref()
            .ok_or(GenerationFailure::MissingApiKey(BackendKind::Huggingface))?;
        let url = format!("{BASE_URL}/{}", Self::model_path(request.model));
        let body = serde_json::json!({
            "inputs": request.full_prompt(),
            "parameters": {
                "negative_prompt": request.negative_prompt(),
                "width": request.size(),
                "height": request.size(),
            }
        });

        let mut images = Vec::with_capacity(request.count as usize);
        for i in 0..request.count {
            let res = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {token}"))
                .json(&body)
                .send()
                .await?;
            if res.status() == StatusCode::SERVICE_UNAVAILABLE {
                return Err(GenerationFailure::Backend(
                    "Hugging Face model is still loading, submit the job again shortly"
                        .to_string(),
                ));
            }
            if !res.status().is_success() {
                return Err(GenerationFailure::Api {
                    backend: BackendKind::Huggingface,
                    status: res.status().as_u16(),
                    body: truncate_body(res.text().await.unwrap_or_default()),
                });
            }
            let bytes = res.bytes().await?;
            if bytes.is_empty() {
                return Err(GenerationFailure::InvalidResponse {
                    backend: BackendKind::Huggingface,
                    reason: "empty image body".to_string(),
                });
            }
            // The inference router does not echo a seed; record one for bookkeeping.
            let seed = random_seed();
            let filename = image_filename("hf", &request.job_id, i, seed, "png");
            let url = store_image(&self.images_dir, &filename, &bytes).await?;
            images.push(GeneratedImage {
                index: i,
                url,
                width: request.size(),
                height: request.size(),
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
