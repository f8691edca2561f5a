use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use super::{image_filename, random_seed, remove_job_images, store_image, truncate_body};
use crate::core::generator::{
    BackendKind, BackendStatus, GenerationFailure, GenerationRequest, ImageGenerator,
    ProgressSink,
};
use crate::core::types::{GeneratedImage, ModelId, QualityPreset};

const API_URL: &str = "https://api.replicate.com/v1";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

pub struct ReplicateGenerator {
    token: Option<String>,
    images_dir: PathBuf,
    client: Client,
}

impl ReplicateGenerator {
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

    fn model_ref(model: ModelId) -> &'static str {
        match model {
            ModelId::Hidream => {
                "mcai/hidream-i1-full:50c0e2241017e6713ab94a5f984e6b1e9646dc95ef0d60e7a3045017e7d1e33c"
            }
            ModelId::Flux => "black-forest-labs/flux-1.1-pro",
            ModelId::Sd35 => "stability-ai/stable-diffusion-3.5-large",
        }
    }

    fn steps(quality: QualityPreset) -> u32 {
        match quality {
            QualityPreset::Draft => 20,
            QualityPreset::Standard => 28,
            QualityPreset::High => 50,
        }
    }

    /// Pinned versions go through `/predictions`, official models through
    /// their own endpoint.
    fn prediction_request(model: ModelId, input: Value) -> (String, Value) {
        match Self::model_ref(model).split_once(':') {
            Some((_, version)) => (
                format!("{API_URL}/predictions"),
                serde_json::json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{API_URL}/models/{}/predictions", Self::model_ref(model)),
                serde_json::json!({ "input": input }),
            ),
        }
    }

    async fn run_prediction(&self, token: &str, url: &str, body: &Value) -> Result<Prediction, GenerationFailure> {
        let res = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Prefer", "wait")
            .json(body)
            .send()
            .await?;
        let mut prediction = Self::parse(res).await?;

        while matches!(prediction.status.as_str(), "starting" | "processing") {
            let Some(poll_url) = prediction.urls.as_ref().map(|u| u.get.clone()) else {
                break;
            };
            tokio::time::sleep(POLL_INTERVAL).await;
            let res = self
                .client
                .get(&poll_url)
                .header("Authorization", format!("Bearer {token}"))
                .send()
                .await?;
            prediction = Self::parse(res).await?;
        }

        if prediction.status != "succeeded" {
            let reason = prediction
                .error
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .unwrap_or_else(|| format!("prediction ended as {}", prediction.status));
            return Err(GenerationFailure::Backend(reason));
        }
        Ok(prediction)
    }

    async fn parse(res: reqwest::Response) -> Result<Prediction, GenerationFailure> {
        if !res.status().is_success() {
            return Err(GenerationFailure::Api {
                backend: BackendKind::Replicate,
                status: res.status().as_u16(),
                body: truncate_body(res.text().await.unwrap_or_default()),
            });
        }
        Ok(res.json().await?)
    }

    /// Replicate answers with a url, a list of urls, or inline data urls.
    fn first_output(output: &Value) -> Option<String> {
        match output {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }

    async fn materialize(
        &self,
        output: String,
        job_id: &str,
        index: u32,
        seed: u64,
    ) -> Result<String, GenerationFailure> {
        let Some(rest) = output.strip_prefix("data:") else {
            return Ok(output);
        };
        let (meta, payload) = rest.split_once(',').ok_or_else(|| GenerationFailure::InvalidResponse {
            backend: BackendKind::Replicate,
            reason: "malformed data url".to_string(),
        })?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| GenerationFailure::InvalidResponse {
                backend: BackendKind::Replicate,
                reason: format!("bad base64 payload: {e}"),
            })?;
        let ext = if meta.contains("jpeg") {
            "jpg"
        } else if meta.contains("webp") {
            "webp"
        } else {
            "png"
        };
        let filename = image_filename("replicate", job_id, index, seed, ext);
        Ok(store_image(&self.images_dir, &filename, &bytes).await?)
    }
}

#[async_trait]
impl ImageGenerator for ReplicateGenerator {
    fn backend(&self) -> BackendKind {
        BackendKind::Replicate
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
            .ok_or(GenerationFailure::MissingApiKey(BackendKind::Replicate))?;
        let prompt = request.full_prompt();
        let negative = request.negative_prompt();

        let mut images = Vec::with_capacity(request.count as usize);
        for i in 0..request.count {
            let seed = random_seed();
            let input = serde_json::json!({
                "prompt": prompt,
                "negative_prompt": negative,
                "num_inference_steps": Self::steps(request.quality),
                "width": 1024,
                "height": 1024,
                "seed": seed,
            });
            let (url, body) = Self::prediction_request(request.model, input);
            let prediction = self.run_prediction(token, &url, &body).await?;
            let output = Self::first_output(&prediction.output).ok_or_else(|| {
                GenerationFailure::InvalidResponse {
                    backend: BackendKind::Replicate,
                    reason: "prediction returned no image".to_string(),
                }
            })?;
            let url = self.materialize(output, &request.job_id, i, seed).await?;
            images.push(GeneratedImage {
                index: i,
                url,
                width: 1024,
                height: 1024,
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
