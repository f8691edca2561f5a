use async_trait::async_trait;
use std::time::Duration;

use super::random_seed;
use crate::core::generator::{
    BackendKind, BackendStatus, GenerationFailure, GenerationRequest, ImageGenerator,
    ProgressSink,
};
use crate::core::types::GeneratedImage;

const PLACEHOLDER_URLS: [&str; 4] = [
    "https://placehold.co/1024x1024/107C10/white?text=Generated+1",
    "https://placehold.co/1024x1024/0078D4/white?text=Generated+2",
    "https://placehold.co/1024x1024/5C2D91/white?text=Generated+3",
    "https://placehold.co/1024x1024/D83B01/white?text=Generated+4",
];

/// Placeholder backend for development and tests.
pub struct MockGenerator {
    per_image_delay: Duration,
}

impl MockGenerator {
    pub fn new(per_image_delay: Duration) -> Self {
        Self { per_image_delay }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl ImageGenerator for MockGenerator {
    fn backend(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn health_check(&self) -> BackendStatus {
        BackendStatus::Available
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<GeneratedImage>, GenerationFailure> {
        let mut images = Vec::with_capacity(request.count as usize);
        for i in 0..request.count {
            if !self.per_image_delay.is_zero() {
                tokio::time::sleep(self.per_image_delay).await;
            }
            images.push(GeneratedImage {
                index: i,
                url: PLACEHOLDER_URLS[i as usize % PLACEHOLDER_URLS.len()].to_string(),
                width: 1024,
                height: 1024,
                seed: random_seed(),
            });
            progress.report((i + 1) as f32 / request.count as f32).await;
        }
        Ok(images)
    }
}
