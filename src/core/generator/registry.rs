use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::providers::{
    FireworksGenerator, HuggingFaceGenerator, MockGenerator, ReplicateGenerator,
};
use super::{BackendKind, ImageGenerator};
use crate::core::config::NoisettConfig;

/// Static description of a selectable backend.
#[derive(Debug, Clone, Copy)]
pub struct BackendDef {
    pub kind: BackendKind,
    pub name: &'static str,
    pub env_key: Option<&'static str>,
    pub signup_url: Option<&'static str>,
}

pub const BACKENDS: [BackendDef; 4] = [
    BackendDef {
        kind: BackendKind::Mock,
        name: "Mock (placeholder images)",
        env_key: None,
        signup_url: None,
    },
    BackendDef {
        kind: BackendKind::Fireworks,
        name: "Fireworks.ai",
        env_key: Some("FIREWORKS_API_KEY"),
        signup_url: Some("https://fireworks.ai/account/api-keys"),
    },
    BackendDef {
        kind: BackendKind::Huggingface,
        name: "Hugging Face Inference",
        env_key: Some("HF_TOKEN"),
        signup_url: Some("https://huggingface.co/settings/tokens"),
    },
    BackendDef {
        kind: BackendKind::Replicate,
        name: "Replicate",
        env_key: Some("REPLICATE_API_TOKEN"),
        signup_url: Some("https://replicate.com/account/api-tokens"),
    },
];

pub fn backend_def(kind: BackendKind) -> &'static BackendDef {
    BACKENDS
        .iter()
        .find(|d| d.kind == kind)
        .unwrap_or(&BACKENDS[0])
}

/// Resolves the configured backend once, at startup.
pub fn build_generator(config: &NoisettConfig) -> Arc<dyn ImageGenerator> {
    let images_dir = config.images_dir();
    let generator: Arc<dyn ImageGenerator> = match config.backend {
        BackendKind::Mock => Arc::new(MockGenerator::new(Duration::from_millis(
            config.mock_delay_ms,
        ))),
        BackendKind::Fireworks => Arc::new(FireworksGenerator::new(
            config.fireworks_api_key.clone(),
            images_dir,
        )),
        BackendKind::Huggingface => {
            Arc::new(HuggingFaceGenerator::new(config.hf_token.clone(), images_dir))
        }
        BackendKind::Replicate => Arc::new(ReplicateGenerator::new(
            config.replicate_api_token.clone(),
            images_dir,
        )),
    };
    info!(
        "Registered image backend: {}",
        backend_def(generator.backend()).name
    );
    generator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generator::BackendStatus;

    #[test]
    fn every_kind_has_a_definition() {
        for kind in BackendKind::ALL {
            assert_eq!(backend_def(kind).kind, kind);
        }
    }

    #[tokio::test]
    async fn selector_picks_the_backend() {
        let mut config = NoisettConfig::default();
        config.backend = BackendKind::Replicate;
        let generator = build_generator(&config);
        assert_eq!(generator.backend(), BackendKind::Replicate);
        assert_eq!(generator.health_check().await, BackendStatus::NoApiKey);

        config.backend = BackendKind::Mock;
        assert_eq!(build_generator(&config).backend(), BackendKind::Mock);
    }
}
