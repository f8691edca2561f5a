//! Controllable backends for engine and surface tests.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use super::providers::{image_filename, remove_job_images, store_image};
use super::{
    BackendKind, BackendStatus, GenerationFailure, GenerationRequest, ImageGenerator,
    ProgressSink,
};
use crate::core::types::GeneratedImage;

pub(crate) fn images(count: u32) -> Vec<GeneratedImage> {
    (0..count)
        .map(|i| GeneratedImage {
            index: i,
            url: format!("https://example.test/{i}.png"),
            width: 1024,
            height: 1024,
            seed: 42 + i as u64,
        })
        .collect()
}

/// Blocks every generation until the test releases it.
pub(crate) struct GatedGenerator {
    pub started: Arc<Notify>,
    pub calls: AtomicUsize,
    gate: Semaphore,
}

impl GatedGenerator {
    pub fn new() -> Self {
        Self {
            started: Arc::new(Notify::new()),
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }

    pub fn release(&self, generations: usize) {
        self.gate.add_permits(generations);
    }
}

#[async_trait]
impl ImageGenerator for GatedGenerator {
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        progress.report(0.25).await;
        self.started.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| GenerationFailure::Backend(e.to_string()))?;
        permit.forget();
        Ok(images(request.count))
    }
}

/// Fails, sleeps, panics or miscounts on demand.
pub(crate) enum ScriptedGenerator {
    Fails(&'static str),
    Sleeps(Duration),
    Panics,
    ReturnsCount(u32),
    Unavailable,
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    fn backend(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn health_check(&self) -> BackendStatus {
        match self {
            ScriptedGenerator::Unavailable => BackendStatus::NoApiKey,
            _ => BackendStatus::Available,
        }
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _progress: &dyn ProgressSink,
    ) -> Result<Vec<GeneratedImage>, GenerationFailure> {
        match self {
            ScriptedGenerator::Fails(reason) => Err(GenerationFailure::Backend(reason.to_string())),
            ScriptedGenerator::Sleeps(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(images(request.count))
            }
            ScriptedGenerator::Panics => panic!("backend crashed"),
            ScriptedGenerator::ReturnsCount(n) => Ok(images(*n)),
            ScriptedGenerator::Unavailable => Err(GenerationFailure::MissingApiKey(BackendKind::Mock)),
        }
    }
}

pub(crate) enum DiskBehavior {
    Finishes,
    FailsAfterFirst,
    StallsAfterFirst,
}

/// Writes real files into `dir` the way the HTTP backends do.
pub(crate) struct DiskGenerator {
    pub dir: PathBuf,
    pub behavior: DiskBehavior,
}

impl DiskGenerator {
    pub fn files_for(&self, job_id: &str) -> usize {
        let marker = format!("_{job_id}_");
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().contains(&marker))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl ImageGenerator for DiskGenerator {
    fn backend(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn health_check(&self) -> BackendStatus {
        BackendStatus::Available
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _progress: &dyn ProgressSink,
    ) -> Result<Vec<GeneratedImage>, GenerationFailure> {
        let mut stored = images(request.count);
        for image in stored.iter_mut() {
            let name = image_filename("disk", &request.job_id, image.index, image.seed, "png");
            image.url = store_image(&self.dir, &name, b"png").await?;
            match self.behavior {
                DiskBehavior::Finishes => {}
                DiskBehavior::FailsAfterFirst => {
                    return Err(GenerationFailure::Backend("second image failed".into()));
                }
                DiskBehavior::StallsAfterFirst => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        }
        Ok(stored)
    }

    async fn discard(&self, job_id: &str) {
        remove_job_images(&self.dir, job_id).await;
    }
}
