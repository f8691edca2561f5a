use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{ErrorCode, JobError};
use crate::core::generator::ImageGenerator;
use crate::core::generator::providers::MockGenerator;
use crate::core::generator::testing::{
    DiskBehavior, DiskGenerator, GatedGenerator, ScriptedGenerator,
};
use crate::core::jobs::{EngineSettings, JobEngine};
use crate::core::store::{InMemoryJobStore, JobStore, SqliteJobStore};
use crate::core::types::{AssetType, Job, JobStatus, ModelId, NewJob, QualityPreset};

const SETTLE: Duration = Duration::from_secs(5);

fn settings(max_concurrent_jobs: usize, job_timeout: Duration) -> EngineSettings {
    EngineSettings {
        job_timeout,
        max_concurrent_jobs,
        poll_interval: Duration::from_millis(5),
    }
}

fn engine_with(generator: Arc<dyn ImageGenerator>, settings: EngineSettings) -> JobEngine {
    JobEngine::new(Arc::new(InMemoryJobStore::new()), generator, settings)
}

fn request(prompt: &str, count: u32) -> NewJob {
    NewJob {
        prompt: prompt.to_string(),
        asset_type: AssetType::Icons,
        model: ModelId::Hidream,
        quality: QualityPreset::Standard,
        count,
        user_id: "ana".to_string(),
    }
}

async fn until(engine: &JobEngine, id: &str, pred: impl Fn(&Job) -> bool) -> Job {
    for _ in 0..1000 {
        let job = engine.get(id).await.unwrap();
        if pred(&job) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {id} never reached the expected state");
}

#[tokio::test]
async fn generated_job_completes_with_all_images() {
    let engine = engine_with(
        Arc::new(MockGenerator::instant()),
        settings(2, Duration::from_secs(5)),
    );
    let job = engine.submit(request("cloud icon", 4)).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    let done = engine.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(done.status, JobStatus::Complete);
    assert_eq!(done.images.len(), 4);
    assert_eq!(done.progress, 100.0);
    assert!(done.started_at.is_some() && done.completed_at.is_some());
    assert!(done.started_at <= done.completed_at);
}

#[tokio::test]
async fn cancel_mid_processing_sticks_after_late_result() {
    let generator = Arc::new(GatedGenerator::new());
    let engine = engine_with(generator.clone(), settings(1, Duration::from_secs(5)));
    let job = engine.submit(request("cloud", 2)).await.unwrap();

    generator.started.notified().await;
    until(&engine, &job.id, |j| j.status == JobStatus::Processing).await;

    let cancelled = engine.cancel(&job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    generator.release(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = engine.get(&job.id).await.unwrap();
    assert_eq!(after.status, JobStatus::Cancelled);
    assert!(after.images.is_empty());
    assert!(after.progress < 100.0);
}

#[tokio::test]
async fn cancelling_a_queued_job_skips_processing() {
    let generator = Arc::new(GatedGenerator::new());
    let engine = engine_with(generator.clone(), settings(1, Duration::from_secs(5)));
    let blocker = engine.submit(request("first", 1)).await.unwrap();
    generator.started.notified().await;

    let waiting = engine.submit(request("second", 1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        engine.get(&waiting.id).await.unwrap().status,
        JobStatus::Queued
    );

    let cancelled = engine.cancel(&waiting.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.started_at.is_none());

    generator.release(2);
    let first = engine.wait(&blocker.id, SETTLE).await.unwrap();
    assert_eq!(first.status, JobStatus::Complete);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = engine.get(&waiting.id).await.unwrap();
    assert_eq!(second.status, JobStatus::Cancelled);
    assert!(second.started_at.is_none());
    assert_eq!(generator.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn adapter_failure_fails_the_job() {
    let engine = engine_with(
        Arc::new(ScriptedGenerator::Fails("GPU out of memory")),
        settings(1, Duration::from_secs(5)),
    );
    let job = engine.submit(request("cloud", 3)).await.unwrap();
    let failed = engine.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error_message.as_deref().unwrap().contains("GPU out of memory"));
    assert_eq!(failed.error_code, Some(ErrorCode::GenerationFailed));
    assert!(failed.images.is_empty());
}

#[tokio::test]
async fn stuck_generation_times_out() {
    let engine = engine_with(
        Arc::new(ScriptedGenerator::Sleeps(Duration::from_secs(30))),
        settings(1, Duration::from_millis(50)),
    );
    let job = engine.submit(request("cloud", 1)).await.unwrap();
    let failed = engine.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_code, Some(ErrorCode::GenerationTimeout));
    assert!(failed.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn wrong_image_count_is_a_failure() {
    let engine = engine_with(
        Arc::new(ScriptedGenerator::ReturnsCount(1)),
        settings(1, Duration::from_secs(5)),
    );
    let job = engine.submit(request("cloud", 3)).await.unwrap();
    let failed = engine.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.images.is_empty());
    assert_eq!(
        failed.error_message.as_deref(),
        Some("Backend returned 1 images, expected 3")
    );
}

#[tokio::test]
async fn crashing_backend_fails_without_leaking_details() {
    let engine = engine_with(
        Arc::new(ScriptedGenerator::Panics),
        settings(1, Duration::from_secs(5)),
    );
    let job = engine.submit(request("cloud", 1)).await.unwrap();
    let failed = engine.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("Internal error while generating images")
    );
}

#[tokio::test]
async fn cancelling_a_complete_job_is_rejected_and_harmless() {
    let engine = engine_with(
        Arc::new(MockGenerator::instant()),
        settings(1, Duration::from_secs(5)),
    );
    let job = engine.submit(request("cloud", 2)).await.unwrap();
    let done = engine.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(done.status, JobStatus::Complete);

    let err = engine.cancel(&job.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::JobAlreadyComplete);
    assert_eq!(engine.get(&job.id).await.unwrap(), done);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let engine = engine_with(
        Arc::new(MockGenerator::instant()),
        settings(1, Duration::from_secs(5)),
    );
    assert!(matches!(
        engine.cancel("nope").await,
        Err(JobError::NotFound(_))
    ));
    assert!(matches!(
        engine.wait("nope", SETTLE).await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn worker_pool_bounds_processing_jobs() {
    let generator = Arc::new(GatedGenerator::new());
    let engine = engine_with(generator.clone(), settings(2, Duration::from_secs(5)));
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(engine.submit(request(&format!("job {i}"), 1)).await.unwrap().id);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut processing = 0;
    for id in &ids {
        if engine.get(id).await.unwrap().status == JobStatus::Processing {
            processing += 1;
        }
    }
    assert_eq!(processing, 2);

    generator.release(4);
    for id in &ids {
        assert_eq!(
            engine.wait(id, SETTLE).await.unwrap().status,
            JobStatus::Complete
        );
    }
}

#[tokio::test]
async fn pollers_never_observe_regressions() {
    let engine = engine_with(
        Arc::new(MockGenerator::new(Duration::from_millis(15))),
        settings(1, Duration::from_secs(5)),
    );
    let job = engine.submit(request("cloud", 4)).await.unwrap();

    let rank = |s: JobStatus| match s {
        JobStatus::Queued => 0,
        JobStatus::Processing => 1,
        _ => 2,
    };
    let mut last_rank = 0;
    let mut last_progress = 0.0f32;
    loop {
        let seen = engine.get(&job.id).await.unwrap();
        assert!(rank(seen.status) >= last_rank, "status regressed");
        assert!(seen.progress >= last_progress, "progress decreased");
        if seen.status != JobStatus::Complete {
            assert!(seen.progress < 100.0);
            assert!(seen.images.is_empty());
        }
        last_rank = rank(seen.status);
        last_progress = seen.progress;
        if seen.is_terminal() {
            assert_eq!(seen.status, JobStatus::Complete);
            break;
        }
        tokio::time::sleep(Duration::from_millis(3)).await;
    }
}

#[tokio::test]
async fn wait_returns_current_state_at_deadline() {
    let generator = Arc::new(GatedGenerator::new());
    let engine = engine_with(generator.clone(), settings(1, Duration::from_secs(5)));
    let job = engine.submit(request("cloud", 1)).await.unwrap();
    let seen = engine
        .wait(&job.id, Duration::from_millis(30))
        .await
        .unwrap();
    assert!(!seen.is_terminal());
    generator.release(1);
}

#[tokio::test]
async fn recovery_requeues_waiting_jobs_and_fails_interrupted_ones() {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let waiting = store.create(request("left queued", 1)).await.unwrap();
    let interrupted = store.create(request("left processing", 1)).await.unwrap();
    store
        .update(&interrupted.id, &|mut j: Job| {
            j.status = JobStatus::Processing;
            j.started_at = Some(chrono::Utc::now() - chrono::Duration::hours(1));
            Ok(j)
        })
        .await
        .unwrap();

    let engine = JobEngine::new(
        store.clone(),
        Arc::new(MockGenerator::instant()),
        settings(1, Duration::from_secs(5)),
    );
    assert_eq!(engine.recover_interrupted().await.unwrap(), 2);

    let failed = store.get(&interrupted.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("Job interrupted before completion")
    );
    let done = engine.wait(&waiting.id, SETTLE).await.unwrap();
    assert_eq!(done.status, JobStatus::Complete);
}

#[tokio::test]
async fn recovery_leaves_jobs_another_process_is_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.db");
    let generator = Arc::new(GatedGenerator::new());
    let first = JobEngine::new(
        Arc::new(SqliteJobStore::open(&path).await.unwrap()),
        generator.clone(),
        settings(1, Duration::from_secs(5)),
    );
    let job = first.submit(request("cloud", 2)).await.unwrap();
    generator.started.notified().await;
    until(&first, &job.id, |j| j.status == JobStatus::Processing).await;

    let second = JobEngine::new(
        Arc::new(SqliteJobStore::open(&path).await.unwrap()),
        Arc::new(MockGenerator::instant()),
        settings(1, Duration::from_secs(5)),
    );
    assert_eq!(second.recover_interrupted().await.unwrap(), 0);
    assert_eq!(
        second.get(&job.id).await.unwrap().status,
        JobStatus::Processing
    );

    generator.release(1);
    let done = first.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(done.status, JobStatus::Complete);
    assert_eq!(done.images.len(), 2);
}

#[tokio::test]
async fn recent_orphans_fail_once_their_deadline_passes() {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let orphan = store.create(request("left processing", 1)).await.unwrap();
    store
        .update(&orphan.id, &|mut j: Job| {
            j.status = JobStatus::Processing;
            j.started_at = Some(chrono::Utc::now());
            Ok(j)
        })
        .await
        .unwrap();

    let engine = JobEngine::new(
        store.clone(),
        Arc::new(MockGenerator::instant()),
        settings(1, Duration::from_millis(50)),
    );
    assert_eq!(engine.recover_interrupted().await.unwrap(), 0);
    assert_eq!(
        store.get(&orphan.id).await.unwrap().status,
        JobStatus::Processing
    );

    let failed = until(&engine, &orphan.id, |j| j.is_terminal()).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("Job interrupted before completion")
    );
}

#[tokio::test]
async fn failed_batches_leave_no_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(DiskGenerator {
        dir: dir.path().to_path_buf(),
        behavior: DiskBehavior::FailsAfterFirst,
    });
    let engine = engine_with(generator.clone(), settings(1, Duration::from_secs(5)));
    let job = engine.submit(request("cloud", 3)).await.unwrap();
    let failed = engine.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(generator.files_for(&job.id), 0);

    let generator = Arc::new(DiskGenerator {
        dir: dir.path().to_path_buf(),
        behavior: DiskBehavior::StallsAfterFirst,
    });
    let engine = engine_with(generator.clone(), settings(1, Duration::from_millis(100)));
    let job = engine.submit(request("cloud", 3)).await.unwrap();
    let timed_out = engine.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(timed_out.error_code, Some(ErrorCode::GenerationTimeout));
    assert_eq!(generator.files_for(&job.id), 0);
}

#[tokio::test]
async fn cancelled_and_deleted_jobs_lose_their_files() {
    let dir = tempfile::tempdir().unwrap();
    let stalled = Arc::new(DiskGenerator {
        dir: dir.path().to_path_buf(),
        behavior: DiskBehavior::StallsAfterFirst,
    });
    let engine = engine_with(stalled.clone(), settings(1, Duration::from_secs(5)));
    let job = engine.submit(request("cloud", 2)).await.unwrap();
    for _ in 0..1000 {
        if stalled.files_for(&job.id) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(stalled.files_for(&job.id), 1);
    engine.cancel(&job.id).await.unwrap();
    for _ in 0..1000 {
        if stalled.files_for(&job.id) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(stalled.files_for(&job.id), 0);

    let finishing = Arc::new(DiskGenerator {
        dir: dir.path().to_path_buf(),
        behavior: DiskBehavior::Finishes,
    });
    let engine = engine_with(finishing.clone(), settings(1, Duration::from_secs(5)));
    let job = engine.submit(request("cloud", 2)).await.unwrap();
    let done = engine.wait(&job.id, SETTLE).await.unwrap();
    assert_eq!(done.status, JobStatus::Complete);
    assert_eq!(finishing.files_for(&job.id), 2);
    engine.delete(&job.id).await.unwrap();
    assert_eq!(finishing.files_for(&job.id), 0);
}

#[tokio::test]
async fn shutdown_fails_in_flight_jobs() {
    let generator = Arc::new(GatedGenerator::new());
    let engine = engine_with(generator.clone(), settings(1, Duration::from_secs(5)));
    let job = engine.submit(request("cloud", 1)).await.unwrap();
    generator.started.notified().await;
    until(&engine, &job.id, |j| j.status == JobStatus::Processing).await;

    engine.shutdown().await;
    let stopped = engine.get(&job.id).await.unwrap();
    assert_eq!(stopped.status, JobStatus::Failed);
    assert_eq!(
        stopped.error_message.as_deref(),
        Some("Job interrupted by server shutdown")
    );
}

#[tokio::test]
async fn delete_requires_a_finished_job() {
    let generator = Arc::new(GatedGenerator::new());
    let engine = engine_with(generator.clone(), settings(1, Duration::from_secs(5)));
    let job = engine.submit(request("cloud", 1)).await.unwrap();
    assert!(matches!(
        engine.delete(&job.id).await,
        Err(JobError::StillActive { .. })
    ));

    generator.release(1);
    engine.wait(&job.id, SETTLE).await.unwrap();
    engine.delete(&job.id).await.unwrap();
    assert!(matches!(
        engine.get(&job.id).await,
        Err(JobError::NotFound(_))
    ));
}
