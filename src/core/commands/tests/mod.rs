mod catalog;

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{Caller, CommandContext, RateLimiter, Surface, dispatch};
use crate::core::generator::ImageGenerator;
use crate::core::generator::providers::MockGenerator;
use crate::core::jobs::{EngineSettings, JobEngine};
use crate::core::result::CommandResult;
use crate::core::store::{InMemoryJobStore, JobStore};

pub(super) fn context_with(generator: Arc<dyn ImageGenerator>, per_minute: u32) -> CommandContext {
    context_on(Arc::new(InMemoryJobStore::new()), generator, per_minute)
}

pub(super) fn context_on(
    store: Arc<dyn JobStore>,
    generator: Arc<dyn ImageGenerator>,
    per_minute: u32,
) -> CommandContext {
    let engine = JobEngine::new(
        store,
        generator,
        EngineSettings {
            job_timeout: Duration::from_secs(5),
            max_concurrent_jobs: 2,
            poll_interval: Duration::from_millis(5),
        },
    );
    CommandContext::new(
        engine,
        Arc::new(InMemoryJobStore::new()),
        RateLimiter::new(per_minute),
    )
}

pub(super) fn context() -> CommandContext {
    context_with(Arc::new(MockGenerator::instant()), 0)
}

pub(super) fn ana() -> Caller {
    Caller::new("ana", Surface::Cli)
}

pub(super) async fn run(
    ctx: &CommandContext,
    command: &str,
    input: Value,
    caller: &Caller,
) -> CommandResult<Value> {
    let result = dispatch(ctx, command, input, caller).await;
    assert_eq!(
        result.success,
        result.data.is_some() && result.error.is_none(),
        "exactly one of data/error must be set: {:?}",
        result
    );
    result
}

pub(super) fn code(result: &CommandResult<Value>) -> &'static str {
    result.error_code().map(|c| c.as_str()).unwrap_or("OK")
}
