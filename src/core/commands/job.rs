use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::error;

use super::favorites::forget_job;
use super::validation::{
    DEFAULT_LIST_LIMIT, parse_input, validate_job_id, validate_limit, validate_offset,
};
use super::{Caller, CommandContext, job_error, not_found};
use crate::core::error::ErrorCode;
use crate::core::jobs::describe;
use crate::core::result::{CommandError, CommandResult};
use crate::core::types::{Job, JobQuery, JobStatus};

const DEFAULT_WAIT_SECS: u64 = 120;
const MAX_WAIT_SECS: u64 = 600;

#[derive(Debug, Deserialize)]
pub(super) struct JobIdInput {
    #[serde(default)]
    job_id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListInput {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    status_filter: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WaitInput {
    #[serde(default)]
    job_id: String,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ListOutput {
    jobs: Vec<Job>,
    total: usize,
    has_more: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct DeleteOutput {
    deleted: bool,
    job_id: String,
}

/// Loads a job the caller owns. Other users' jobs look exactly like
/// unknown ids.
pub(super) async fn owned_job(
    ctx: &CommandContext,
    job_id: &str,
    caller: &Caller,
) -> Result<Job, CommandError> {
    let job = ctx
        .engine
        .get(job_id)
        .await
        .map_err(|e| job_error(e, job_id))?;
    if job.user_id != caller.user_id {
        return Err(not_found(job_id));
    }
    Ok(job)
}

pub(super) async fn status(
    ctx: &CommandContext,
    input: Value,
    caller: &Caller,
) -> Result<CommandResult<Job>, CommandError> {
    let input: JobIdInput = parse_input(input)?;
    let job_id = validate_job_id(&input.job_id)?;
    let job = owned_job(ctx, job_id, caller).await?;
    let reasoning = describe(&job);
    Ok(CommandResult::success(job).with_reasoning(reasoning))
}

pub(super) async fn cancel(
    ctx: &CommandContext,
    input: Value,
    caller: &Caller,
) -> Result<CommandResult<Job>, CommandError> {
    let input: JobIdInput = parse_input(input)?;
    let job_id = validate_job_id(&input.job_id)?;
    owned_job(ctx, job_id, caller).await?;
    let job = ctx
        .engine
        .cancel(job_id)
        .await
        .map_err(|e| job_error(e, job_id))?;
    let reasoning = format!("Job cancelled (was {:.0}% complete)", job.progress);
    Ok(CommandResult::success(job).with_reasoning(reasoning))
}

pub(super) async fn list(
    ctx: &CommandContext,
    input: Value,
    caller: &Caller,
) -> Result<CommandResult<ListOutput>, CommandError> {
    let input: ListInput = parse_input(input)?;
    let limit = validate_limit(input.limit, DEFAULT_LIST_LIMIT)?;
    let offset = validate_offset(input.offset)?;
    let page = ctx
        .engine
        .list(&JobQuery {
            user_id: Some(caller.user_id.clone()),
            status: input.status_filter,
            limit,
            offset,
        })
        .await
        .map_err(|e| {
            error!("Could not list jobs for {}: {}", caller.user_id, e);
            CommandError::from_code(ErrorCode::InternalError)
        })?;

    let has_more = offset.saturating_add(page.jobs.len()) < page.total;
    let mut reasoning = match input.status_filter {
        Some(status) => format!("Found {} {} jobs", page.total, status),
        None => format!("Found {} jobs", page.total),
    };
    if has_more {
        reasoning.push_str(&format!(" (showing {})", page.jobs.len()));
    }
    Ok(CommandResult::success(ListOutput {
        jobs: page.jobs,
        total: page.total,
        has_more,
    })
    .with_reasoning(reasoning))
}

/// Blocks until the job is terminal or the timeout passes. A job still
/// running at the deadline is returned as is; a failed job becomes an error
/// carrying the job's own message.
pub(super) async fn wait(
    ctx: &CommandContext,
    input: Value,
    caller: &Caller,
) -> Result<CommandResult<Job>, CommandError> {
    let input: WaitInput = parse_input(input)?;
    let job_id = validate_job_id(&input.job_id)?;
    owned_job(ctx, job_id, caller).await?;
    let timeout = Duration::from_secs(
        input
            .timeout_seconds
            .unwrap_or(DEFAULT_WAIT_SECS)
            .min(MAX_WAIT_SECS),
    );
    let job = ctx
        .engine
        .wait(job_id, timeout)
        .await
        .map_err(|e| job_error(e, job_id))?;

    if job.status == JobStatus::Failed {
        let code = job.error_code.unwrap_or(ErrorCode::GenerationFailed);
        let message = job
            .error_message
            .clone()
            .unwrap_or_else(|| code.template().message.to_string());
        return Err(CommandError::new(code, message)
            .with_details(serde_json::json!({ "job_id": job.id })));
    }

    let still_running = (!job.is_terminal()).then(|| {
        format!(
            "Still {} after {}s; call job.wait again or poll job.status",
            job.status,
            timeout.as_secs()
        )
    });
    let reasoning = describe(&job);
    let mut result = CommandResult::success(job).with_reasoning(reasoning);
    if let Some(hint) = still_running {
        result = result.with_suggestion(hint);
    }
    Ok(result)
}

pub(super) async fn delete(
    ctx: &CommandContext,
    input: Value,
    caller: &Caller,
) -> Result<CommandResult<DeleteOutput>, CommandError> {
    let input: JobIdInput = parse_input(input)?;
    let job_id = validate_job_id(&input.job_id)?;
    owned_job(ctx, job_id, caller).await?;
    ctx.engine
        .delete(job_id)
        .await
        .map_err(|e| job_error(e, job_id))?;
    forget_job(ctx, job_id).await;
    Ok(CommandResult::success(DeleteOutput {
        deleted: true,
        job_id: job_id.to_string(),
    })
    .with_reasoning(format!("Deleted job {}", job_id)))
}
