use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::error;

use super::job::owned_job;
use super::validation::{parse_input, validate_job_id, validate_limit, validate_offset};
use super::{Caller, CommandContext};
use crate::core::error::{ErrorCode, JobError};
use crate::core::result::{CommandError, CommandResult};
use crate::core::types::{Favorite, JobStatus};

pub const DEFAULT_FAVORITES_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub(super) struct FavoriteInput {
    #[serde(default)]
    job_id: String,
    #[serde(default)]
    image_index: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListInput {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ListOutput {
    favorites: Vec<Favorite>,
    total: usize,
    has_more: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct RemoveOutput {
    removed: bool,
    job_id: String,
    image_index: u32,
}

fn image_index(index: Option<u32>) -> Result<u32, CommandError> {
    index.ok_or_else(|| {
        CommandError::new(ErrorCode::ValidationError, "image_index is required")
            .with_suggestion("Pass the 0-based index of an image in the job's results")
            .with_details(json!({ "field": "image_index", "reason": ErrorCode::ValidationError }))
    })
}

fn storage_error(caller: &Caller, e: JobError) -> CommandError {
    error!("Favorites storage failed for {}: {}", caller.user_id, e);
    CommandError::from_code(ErrorCode::InternalError)
}

pub(super) async fn add(
    ctx: &CommandContext,
    input: Value,
    caller: &Caller,
) -> Result<CommandResult<Favorite>, CommandError> {
    let input: FavoriteInput = parse_input(input)?;
    let job_id = validate_job_id(&input.job_id)?;
    let index = image_index(input.image_index)?;
    let job = owned_job(ctx, job_id, caller).await?;
    if job.status != JobStatus::Complete {
        return Err(CommandError::new(
            ErrorCode::ValidationError,
            format!("Job '{}' is {} and has no images to favorite", job_id, job.status),
        )
        .with_suggestion("Wait for the job to complete with job.wait"));
    }
    let favorite = Favorite::of(&job, index).ok_or_else(|| {
        CommandError::new(
            ErrorCode::ValidationError,
            format!("Job '{}' has no image {}", job_id, index),
        )
        .with_suggestion(format!(
            "Use an image_index between 0 and {}",
            job.images.len().saturating_sub(1)
        ))
        .with_details(json!({ "field": "image_index", "reason": ErrorCode::ValidationError }))
    })?;

    let favorite = match ctx.favorites.add_favorite(favorite).await {
        Ok(favorite) => favorite,
        Err(e @ JobError::FavoriteExists { .. }) => {
            return Err(CommandError::from_code(e.code()));
        }
        Err(e) => return Err(storage_error(caller, e)),
    };
    let reasoning = format!("Added image {} from job {} to favorites", index, job_id);
    Ok(CommandResult::success(favorite).with_reasoning(reasoning))
}

pub(super) async fn list(
    ctx: &CommandContext,
    input: Value,
    caller: &Caller,
) -> Result<CommandResult<ListOutput>, CommandError> {
    let input: ListInput = parse_input(input)?;
    let limit = validate_limit(input.limit, DEFAULT_FAVORITES_LIMIT)?;
    let offset = validate_offset(input.offset)?;
    let page = ctx
        .favorites
        .list_favorites(&caller.user_id, limit, offset)
        .await
        .map_err(|e| storage_error(caller, e))?;

    let has_more = offset.saturating_add(page.favorites.len()) < page.total;
    let reasoning = format!(
        "Retrieved {} of {} favorites",
        page.favorites.len(),
        page.total
    );
    Ok(CommandResult::success(ListOutput {
        favorites: page.favorites,
        total: page.total,
        has_more,
    })
    .with_reasoning(reasoning))
}

pub(super) async fn remove(
    ctx: &CommandContext,
    input: Value,
    caller: &Caller,
) -> Result<CommandResult<RemoveOutput>, CommandError> {
    let input: FavoriteInput = parse_input(input)?;
    let job_id = validate_job_id(&input.job_id)?;
    let index = image_index(input.image_index)?;
    let removed = ctx
        .favorites
        .remove_favorite(&caller.user_id, job_id, index)
        .await
        .map_err(|e| storage_error(caller, e))?;
    if !removed {
        return Err(CommandError::from_code(ErrorCode::FavoriteNotFound)
            .with_details(json!({ "job_id": job_id, "image_index": index })));
    }
    Ok(CommandResult::success(RemoveOutput {
        removed: true,
        job_id: job_id.to_string(),
        image_index: index,
    })
    .with_reasoning(format!(
        "Removed image {} from job {} from favorites",
        index, job_id
    )))
}

/// Bookmarks die with their job.
pub(super) async fn forget_job(ctx: &CommandContext, job_id: &str) {
    if let Err(e) = ctx.favorites.remove_job_favorites(job_id).await {
        error!("Could not drop favorites of deleted job {}: {}", job_id, e);
    }
}
