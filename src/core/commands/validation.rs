use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::core::error::ErrorCode;
use crate::core::result::CommandError;
use crate::core::types::{MAX_IMAGE_COUNT, MAX_PROMPT_CHARS, MIN_IMAGE_COUNT};

pub const DEFAULT_IMAGE_COUNT: u32 = 4;
pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

/// Input of commands that take no parameters. Extra keys are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct NoInput {}

/// Decodes a command's JSON input. A missing body counts as `{}`.
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, CommandError> {
    let input = if input.is_null() { json!({}) } else { input };
    serde_json::from_value(input).map_err(|e| {
        CommandError::new(ErrorCode::ValidationError, format!("Invalid input: {}", e))
    })
}

/// Trims the prompt and checks it is non-empty and at most 500 characters.
pub(crate) fn validate_prompt(prompt: &str) -> Result<String, CommandError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(CommandError::invalid("prompt", ErrorCode::PromptEmpty));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(CommandError::invalid("prompt", ErrorCode::PromptTooLong));
    }
    Ok(prompt.to_string())
}

pub(crate) fn validate_count(count: Option<i64>) -> Result<u32, CommandError> {
    let Some(count) = count else {
        return Ok(DEFAULT_IMAGE_COUNT);
    };
    if count < MIN_IMAGE_COUNT as i64 || count > MAX_IMAGE_COUNT as i64 {
        return Err(CommandError::invalid("count", ErrorCode::InvalidCount));
    }
    Ok(count as u32)
}

pub(crate) fn validate_limit(limit: Option<i64>, default: usize) -> Result<usize, CommandError> {
    let Some(limit) = limit else {
        return Ok(default);
    };
    if limit < 1 || limit > MAX_LIST_LIMIT as i64 {
        return Err(CommandError::new(
            ErrorCode::ValidationError,
            format!("limit must be between 1 and {}", MAX_LIST_LIMIT),
        )
        .with_details(json!({ "field": "limit", "reason": ErrorCode::ValidationError })));
    }
    Ok(limit as usize)
}

/// Offsets past `i64::MAX` cannot be expressed in a SQL `OFFSET`.
pub(crate) fn validate_offset(offset: Option<u64>) -> Result<usize, CommandError> {
    let offset = offset.unwrap_or(0);
    match i64::try_from(offset).ok().and_then(|o| usize::try_from(o).ok()) {
        Some(offset) => Ok(offset),
        None => Err(CommandError::new(
            ErrorCode::ValidationError,
            format!("offset must be between 0 and {}", i64::MAX),
        )
        .with_details(json!({ "field": "offset", "reason": ErrorCode::ValidationError }))),
    }
}

pub(crate) fn validate_job_id(job_id: &str) -> Result<&str, CommandError> {
    let job_id = job_id.trim();
    if job_id.is_empty() {
        return Err(CommandError::new(ErrorCode::ValidationError, "job_id is required")
            .with_suggestion("Pass the job_id returned by asset.generate")
            .with_details(json!({ "field": "job_id", "reason": ErrorCode::ValidationError })));
    }
    Ok(job_id)
}
