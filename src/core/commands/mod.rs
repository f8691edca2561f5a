//! The command layer every surface goes through.
//!
//! Surfaces hand a command name, its JSON input and the caller to [`dispatch`]
//! and get a [`CommandResult`] back. Nothing here panics or returns an error
//! to the transport: failures become `CommandResult` errors with a code and a
//! suggestion.

mod asset;
mod catalog;
mod favorites;
mod job;
mod rate_limit;
pub(crate) mod validation;

pub use rate_limit::RateLimiter;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::core::error::{ErrorCode, JobError};
use crate::core::jobs::JobEngine;
use crate::core::result::{CommandError, CommandResult};
use crate::core::store::FavoriteStore;

pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Cli,
    Mcp,
    Rest,
}

impl Surface {
    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Cli => "cli",
            Surface::Mcp => "mcp",
            Surface::Rest => "rest",
        }
    }
}

/// Who is asking. The user id comes from the transport and is trusted as is;
/// it only scopes which jobs are visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub surface: Surface,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, surface: Surface) -> Self {
        let user_id = user_id.into();
        let user_id = if user_id.trim().is_empty() {
            ANONYMOUS_USER.to_string()
        } else {
            user_id.trim().to_string()
        };
        Self { user_id, surface }
    }
}

#[derive(Clone)]
pub struct CommandContext {
    pub engine: JobEngine,
    pub favorites: Arc<dyn FavoriteStore>,
    pub limiter: Arc<RateLimiter>,
}

impl CommandContext {
    pub fn new(
        engine: JobEngine,
        favorites: Arc<dyn FavoriteStore>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            engine,
            favorites,
            limiter: Arc::new(limiter),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
}

pub const COMMANDS: [CommandSpec; 13] = [
    CommandSpec {
        name: "asset.generate",
        description: "Start generating brand illustrations from a text prompt",
    },
    CommandSpec {
        name: "asset.types",
        description: "List asset types and their prompt templates",
    },
    CommandSpec {
        name: "job.status",
        description: "Get the current state of a generation job",
    },
    CommandSpec {
        name: "job.cancel",
        description: "Cancel a queued or processing job",
    },
    CommandSpec {
        name: "job.list",
        description: "List your recent generation jobs, newest first",
    },
    CommandSpec {
        name: "job.wait",
        description: "Wait for a job to finish and return its final state",
    },
    CommandSpec {
        name: "job.delete",
        description: "Remove a finished job from your history",
    },
    CommandSpec {
        name: "favorites.add",
        description: "Bookmark an image from one of your completed jobs",
    },
    CommandSpec {
        name: "favorites.list",
        description: "List your favorited images, newest first",
    },
    CommandSpec {
        name: "favorites.remove",
        description: "Remove an image from your favorites",
    },
    CommandSpec {
        name: "model.list",
        description: "List image models with license and availability",
    },
    CommandSpec {
        name: "model.info",
        description: "Show details for one image model",
    },
    CommandSpec {
        name: "quality.presets",
        description: "List quality presets and their speed trade-offs",
    },
];

pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// Runs one command on behalf of `caller`.
pub async fn dispatch(
    ctx: &CommandContext,
    command: &str,
    input: Value,
    caller: &Caller,
) -> CommandResult<Value> {
    debug!(
        "Command {} from {} via {}",
        command,
        caller.user_id,
        caller.surface.as_str()
    );
    let result = match command {
        "asset.generate" => finish(asset::generate(ctx, input, caller).await),
        "asset.types" => finish(asset::types(input)),
        "job.status" => finish(job::status(ctx, input, caller).await),
        "job.cancel" => finish(job::cancel(ctx, input, caller).await),
        "job.list" => finish(job::list(ctx, input, caller).await),
        "job.wait" => finish(job::wait(ctx, input, caller).await),
        "job.delete" => finish(job::delete(ctx, input, caller).await),
        "favorites.add" => finish(favorites::add(ctx, input, caller).await),
        "favorites.list" => finish(favorites::list(ctx, input, caller).await),
        "favorites.remove" => finish(favorites::remove(ctx, input, caller).await),
        "model.list" => finish(catalog::model_list(input)),
        "model.info" => finish(catalog::model_info(input)),
        "quality.presets" => finish(catalog::quality_presets(input)),
        other => CommandResult::failure(
            CommandError::new(
                ErrorCode::ValidationError,
                format!("Unknown command '{}'", other),
            )
            .with_suggestion("Run 'noisett commands' to see available commands"),
        ),
    };
    if let Some(code) = result.error_code() {
        info!(
            "Command {} for {} failed with {}",
            command, caller.user_id, code
        );
    }
    result
}

fn finish<T: Serialize>(outcome: Result<CommandResult<T>, CommandError>) -> CommandResult<Value> {
    match outcome {
        Ok(result) => result.into_json(),
        Err(error) => CommandResult::failure(error),
    }
}

/// Maps engine and store failures onto the public error vocabulary.
/// Storage and other internal faults are logged and surfaced generically.
pub(crate) fn job_error(err: JobError, job_id: &str) -> CommandError {
    match err {
        JobError::NotFound(_) => not_found(job_id),
        JobError::AlreadyTerminal { .. } => CommandError::from_code(err.code()),
        JobError::StillActive { status, .. } => CommandError::new(
            ErrorCode::ValidationError,
            format!("Job '{}' is still {}", job_id, status),
        )
        .with_suggestion("Cancel the job or wait for it to finish first"),
        JobError::Contended(_) => CommandError::from_code(ErrorCode::ServiceUnavailable),
        other => {
            error!("Job {} operation failed: {}", job_id, other);
            CommandError::from_code(ErrorCode::InternalError)
        }
    }
}

pub(crate) fn not_found(job_id: &str) -> CommandError {
    CommandError::new(ErrorCode::JobNotFound, format!("Job '{}' not found", job_id))
}

#[cfg(test)]
mod tests;
