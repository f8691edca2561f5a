use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, warn};

use super::validation::{NoInput, parse_input, validate_count, validate_prompt};
use super::{Caller, CommandContext};
use crate::core::error::ErrorCode;
use crate::core::result::{CommandError, CommandResult};
use crate::core::types::{
    AssetType, AssetTypeInfo, Job, JobStatus, ModelId, NewJob, QualityPreset,
};

#[derive(Debug, Deserialize)]
pub(super) struct GenerateInput {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    asset_type: AssetType,
    #[serde(default)]
    model: ModelId,
    #[serde(default)]
    quality: QualityPreset,
    #[serde(default)]
    count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct GenerateOutput {
    job_id: String,
    status: JobStatus,
    estimated_seconds: u32,
    job: Job,
}

#[derive(Debug, Serialize)]
pub(super) struct AssetTypesOutput {
    asset_types: Vec<AssetTypeInfo>,
    total: usize,
}

pub(super) async fn generate(
    ctx: &CommandContext,
    input: Value,
    caller: &Caller,
) -> Result<CommandResult<GenerateOutput>, CommandError> {
    let input: GenerateInput = parse_input(input)?;
    let prompt = validate_prompt(&input.prompt)?;
    let count = validate_count(input.count)?;

    let model = input.model.info();
    if !model.available {
        return Err(CommandError::new(
            ErrorCode::ModelUnavailable,
            format!("Model '{}' is not currently available", input.model.as_str()),
        )
        .with_suggestion("Try 'hidream' which is commercially licensed and available"));
    }

    if !ctx.limiter.try_acquire(&caller.user_id) {
        return Err(CommandError::new(
            ErrorCode::RateLimited,
            format!(
                "Rate limit of {} generations per minute exceeded",
                ctx.limiter.per_minute()
            ),
        )
        .with_details(json!({ "limit_per_minute": ctx.limiter.per_minute() })));
    }

    let generator = ctx.engine.generator();
    let health = generator.health_check().await;
    if !health.is_available() {
        warn!(
            "Rejecting generation: {} backend is {}",
            generator.backend(),
            health.describe()
        );
        return Err(CommandError::new(
            ErrorCode::ModelUnavailable,
            format!(
                "Image backend '{}' is {}",
                generator.backend(),
                health.describe()
            ),
        )
        .with_suggestion("Configure the backend's API key or run 'noisett doctor'"));
    }

    let job = ctx
        .engine
        .submit(NewJob {
            prompt,
            asset_type: input.asset_type,
            model: input.model,
            quality: input.quality,
            count,
            user_id: caller.user_id.clone(),
        })
        .await
        .map_err(|e| {
            error!("Could not create job for {}: {}", caller.user_id, e);
            CommandError::from_code(ErrorCode::InternalError)
        })?;

    let estimated_seconds = input.quality.base_job_seconds() * count;
    let mut result = CommandResult::success(GenerateOutput {
        job_id: job.id.clone(),
        status: job.status,
        estimated_seconds,
        job,
    })
    .with_reasoning(format!(
        "Started generation of {} {} images using {}",
        count,
        input.asset_type.as_str(),
        model.name
    ));
    if !model.commercial_ok {
        result = result.with_warning(
            "NON_COMMERCIAL",
            format!("Model '{}' is for non-commercial use only", model.name),
        );
    }
    if input.quality == QualityPreset::Draft {
        result = result.with_suggestion("Use 'standard' quality for better results");
    }
    if input.asset_type == AssetType::Product {
        result = result.with_suggestion("Try 'premium' asset type for marketing-grade quality");
    }
    Ok(result)
}

pub(super) fn types(input: Value) -> Result<CommandResult<AssetTypesOutput>, CommandError> {
    let _: NoInput = parse_input(input)?;
    let asset_types: Vec<AssetTypeInfo> = AssetType::ALL.iter().map(|t| t.info()).collect();
    let total = asset_types.len();
    Ok(CommandResult::success(AssetTypesOutput { asset_types, total })
        .with_reasoning(format!("{} asset types available", total)))
}
