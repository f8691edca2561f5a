use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validation::{NoInput, parse_input};
use crate::core::error::ErrorCode;
use crate::core::result::{CommandError, CommandResult};
use crate::core::types::{ModelId, ModelInfo, QualityPreset, QualityPresetInfo};

#[derive(Debug, Serialize)]
pub(super) struct ModelListOutput {
    models: Vec<ModelInfo>,
    total: usize,
}

#[derive(Debug, Deserialize)]
pub(super) struct ModelInfoInput {
    #[serde(default)]
    model_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct PresetsOutput {
    presets: Vec<QualityPresetInfo>,
    total: usize,
}

pub(super) fn model_list(input: Value) -> Result<CommandResult<ModelListOutput>, CommandError> {
    let _: NoInput = parse_input(input)?;
    let models: Vec<ModelInfo> = ModelId::ALL.iter().map(|m| m.info()).collect();
    let available = models.iter().filter(|m| m.available).count();
    let total = models.len();
    Ok(CommandResult::success(ModelListOutput { models, total })
        .with_reasoning(format!("{} models ({} available)", total, available))
        .with_suggestion("Use 'hidream' for commercial projects (Apache-2.0 license)")
        .with_suggestion("Use 'flux' for highest quality (non-commercial only)"))
}

pub(super) fn model_info(input: Value) -> Result<CommandResult<ModelInfo>, CommandError> {
    let input: ModelInfoInput = parse_input(input)?;
    let Some(id) = ModelId::parse(&input.model_id) else {
        return Err(CommandError::new(
            ErrorCode::ModelNotFound,
            format!("Model '{}' not found", input.model_id.trim()),
        ));
    };
    let model = id.info();
    let reasoning = format!("{}: {}", model.name, model.description);
    let mut result = CommandResult::success(model.clone()).with_reasoning(reasoning);
    if !model.commercial_ok {
        result = result.with_warning(
            "NON_COMMERCIAL",
            format!("'{}' is for non-commercial use only", model.name),
        );
    }
    if !model.available {
        result = result.with_warning(
            "UNAVAILABLE",
            format!("'{}' is not currently available", model.name),
        );
    }
    Ok(result)
}

pub(super) fn quality_presets(input: Value) -> Result<CommandResult<PresetsOutput>, CommandError> {
    let _: NoInput = parse_input(input)?;
    let presets: Vec<QualityPresetInfo> = QualityPreset::ALL.iter().map(|q| q.info()).collect();
    let names: Vec<&str> = QualityPreset::ALL.iter().map(|q| q.as_str()).collect();
    let total = presets.len();
    Ok(CommandResult::success(PresetsOutput { presets, total }).with_reasoning(format!(
        "Found {} quality presets: {}",
        total,
        names.join(", ")
    )))
}
