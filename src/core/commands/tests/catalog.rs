use serde_json::json;

use super::{ana, code, context, run};
use crate::core::commands::{COMMANDS, find_command};

#[tokio::test]
async fn model_list_counts_availability() {
    let ctx = context();
    let result = run(&ctx, "model.list", json!({}), &ana()).await;
    assert_eq!(result.reasoning.as_deref(), Some("3 models (2 available)"));
    assert_eq!(result.data.as_ref().unwrap()["total"], 3);
    assert_eq!(result.suggestions.len(), 2);
}

#[tokio::test]
async fn model_info_warns_about_licensing_and_availability() {
    let ctx = context();
    let flux = run(&ctx, "model.info", json!({ "model_id": "flux" }), &ana()).await;
    assert_eq!(flux.data.as_ref().unwrap()["commercial_ok"], false);
    assert_eq!(flux.warnings[0].code, "NON_COMMERCIAL");
    assert_eq!(
        flux.warnings[0].message,
        "'FLUX.1-dev' is for non-commercial use only"
    );

    let sd = run(&ctx, "model.info", json!({ "model_id": "SD35" }), &ana()).await;
    assert_eq!(sd.warnings.len(), 1);
    assert_eq!(sd.warnings[0].code, "UNAVAILABLE");

    let hidream = run(&ctx, "model.info", json!({ "model_id": "hidream" }), &ana()).await;
    assert!(hidream.warnings.is_empty());
    assert!(hidream.reasoning.unwrap().starts_with("HiDream-I1: "));
}

#[tokio::test]
async fn unknown_model_is_not_found() {
    let ctx = context();
    let result = run(&ctx, "model.info", json!({ "model_id": "dalle" }), &ana()).await;
    assert_eq!(code(&result), "MODEL_NOT_FOUND");
    assert_eq!(result.error.unwrap().message, "Model 'dalle' not found");
}

#[tokio::test]
async fn asset_types_and_presets() {
    let ctx = context();
    let types = run(&ctx, "asset.types", json!(null), &ana()).await;
    assert_eq!(types.reasoning.as_deref(), Some("4 asset types available"));
    let names: Vec<String> = types.data.unwrap()["asset_types"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["icons", "product", "logo", "premium"]);

    let presets = run(&ctx, "quality.presets", json!({}), &ana()).await;
    assert_eq!(
        presets.reasoning.as_deref(),
        Some("Found 3 quality presets: draft, standard, high")
    );
}

#[test]
fn command_table_is_unique_and_resolvable() {
    let mut names: Vec<&str> = COMMANDS.iter().map(|c| c.name).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), COMMANDS.len());
    for name in names {
        assert!(find_command(name).is_some());
    }
    assert!(find_command("lora.train").is_none());
}
