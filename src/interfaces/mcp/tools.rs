use serde::Serialize;
use serde_json::{Value, json};

use crate::core::commands::{COMMANDS, CommandSpec};

#[derive(Serialize, Debug, Clone)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// `asset.generate` is exposed as `asset_generate`; MCP tool names may not contain dots.
pub fn tool_name(command: &str) -> String {
    command.replace('.', "_")
}

pub fn command_for_tool(tool: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .find(|c| tool_name(c.name) == tool)
        .map(|c| c.name)
}

pub fn list_tools() -> Vec<McpTool> {
    COMMANDS.iter().map(describe).collect()
}

fn describe(spec: &CommandSpec) -> McpTool {
    McpTool {
        name: tool_name(spec.name),
        description: spec.description.to_string(),
        input_schema: input_schema(spec.name),
    }
}

fn job_id_schema(extra: Value) -> Value {
    let mut properties = json!({
        "job_id": { "type": "string", "description": "Job ID returned by asset_generate" }
    });
    if let (Some(base), Some(more)) = (properties.as_object_mut(), extra.as_object()) {
        base.extend(more.clone());
    }
    json!({ "type": "object", "properties": properties, "required": ["job_id"] })
}

pub fn input_schema(command: &str) -> Value {
    match command {
        "asset.generate" => json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string", "minLength": 1, "maxLength": 500,
                    "description": "Text description of the image to generate"
                },
                "asset_type": {
                    "type": "string", "enum": ["icons", "product", "logo", "premium"],
                    "default": "product"
                },
                "model": {
                    "type": "string", "enum": ["hidream", "flux", "sd35"], "default": "hidream"
                },
                "quality": {
                    "type": "string", "enum": ["draft", "standard", "high"], "default": "standard"
                },
                "count": { "type": "integer", "minimum": 1, "maximum": 4, "default": 4 }
            },
            "required": ["prompt"]
        }),
        "job.status" | "job.cancel" | "job.delete" => job_id_schema(json!({})),
        "job.wait" => job_id_schema(json!({
            "timeout_seconds": {
                "type": "integer", "minimum": 0, "maximum": 600, "default": 120
            }
        })),
        "job.list" => json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "minimum": 1, "maximum": 100, "default": 20 },
                "offset": { "type": "integer", "minimum": 0, "default": 0 },
                "status_filter": {
                    "type": "string",
                    "enum": ["queued", "processing", "complete", "failed", "cancelled"]
                }
            }
        }),
        "favorites.add" | "favorites.remove" => json!({
            "type": "object",
            "properties": {
                "job_id": { "type": "string", "description": "ID of a completed job" },
                "image_index": {
                    "type": "integer", "minimum": 0,
                    "description": "0-based index into the job's images"
                }
            },
            "required": ["job_id", "image_index"]
        }),
        "favorites.list" => json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "minimum": 1, "maximum": 100, "default": 50 },
                "offset": { "type": "integer", "minimum": 0, "default": 0 }
            }
        }),
        "model.info" => json!({
            "type": "object",
            "properties": {
                "model_id": { "type": "string", "enum": ["hidream", "flux", "sd35"] }
            },
            "required": ["model_id"]
        }),
        _ => json!({ "type": "object", "properties": {} }),
    }
}
