use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::collections::HashMap;

use super::AppState;
use crate::core::commands::{ANONYMOUS_USER, Caller, Surface, dispatch};
use crate::core::error::{ErrorClass, ErrorCode};
use crate::core::result::{CommandError, CommandResult};

pub const USER_HEADER: &str = "x-user-id";

type ApiResponse = (StatusCode, Json<CommandResult<Value>>);

fn caller(headers: &HeaderMap) -> Caller {
    let user = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(ANONYMOUS_USER);
    Caller::new(user, Surface::Rest)
}

pub(crate) fn status_for(result: &CommandResult<Value>) -> StatusCode {
    match result.error_code().map(ErrorCode::class) {
        None => StatusCode::OK,
        Some(ErrorClass::Validation) => StatusCode::BAD_REQUEST,
        Some(ErrorClass::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorClass::Conflict) => StatusCode::CONFLICT,
        Some(ErrorClass::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
        Some(ErrorClass::Backend) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorClass::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond(result: CommandResult<Value>) -> ApiResponse {
    (status_for(&result), Json(result))
}

/// Empty bodies count as `{}`. Malformed JSON becomes a validation error
/// envelope instead of axum's plain-text rejection.
fn parse_body(body: &Bytes) -> Result<Value, ApiResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        respond(CommandResult::failure(CommandError::new(
            ErrorCode::ValidationError,
            format!("Request body is not valid JSON: {}", e),
        )))
    })
}

async fn run(state: &AppState, command: &str, input: Value, headers: &HeaderMap) -> ApiResponse {
    respond(dispatch(&state.ctx, command, input, &caller(headers)).await)
}

pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    match parse_body(&body) {
        Ok(input) => run(&state, "asset.generate", input, &headers).await,
        Err(rejected) => rejected,
    }
}

pub async fn run_command(
    Path(name): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    match parse_body(&body) {
        Ok(input) => run(&state, &name, input, &headers).await,
        Err(rejected) => rejected,
    }
}

/// Query strings carry everything as text; numbers are converted so the
/// command sees the same JSON a POST body would carry.
fn query_to_input(query: HashMap<String, String>) -> Value {
    let mut input = serde_json::Map::new();
    for (key, value) in query {
        let value = match key.as_str() {
            "limit" | "offset" => value
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::String(value)),
            _ => Value::String(value),
        };
        input.insert(key, value);
    }
    Value::Object(input)
}

pub async fn list_jobs(
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    run(&state, "job.list", query_to_input(query), &headers).await
}

pub async fn get_job(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    run(&state, "job.status", json!({ "job_id": id }), &headers).await
}

pub async fn cancel_job(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    run(&state, "job.cancel", json!({ "job_id": id }), &headers).await
}

pub async fn wait_job(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    let mut input = match parse_body(&body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => serde_json::Map::new(),
        Err(rejected) => return rejected,
    };
    input.insert("job_id".to_string(), Value::String(id));
    run(&state, "job.wait", Value::Object(input), &headers).await
}

pub async fn list_favorites(
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    run(&state, "favorites.list", query_to_input(query), &headers).await
}

pub async fn add_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    match parse_body(&body) {
        Ok(input) => run(&state, "favorites.add", input, &headers).await,
        Err(rejected) => rejected,
    }
}

pub async fn remove_favorite(
    Path((job_id, index)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    let image_index = index
        .parse::<u32>()
        .map(Value::from)
        .unwrap_or(Value::String(index));
    let input = json!({ "job_id": job_id, "image_index": image_index });
    run(&state, "favorites.remove", input, &headers).await
}

pub async fn list_models(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    run(&state, "model.list", Value::Null, &headers).await
}

pub async fn get_model(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    run(&state, "model.info", json!({ "model_id": id }), &headers).await
}

pub async fn asset_types(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    run(&state, "asset.types", Value::Null, &headers).await
}

pub async fn quality_presets(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    run(&state, "quality.presets", Value::Null, &headers).await
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let generator = state.ctx.engine.generator();
    let backend = generator.health_check().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": generator.backend(),
        "backend_status": backend.describe(),
    }))
}

fn is_safe_file_name(file: &str) -> bool {
    !file.is_empty()
        && !file.starts_with('.')
        && file
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !file.contains("..")
}

pub async fn serve_image(Path(file): Path<String>, State(state): State<AppState>) -> Response {
    if !is_safe_file_name(&file) {
        return (StatusCode::BAD_REQUEST, "Invalid image name").into_response();
    }
    match tokio::fs::read(state.images_dir.join(&file)).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&file).first_or_octet_stream();
            (
                [
                    (header::CONTENT_TYPE, mime.to_string()),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                bytes,
            )
                .into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classes_map_to_statuses() {
        let cases = [
            (ErrorCode::ValidationError, StatusCode::BAD_REQUEST),
            (ErrorCode::JobNotFound, StatusCode::NOT_FOUND),
            (ErrorCode::ModelNotFound, StatusCode::NOT_FOUND),
            (ErrorCode::JobAlreadyComplete, StatusCode::CONFLICT),
            (ErrorCode::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (ErrorCode::ModelUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (ErrorCode::InternalError, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, status) in cases {
            let result = CommandResult::failure(CommandError::from_code(code));
            assert_eq!(status_for(&result), status, "{code}");
        }
        assert_eq!(status_for(&CommandResult::success(json!({}))), StatusCode::OK);
    }

    #[test]
    fn image_names_cannot_escape_the_directory() {
        assert!(is_safe_file_name("fw_1234_0_42.jpg"));
        for bad in ["", "../jobs.db", "..", ".hidden", "a/b.png", "a\\b.png", "x..png"] {
            assert!(!is_safe_file_name(bad), "{bad}");
        }
    }

    #[test]
    fn query_numbers_are_converted() {
        let mut query = HashMap::new();
        query.insert("limit".to_string(), "5".to_string());
        query.insert("offset".to_string(), "many".to_string());
        query.insert("status_filter".to_string(), "complete".to_string());
        let input = query_to_input(query);
        assert_eq!(input["limit"], 5);
        assert_eq!(input["offset"], "many");
        assert_eq!(input["status_filter"], "complete");
    }
}
