use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};

use super::AppState;
use super::handlers;

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/generate", post(handlers::generate))
        .route("/api/jobs", get(handlers::list_jobs))
        .route(
            "/api/jobs/{id}",
            get(handlers::get_job).delete(handlers::cancel_job),
        )
        .route("/api/jobs/{id}/wait", post(handlers::wait_job))
        .route(
            "/api/favorites",
            get(handlers::list_favorites).post(handlers::add_favorite),
        )
        .route(
            "/api/favorites/{job_id}/{index}",
            delete(handlers::remove_favorite),
        )
        .route("/api/models", get(handlers::list_models))
        .route("/api/models/{id}", get(handlers::get_model))
        .route("/api/asset-types", get(handlers::asset_types))
        .route("/api/quality-presets", get(handlers::quality_presets))
        .route("/api/commands/{name}", post(handlers::run_command))
        .route("/api/images/{file}", get(handlers::serve_image))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_cors())
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commands::{CommandContext, RateLimiter};
    use crate::core::generator::ImageGenerator;
    use crate::core::generator::providers::MockGenerator;
    use crate::core::generator::testing::GatedGenerator;
    use crate::core::jobs::{EngineSettings, JobEngine};
    use crate::core::store::InMemoryJobStore;
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn state_with(generator: Arc<dyn ImageGenerator>, images_dir: PathBuf) -> AppState {
        let engine = JobEngine::new(
            Arc::new(InMemoryJobStore::new()),
            generator,
            EngineSettings {
                job_timeout: Duration::from_secs(5),
                max_concurrent_jobs: 2,
                poll_interval: Duration::from_millis(5),
            },
        );
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        AppState {
            ctx: CommandContext::new(
                engine,
                Arc::new(InMemoryJobStore::new()),
                RateLimiter::new(0),
            ),
            log_tx,
            images_dir,
        }
    }

    fn state() -> AppState {
        state_with(
            Arc::new(MockGenerator::instant()),
            std::env::temp_dir().join("noisett-router-tests"),
        )
    }

    async fn json_request(
        app: Router,
        method: Method,
        path: &str,
        body: Option<Value>,
        user: &str,
    ) -> (StatusCode, Value) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };

        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .header("x-user-id", user)
            .body(body)
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));
        (status, json)
    }

    #[tokio::test]
    async fn security_headers_present_on_responses() {
        let app = build_api_router(state());
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/models")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let app = build_api_router(state());
        let (status, json) = json_request(app, Method::GET, "/health", None, "ana").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["backend"], "mock");
        assert_eq!(json["backend_status"], "available");
    }

    #[tokio::test]
    async fn generate_then_wait_and_fetch() {
        let state = state();
        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/generate",
            Some(json!({ "prompt": "cloud with a lock", "count": 2, "asset_type": "icons" })),
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        let job_id = json["data"]["job_id"].as_str().unwrap().to_string();

        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            &format!("/api/jobs/{job_id}/wait"),
            Some(json!({ "timeout_seconds": 5 })),
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "complete");
        assert_eq!(json["data"]["images"].as_array().unwrap().len(), 2);

        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            &format!("/api/jobs/{job_id}"),
            None,
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["progress"], 100.0);

        let (status, json) = json_request(
            build_api_router(state),
            Method::GET,
            "/api/jobs?limit=10&status_filter=complete",
            None,
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["total"], 1);
    }

    #[tokio::test]
    async fn validation_errors_are_400() {
        let app = build_api_router(state());
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/generate",
            Some(json!({ "prompt": "   " })),
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn malformed_body_gets_an_envelope() {
        let app = build_api_router(state());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/generate")
            .header("content-type", "application/json")
            .body(Body::from("{\"prompt\": "))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unknown_job_is_404_and_other_users_cannot_see_it() {
        let state = state();
        let (status, _) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            "/api/jobs/nope",
            None,
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/generate",
            Some(json!({ "prompt": "shield" })),
            "ana",
        )
        .await;
        let job_id = json["data"]["job_id"].as_str().unwrap().to_string();
        let (status, json) = json_request(
            build_api_router(state),
            Method::GET,
            &format!("/api/jobs/{job_id}"),
            None,
            "bo",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "JOB_NOT_FOUND");
    }

    #[tokio::test]
    async fn cancelling_a_finished_job_is_409() {
        let state = state();
        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/generate",
            Some(json!({ "prompt": "gear" })),
            "ana",
        )
        .await;
        let job_id = json["data"]["job_id"].as_str().unwrap().to_string();
        state
            .ctx
            .engine
            .wait(&job_id, Duration::from_secs(5))
            .await
            .unwrap();

        let (status, json) = json_request(
            build_api_router(state),
            Method::DELETE,
            &format!("/api/jobs/{job_id}"),
            None,
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "JOB_ALREADY_COMPLETE");
    }

    #[tokio::test]
    async fn cancelling_a_running_job() {
        let gated = Arc::new(GatedGenerator::new());
        let state = state_with(gated.clone(), std::env::temp_dir());
        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/generate",
            Some(json!({ "prompt": "gear" })),
            "ana",
        )
        .await;
        let job_id = json["data"]["job_id"].as_str().unwrap().to_string();

        let (status, json) = json_request(
            build_api_router(state),
            Method::DELETE,
            &format!("/api/jobs/{job_id}"),
            None,
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "cancelled");
    }

    #[tokio::test]
    async fn favorites_routes() {
        let state = state();
        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/generate",
            Some(json!({ "prompt": "shield", "count": 2 })),
            "ana",
        )
        .await;
        let job_id = json["data"]["job_id"].as_str().unwrap().to_string();
        state
            .ctx
            .engine
            .wait(&job_id, Duration::from_secs(5))
            .await
            .unwrap();

        let favorite = json!({ "job_id": job_id, "image_index": 1 });
        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/favorites",
            Some(favorite.clone()),
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["image_index"], 1);

        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/favorites",
            Some(favorite.clone()),
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "FAVORITE_ALREADY_EXISTS");

        let (status, _) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/favorites",
            Some(favorite),
            "bo",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            "/api/favorites?limit=10",
            None,
            "ana",
        )
        .await;
        assert_eq!(json["data"]["total"], 1);
        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            "/api/favorites",
            None,
            "bo",
        )
        .await;
        assert_eq!(json["data"]["total"], 0);

        let path = format!("/api/favorites/{job_id}/1");
        let (status, json) =
            json_request(build_api_router(state.clone()), Method::DELETE, &path, None, "ana").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["removed"], true);
        let (status, json) =
            json_request(build_api_router(state), Method::DELETE, &path, None, "ana").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "FAVORITE_NOT_FOUND");
    }

    #[tokio::test]
    async fn unavailable_model_is_503() {
        let app = build_api_router(state());
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/generate",
            Some(json!({ "prompt": "logo", "model": "sd35" })),
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"]["code"], "MODEL_UNAVAILABLE");
    }

    #[tokio::test]
    async fn catalog_routes() {
        let state = state();
        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            "/api/models/flux",
            None,
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["id"], "flux");

        let (status, _) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            "/api/models/dalle",
            None,
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            "/api/asset-types",
            None,
            "ana",
        )
        .await;
        assert_eq!(json["data"]["total"], 4);

        let (_, json) = json_request(
            build_api_router(state),
            Method::GET,
            "/api/quality-presets",
            None,
            "ana",
        )
        .await;
        assert_eq!(json["data"]["total"], 3);
    }

    #[tokio::test]
    async fn generic_command_route() {
        let state = state();
        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/commands/model.list",
            None,
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["total"], 3);

        let (status, json) = json_request(
            build_api_router(state),
            Method::POST,
            "/api/commands/lora.train",
            Some(json!({})),
            "ana",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn images_are_served_from_the_images_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fw_1_0.png"), b"\x89PNG").unwrap();
        let state = state_with(Arc::new(MockGenerator::instant()), dir.path().to_path_buf());

        let req = Request::builder()
            .uri("/api/images/fw_1_0.png")
            .body(Body::empty())
            .unwrap();
        let resp = build_api_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");

        let req = Request::builder()
            .uri("/api/images/..%2Fsecret.txt")
            .body(Body::empty())
            .unwrap();
        let resp = build_api_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .uri("/api/images/missing.png")
            .body(Body::empty())
            .unwrap();
        let resp = build_api_router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
