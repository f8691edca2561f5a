mod handlers;
mod router;

pub use router::build_api_router;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::path::PathBuf;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::commands::CommandContext;
use crate::core::lifecycle::LifecycleComponent;

pub struct ApiServer {
    ctx: CommandContext,
    log_tx: tokio::sync::broadcast::Sender<String>,
    images_dir: PathBuf,
    api_host: String,
    api_port: u16,
    stop: CancellationToken,
}

pub struct ApiServerConfig {
    pub ctx: CommandContext,
    pub log_tx: tokio::sync::broadcast::Sender<String>,
    pub images_dir: PathBuf,
    pub api_host: String,
    pub api_port: u16,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) ctx: CommandContext,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) images_dir: PathBuf,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            ctx: config.ctx,
            log_tx: config.log_tx,
            images_dir: config.images_dir,
            api_host: config.api_host,
            api_port: config.api_port,
            stop: CancellationToken::new(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

// --- Lifecycle Implementations ---

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        tokio::fs::create_dir_all(&self.images_dir).await?;
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = self.address();
        let state = AppState {
            ctx: self.ctx.clone(),
            log_tx: self.log_tx.clone(),
            images_dir: self.images_dir.clone(),
        };
        let app = build_api_router(state);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let stop = self.stop.clone();

        tokio::spawn(async move {
            info!("API Server running at http://{addr}");
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!("API Server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        self.stop.cancel();
        self.ctx.engine.shutdown().await;
        Ok(())
    }
}
