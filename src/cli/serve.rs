use anyhow::Result;
use console::style;
use tracing::{info, warn};

use crate::core::commands::{CommandContext, RateLimiter};
use crate::core::config::NoisettConfig;
use crate::core::generator::build_generator;
use crate::core::jobs::{EngineSettings, JobEngine};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::open_store;
use crate::core::terminal::GuideSection;
use crate::interfaces::mcp::McpServer;
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging::{self, LogConsole};

/// Wires store, backend and engine from configuration.
pub(crate) async fn build_context(config: &NoisettConfig, recover: bool) -> Result<CommandContext> {
    let stores = open_store(config).await?;
    let generator = build_generator(config);
    let engine = JobEngine::new(stores.jobs, generator, EngineSettings::from_config(config));
    if recover {
        let recovered = engine.recover_interrupted().await?;
        if recovered > 0 {
            warn!("Recovered {} interrupted jobs", recovered);
        }
    }
    Ok(CommandContext::new(
        engine,
        stores.favorites,
        RateLimiter::new(config.rate_limit_per_minute),
    ))
}

pub async fn run_serve(args: &[String]) -> Result<()> {
    let mut config = NoisettConfig::load()?;
    (config.api_host, config.api_port) =
        super::parse_serve_flags(args, 2, config.api_host.clone(), config.api_port);

    let log_tx = logging::init(config.tracing_level(), LogConsole::Stdout);
    let ctx = build_context(&config, config.recover_on_start).await?;

    let mut server = ApiServer::new(ApiServerConfig {
        ctx,
        log_tx,
        images_dir: config.images_dir(),
        api_host: config.api_host.clone(),
        api_port: config.api_port,
    });
    server.on_init().await?;
    server.on_start().await?;

    GuideSection::new("Noisett API")
        .status(
            "Endpoint",
            &format!(
                "{}",
                style(format!("http://{}", server.address()))
                    .underlined()
                    .cyan()
            ),
        )
        .status("Backend", config.backend.as_str())
        .status("Store", config.store.as_str())
        .status("Workers", &config.max_concurrent_jobs.to_string())
        .blank()
        .status(
            "Press Ctrl+C to stop the server.",
            &format!("{}", style("Ctrl+C").bold().yellow()),
        )
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    server.on_shutdown().await?;
    Ok(())
}

/// Stdout carries the protocol, so logs go to stderr.
pub async fn run_mcp(user: Option<String>) -> Result<()> {
    let config = NoisettConfig::load()?;
    logging::init(config.tracing_level(), LogConsole::Stderr);
    let ctx = build_context(&config, config.recover_on_start).await?;
    let user = user.unwrap_or_else(whoami::username);

    let server = McpServer::new(ctx.clone(), &user);
    let served = server.serve_stdio().await;
    ctx.engine.shutdown().await;
    served
}
