use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tracing::warn;

use super::CommandArgs;
use super::serve::build_context;
use crate::core::commands::{Caller, Surface, dispatch, find_command};
use crate::core::config::NoisettConfig;
use crate::core::error::ErrorCode;
use crate::core::result::{CommandError, CommandResult};
use crate::logging::{self, LogConsole};

/// Leeway on top of the job timeout when the CLI waits for its own job.
const WAIT_SLACK_SECS: u64 = 5;

async fn read_input(raw: Option<&str>) -> Result<Value> {
    let text = match raw {
        None => return Ok(Value::Null),
        Some("-") => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
        Some(text) => text.to_string(),
    };
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).context("Input must be a JSON object")
}

fn print_result(result: &Value, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{}", text);
    Ok(())
}

/// Runs one command and prints its result envelope on stdout.
/// Returns whether the command succeeded.
pub async fn run_command(args: CommandArgs) -> Result<bool> {
    let input = match read_input(args.input.as_deref()).await {
        Ok(input) => input,
        Err(e) => {
            let result = CommandResult::<Value>::failure(CommandError::new(
                ErrorCode::ValidationError,
                format!("{:#}", e),
            ));
            print_result(&serde_json::to_value(&result)?, args.pretty)?;
            return Ok(false);
        }
    };
    logging::init(tracing::Level::WARN, LogConsole::Stderr);
    let user = args.user.clone().unwrap_or_else(whoami::username);

    let result = match args.api_url.as_deref() {
        Some(url) => run_remote(url, &args.command, input, &user).await?,
        None => run_local(&args.command, input, &user).await?,
    };
    let success = result
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    print_result(&result, args.pretty)?;
    Ok(success)
}

/// In-process execution. A generated job is awaited before exit since the
/// engine lives only as long as this process.
async fn run_local(command: &str, input: Value, user: &str) -> Result<Value> {
    let config = NoisettConfig::load()?;
    let ctx = build_context(&config, false).await?;
    let caller = Caller::new(user, Surface::Cli);

    let mut result = dispatch(&ctx, command, input, &caller).await;
    if command == "asset.generate"
        && let Some(job_id) = result
            .data
            .as_ref()
            .and_then(|d| d.get("job_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    {
        let timeout = config.job_timeout_secs + WAIT_SLACK_SECS;
        result = dispatch(
            &ctx,
            "job.wait",
            json!({ "job_id": job_id, "timeout_seconds": timeout }),
            &caller,
        )
        .await;
    }
    ctx.engine.shutdown().await;
    Ok(serde_json::to_value(&result)?)
}

async fn run_remote(api_url: &str, command: &str, input: Value, user: &str) -> Result<Value> {
    if find_command(command).is_none() {
        warn!("'{}' is not a known command locally", command);
    }
    let url = format!("{}/api/commands/{}", api_url.trim_end_matches('/'), command);
    let response = reqwest::Client::new()
        .post(&url)
        .header("x-user-id", user)
        .json(&input)
        .send()
        .await
        .with_context(|| format!("Could not reach {}", api_url))?;
    let status = response.status();
    let body: Value = response.json().await.with_context(|| {
        format!("Server at {} answered {} without a result envelope", api_url, status)
    })?;
    if body.get("success").is_none() {
        bail!("Unexpected response from {}: {}", url, body);
    }
    Ok(body)
}
