mod doctor;
mod run;
mod serve;

use anyhow::Result;
use console::style;

use crate::core::commands::COMMANDS;
use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Servers")
        .command("serve", "Start the REST API (--host, --port)")
        .command("mcp", "Serve MCP tools over stdio (--user)")
        .print();

    let mut commands = GuideSection::new("Commands");
    for spec in COMMANDS.iter() {
        commands = commands.command(spec.name, spec.description);
    }
    commands
        .blank()
        .text("Input is a JSON object; omit it for commands without input.")
        .text("--user <id>       Caller identity (default: your login name)")
        .text("--api-url <url>   Send to a running server instead of running locally")
        .text("--pretty          Indent the JSON result")
        .print();

    GuideSection::new("Diagnostics")
        .command("commands", "List commands as JSON")
        .command("doctor", "Check configuration, backend and port")
        .print();

    println!(
        "\n {} {} <command> ['<json>'] [--user <id>] [--api-url <url>] [--pretty]",
        style("Usage:").bold(),
        style("noisett").green()
    );
    println!(
        " {} {} asset.generate '{{\"prompt\": \"cloud security icon\", \"count\": 2}}'\n",
        style("Example:").bold(),
        style("noisett").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct CommandArgs {
    pub command: String,
    pub input: Option<String>,
    pub user: Option<String>,
    pub api_url: Option<String>,
    pub pretty: bool,
}

pub(crate) fn parse_command_args(args: &[String], start: usize) -> CommandArgs {
    let mut parsed = CommandArgs {
        command: args.get(start).cloned().unwrap_or_default(),
        ..Default::default()
    };
    let mut i = start + 1;
    while i < args.len() {
        match args[i].as_str() {
            "--user" | "-u" => {
                if i + 1 < args.len() {
                    parsed.user = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-url" => {
                if i + 1 < args.len() {
                    parsed.api_url = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--pretty" | "-p" => {
                parsed.pretty = true;
                i += 1;
            }
            other => {
                if parsed.input.is_none() {
                    parsed.input = Some(other.to_string());
                }
                i += 1;
            }
        }
    }
    parsed
}

pub(crate) fn parse_serve_flags(
    args: &[String],
    start: usize,
    mut host: String,
    mut port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().unwrap_or(port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--host" => {
                if i + 1 < args.len() {
                    host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (host, port)
}

pub(crate) fn parse_user_flag(args: &[String], start: usize) -> Option<String> {
    let mut i = start;
    while i < args.len() {
        if matches!(args[i].as_str(), "--user" | "-u") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

/// Returns whether the invoked command succeeded.
pub async fn run_main() -> Result<bool> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(true);
    }

    match args[1].as_str() {
        "serve" => {
            serve::run_serve(&args).await?;
            Ok(true)
        }
        "mcp" => {
            serve::run_mcp(parse_user_flag(&args, 2)).await?;
            Ok(true)
        }
        "commands" => {
            println!("{}", serde_json::to_string_pretty(&COMMANDS)?);
            Ok(true)
        }
        "doctor" => doctor::run_doctor().await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(true)
        }
        "version" | "--version" | "-V" => {
            println!("noisett {}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
        cmd if cmd.contains('.') => run::run_command(parse_command_args(&args, 1)).await,
        cmd => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(false)
        }
    }
}
