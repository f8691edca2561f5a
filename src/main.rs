mod cli;
mod core;
mod interfaces;
mod logging;
mod platform;

use crate::core::terminal;

#[tokio::main]
async fn main() {
    match cli::run_main().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            terminal::print_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}
