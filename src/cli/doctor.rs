use anyhow::Result;
use console::style;

use crate::core::config::{CONFIG_FILE, NoisettConfig};
use crate::core::generator::build_generator;
use crate::core::generator::registry::{BACKENDS, backend_def};
use crate::core::store::StoreKind;
use crate::core::terminal::{
    GuideSection, print_error, print_info, print_link, print_success, print_warn,
};
use crate::platform::{NativePlatform, Platform};

/// Prints a health report. Returns `false` when something would stop
/// jobs from completing.
pub async fn run_doctor() -> Result<bool> {
    let config = match NoisettConfig::load() {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("Configuration is invalid: {}", e));
            return Ok(false);
        }
    };
    let mut healthy = true;

    let config_file = config.data_dir.join(CONFIG_FILE);
    GuideSection::new("Configuration")
        .status("Data directory", &config.data_dir.display().to_string())
        .status(
            "Config file",
            &if config_file.exists() {
                config_file.display().to_string()
            } else {
                format!("{} (defaults)", style("none").dim())
            },
        )
        .status("Store", config.store.as_str())
        .status("Backend", config.backend.as_str())
        .status("Job timeout", &format!("{}s", config.job_timeout_secs))
        .status("Workers", &config.max_concurrent_jobs.to_string())
        .status(
            "Rate limit",
            &match config.rate_limit_per_minute {
                0 => "off".to_string(),
                n => format!("{n}/min per user"),
            },
        )
        .print();
    println!();

    if config.store == StoreKind::Sqlite {
        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            print_error(&format!(
                "Cannot create {}: {}",
                config.data_dir.display(),
                e
            ));
            healthy = false;
        } else {
            print_success(&format!(
                "Job database: {}",
                config.database_path().display()
            ));
        }
    } else {
        print_info("In-memory store: jobs are lost on restart.");
    }

    let mut keys = GuideSection::new("Backends");
    for def in BACKENDS.iter() {
        let line = match def.env_key {
            None => "no key needed".to_string(),
            Some(key) if key_configured(&config, key) => format!("{} set", key),
            Some(key) => format!("{} missing", key),
        };
        keys = keys.status(def.name, &line);
    }
    keys.print();
    println!();

    let generator = build_generator(&config);
    let status = generator.health_check().await;
    if status.is_available() {
        print_success(&format!(
            "Active backend {} is {}",
            config.backend,
            status.describe()
        ));
    } else {
        print_error(&format!(
            "Active backend {} is {}",
            config.backend,
            status.describe()
        ));
        if let Some(url) = backend_def(config.backend).signup_url {
            print_link("Get an API key", url);
        }
        healthy = false;
    }

    let pids = NativePlatform::find_pids_on_port(config.api_port);
    if pids.is_empty() {
        print_success(&format!("Port {} is free", config.api_port));
    } else {
        print_warn(&format!(
            "Port {} is in use by PID {} (a running 'noisett serve'?)",
            config.api_port,
            pids.join(", ")
        ));
    }

    Ok(healthy)
}

fn key_configured(config: &NoisettConfig, env_key: &str) -> bool {
    match env_key {
        "FIREWORKS_API_KEY" => config.fireworks_api_key.is_some(),
        "HF_TOKEN" => config.hf_token.is_some(),
        "REPLICATE_API_TOKEN" => config.replicate_api_token.is_some(),
        _ => false,
    }
}
