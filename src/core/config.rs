//! Layered configuration.
//!
//! Precedence, highest wins:
//! 1. Environment variables (`NOISETT_*` plus the backends' own key variables)
//! 2. `<data_dir>/config.toml`
//! 3. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::generator::BackendKind;
use crate::core::store::StoreKind;
use crate::platform::{NativePlatform, Platform};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoisettConfig {
    pub backend: BackendKind,
    pub store: StoreKind,
    pub api_host: String,
    pub api_port: u16,
    pub job_timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    pub rate_limit_per_minute: u32,
    pub poll_interval_ms: u64,
    pub log_level: String,
    pub recover_on_start: bool,
    pub mock_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fireworks_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hf_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicate_api_token: Option<String>,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl Default for NoisettConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Mock,
            store: StoreKind::Sqlite,
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            job_timeout_secs: 300,
            max_concurrent_jobs: 2,
            rate_limit_per_minute: 30,
            poll_interval_ms: 250,
            log_level: "info".to_string(),
            recover_on_start: true,
            mock_delay_ms: 250,
            fireworks_api_key: None,
            hf_token: None,
            replicate_api_token: None,
            data_dir: PathBuf::from(".noisett"),
        }
    }
}

impl NoisettConfig {
    /// Loads from the process environment and the default data directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(NativePlatform::data_dir(), |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(data_dir: PathBuf, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_file(&path)?
        } else {
            Self::default()
        };
        config.data_dir = data_dir;
        config.apply_env(env)?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("NOISETT_BACKEND") {
            self.backend = BackendKind::parse(&v).ok_or_else(|| invalid("NOISETT_BACKEND", &v))?;
        }
        if let Some(v) = env("NOISETT_STORE") {
            self.store = StoreKind::parse(&v).ok_or_else(|| invalid("NOISETT_STORE", &v))?;
        }
        if let Some(v) = env("NOISETT_API_HOST") {
            self.api_host = v;
        }
        if let Some(v) = env("NOISETT_API_PORT") {
            self.api_port = parse_num("NOISETT_API_PORT", &v)?;
        }
        if let Some(v) = env("NOISETT_JOB_TIMEOUT_SECS") {
            self.job_timeout_secs = parse_num("NOISETT_JOB_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = env("NOISETT_MAX_CONCURRENT_JOBS") {
            self.max_concurrent_jobs = parse_num("NOISETT_MAX_CONCURRENT_JOBS", &v)?;
        }
        if let Some(v) = env("NOISETT_RATE_LIMIT_PER_MINUTE") {
            self.rate_limit_per_minute = parse_num("NOISETT_RATE_LIMIT_PER_MINUTE", &v)?;
        }
        if let Some(v) = env("NOISETT_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_num("NOISETT_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = env("NOISETT_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = env("NOISETT_RECOVER_ON_START") {
            self.recover_on_start = parse_num("NOISETT_RECOVER_ON_START", &v)?;
        }
        if let Some(v) = env("NOISETT_MOCK_DELAY_MS") {
            self.mock_delay_ms = parse_num("NOISETT_MOCK_DELAY_MS", &v)?;
        }
        if let Some(v) = env("FIREWORKS_API_KEY").filter(|v| !v.is_empty()) {
            self.fireworks_api_key = Some(v);
        }
        if let Some(v) = env("HF_TOKEN").filter(|v| !v.is_empty()) {
            self.hf_token = Some(v);
        }
        if let Some(v) = env("REPLICATE_API_TOKEN").filter(|v| !v.is_empty()) {
            self.replicate_api_token = Some(v);
        }
        if self.max_concurrent_jobs == 0 {
            return Err(invalid("max_concurrent_jobs", "0"));
        }
        if self.job_timeout_secs == 0 {
            return Err(invalid("job_timeout_secs", "0"));
        }
        Ok(())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("jobs.db")
    }

    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}
