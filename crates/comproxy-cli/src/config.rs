//! Configuration loading.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `comproxy.{yaml,toml,json}` in the working directory, the file given on
//! the command line, then `COMPROXY__*` environment variables
//! (e.g. `COMPROXY__UPSTREAM__URL`).

use ::config::{Config, Environment, File};
use comproxy_proxy::{CachePolicyConfig, UpstreamConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "comproxy";
const ENV_PREFIX: &str = "COMPROXY";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load configuration: {0}")]
    Build(#[from] ::config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Full server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CachePolicyConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Base URL clients use to reach this proxy. Written into synthesized
    /// indexes and rewritten provider documents.
    pub public_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            public_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory of the filesystem backend.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            path: PathBuf::from("./data/comproxy"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    fn validate(&self) -> Result<(), LoadError> {
        self.upstream
            .base_url()
            .map_err(|e| LoadError::Invalid(e.to_string()))?;

        let public_url = Url::parse(&self.server.public_url).map_err(|e| {
            LoadError::Invalid(format!("server.public_url {:?}: {}", self.server.public_url, e))
        })?;
        if public_url.cannot_be_a_base() {
            return Err(LoadError::Invalid(format!(
                "server.public_url {:?} is not a base url",
                self.server.public_url
            )));
        }
        self.cache
            .controllers()
            .map_err(|e| LoadError::Invalid(format!("cache: {}", e)))?;
        if self.server.request_timeout_secs == 0 {
            return Err(LoadError::Invalid("server.request_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

/// Load settings from the default sources plus an optional explicit file.
pub fn load(path: Option<&Path>) -> Result<Settings, LoadError> {
    load_with(path, environment())
}

fn load_with(path: Option<&Path>, environment: Environment) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let settings: Settings = builder
        .add_source(environment)
        .build()?
        .try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
