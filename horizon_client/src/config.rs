use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use horizon_schema::{MAX_CREATURES, MIN_CREATURES};
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_CLIENT_CONFIG: &str = include_str!("data/client_config.json");

pub const CONFIG_PATH_ENV: &str = "HORIZON_CLIENT_CONFIG_PATH";
pub const API_URL_ENV: &str = "HORIZON_API_URL";
pub const API_TOKEN_ENV: &str = "HORIZON_API_TOKEN";

/// Settings for talking to the simulation service and pacing the auto-loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub default_creature_count: u32,
    pub initial_cadence_ms: u64,
    /// Ask the engine to finalize a run once a creature is seen at the goal.
    pub confirm_goal_with_server: bool,
    /// Session token obtained by the login flow; sent as a bearer header.
    pub bearer_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/simulacao".to_string(),
            request_timeout_ms: 5_000,
            connect_timeout_ms: 2_000,
            default_creature_count: 5,
            initial_cadence_ms: 500,
            confirm_goal_with_server: true,
            bearer_token: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientConfigError {
    #[error("failed to parse client config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read client config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid client config: {0}")]
    Invalid(String),
}

impl ClientConfig {
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_CLIENT_CONFIG).unwrap_or_default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ClientConfigError> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ClientConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ClientConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ClientConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ClientConfigError::Invalid("base_url cannot be empty".into()));
        }
        if self.request_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(ClientConfigError::Invalid(
                "timeouts must be greater than zero".into(),
            ));
        }
        if !(MIN_CREATURES..=MAX_CREATURES).contains(&self.default_creature_count) {
            return Err(ClientConfigError::Invalid(format!(
                "default_creature_count must be between {MIN_CREATURES} and {MAX_CREATURES}"
            )));
        }
        if self.initial_cadence_ms == 0 {
            return Err(ClientConfigError::Invalid(
                "initial_cadence_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Applies `HORIZON_API_URL` / `HORIZON_API_TOKEN` style overrides.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(token) = lookup(API_TOKEN_ENV).filter(|value| !value.trim().is_empty()) {
            self.bearer_token = Some(token);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Loads the config named by `HORIZON_CLIENT_CONFIG_PATH`, falling back to the
/// builtin copy, then layers the environment overrides on top.
pub fn load_client_config_from_env() -> ClientConfig {
    let override_path = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    let mut config = match override_path {
        Some(path) => load_or_builtin(&path),
        None => {
            tracing::info!(target: "horizon::config", "client_config.loaded=builtin");
            ClientConfig::builtin()
        }
    };
    config.apply_overrides(|key| env::var(key).ok());
    config
}

pub fn load_or_builtin(path: &Path) -> ClientConfig {
    match ClientConfig::from_file(path) {
        Ok(config) => {
            tracing::info!(
                target: "horizon::config",
                path = %path.display(),
                "client_config.loaded=file"
            );
            config
        }
        Err(err) => {
            tracing::warn!(
                target: "horizon::config",
                path = %path.display(),
                error = %err,
                "client_config.load_failed"
            );
            ClientConfig::builtin()
        }
    }
}
