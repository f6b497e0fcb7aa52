//! Environment configuration.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::{EngineConfig, DEFAULT_TOOL_HINT_THRESHOLD};

pub const TOOL_HINT_THRESHOLD_ENV: &str = "STEPWISE_TOOL_HINT_THRESHOLD";
pub const LOG_FILTER_ENV: &str = "STEPWISE_LOG";
pub const SESSION_DIR_ENV: &str = "STEPWISE_SESSION_DIR";
pub const SERVER_ENV: &str = "STEPWISE_SERVER";

pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidThreshold { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub tool_hint_threshold: usize,
    pub log_filter: String,
    pub session_dir: Option<PathBuf>,
    pub server: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let tool_hint_threshold = match env_string_opt(TOOL_HINT_THRESHOLD_ENV) {
            Some(value) => parse_threshold(&value)?,
            None => DEFAULT_TOOL_HINT_THRESHOLD,
        };

        Ok(Self {
            tool_hint_threshold,
            log_filter: env_string_opt(LOG_FILTER_ENV)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            session_dir: env_string_opt(SESSION_DIR_ENV).map(PathBuf::from),
            server: env_string_opt(SERVER_ENV),
        })
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tool_hint_threshold: self.tool_hint_threshold,
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            tool_hint_threshold: DEFAULT_TOOL_HINT_THRESHOLD,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            session_dir: None,
            server: None,
        }
    }
}

fn parse_threshold(value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(threshold) if threshold > 0 => Ok(threshold),
        _ => Err(ConfigError::InvalidThreshold {
            key: TOOL_HINT_THRESHOLD_ENV,
            value: value.to_string(),
        }),
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
