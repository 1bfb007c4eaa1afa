use crate::microphone::MicrophonePolicy;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use voxlink_core::{ControllerConfig, retry::RetryPolicy};

pub const DEFAULT_API_URL: &str = "https://hackthon-backend-zeta.vercel.app";
const KEEP_ALIVE_RANGE_SECS: std::ops::RangeInclusive<u64> = 10..=30;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub keep_alive_interval: Duration,
    pub polling_enabled: bool,
    pub fetch_agent_id: bool,
    pub max_reconnect_attempts: u32,
    pub microphone: MicrophonePolicy,
    pub user_id_path: PathBuf,
    pub log_level: Level,
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}

fn bool_var(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_bool(name, &raw),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_url = std::env::var("API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if api_url.is_empty() {
            return Err(ConfigError::MissingVar(
                "API_URL is set but empty".to_string(),
            ));
        }

        let keep_alive_str = std::env::var("KEEP_ALIVE_SECS").unwrap_or_else(|_| "20".to_string());
        let keep_alive_secs = keep_alive_str.parse::<u64>().map_err(|e| {
            ConfigError::InvalidValue("KEEP_ALIVE_SECS".to_string(), e.to_string())
        })?;
        if !KEEP_ALIVE_RANGE_SECS.contains(&keep_alive_secs) {
            return Err(ConfigError::InvalidValue(
                "KEEP_ALIVE_SECS".to_string(),
                format!(
                    "{} is outside {}..={}",
                    keep_alive_secs,
                    KEEP_ALIVE_RANGE_SECS.start(),
                    KEEP_ALIVE_RANGE_SECS.end()
                ),
            ));
        }

        let polling_enabled = bool_var("POLLING_ENABLED", true)?;
        let fetch_agent_id = bool_var("FETCH_AGENT_ID", false)?;

        let attempts_str =
            std::env::var("MAX_RECONNECT_ATTEMPTS").unwrap_or_else(|_| "5".to_string());
        let max_reconnect_attempts = attempts_str.parse::<u32>().map_err(|e| {
            ConfigError::InvalidValue("MAX_RECONNECT_ATTEMPTS".to_string(), e.to_string())
        })?;

        let microphone_str =
            std::env::var("MICROPHONE_ACCESS").unwrap_or_else(|_| "granted".to_string());
        let microphone = microphone_str.parse::<MicrophonePolicy>().map_err(|_| {
            ConfigError::InvalidValue(
                "MICROPHONE_ACCESS".to_string(),
                format!("'{}' is not one of granted, denied", microphone_str),
            )
        })?;

        let user_id_path = std::env::var("USER_ID_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".voxlink/user_id"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_url,
            keep_alive_interval: Duration::from_secs(keep_alive_secs),
            polling_enabled,
            fetch_agent_id,
            max_reconnect_attempts,
            microphone,
            user_id_path,
            log_level,
        })
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            keep_alive_interval: self.keep_alive_interval,
            polling_enabled: self.polling_enabled,
            fetch_agent_id: self.fetch_agent_id,
            retry: RetryPolicy::default().with_max_attempts(self.max_reconnect_attempts),
            ..ControllerConfig::default()
        }
    }
}
