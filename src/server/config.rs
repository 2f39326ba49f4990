use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::monitor::scheduler::DEFAULT_MAX_IN_FLIGHT;
use crate::notifications::models::NotificationTemplates;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub starttls: bool,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub database_url: String,
    pub log_dir: String,
    pub http_timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub max_in_flight_per_target: usize,
    /// `None` when no SMTP host is configured; notifications are then logged.
    pub smtp: Option<SmtpSettings>,
    pub templates: NotificationTemplates,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialMonitorConfig {
    database_url: Option<String>,
    log_dir: Option<String>,
    http_timeout_seconds: Option<u64>,
    probe_timeout_seconds: Option<u64>,
    max_in_flight_per_target: Option<usize>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    smtp_from: Option<String>,
    smtp_starttls: Option<bool>,
}

#[derive(Deserialize, Default, Debug)]
struct FileConfig {
    #[serde(flatten)]
    settings: PartialMonitorConfig,
    templates: Option<NotificationTemplates>,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_PROBE_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_SMTP_PORT: u16 = 587;

impl MonitorConfig {
    /// Loads `.env`, the optional TOML file, then environment variables.
    /// Environment values override file values.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path) => read_file(Path::new(path))?,
            None => FileConfig::default(),
        };
        let env_config: PartialMonitorConfig = envy::from_env()?;

        merge(file_config, env_config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(file: FileConfig, env: PartialMonitorConfig) -> Result<MonitorConfig, ConfigError> {
    let FileConfig {
        settings: file,
        templates,
    } = file;

    let database_url = env
        .database_url
        .or(file.database_url)
        .filter(|url| !url.trim().is_empty())
        .ok_or(ConfigError::Missing("DATABASE_URL"))?;

    let http_timeout_seconds = env
        .http_timeout_seconds
        .or(file.http_timeout_seconds)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECONDS);
    let probe_timeout_seconds = env
        .probe_timeout_seconds
        .or(file.probe_timeout_seconds)
        .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECONDS);
    let max_in_flight_per_target = env
        .max_in_flight_per_target
        .or(file.max_in_flight_per_target)
        .unwrap_or(DEFAULT_MAX_IN_FLIGHT);

    if http_timeout_seconds == 0 || probe_timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "timeouts must be at least one second".to_string(),
        ));
    }
    if max_in_flight_per_target == 0 {
        return Err(ConfigError::Invalid(
            "max_in_flight_per_target must be at least 1".to_string(),
        ));
    }

    let smtp = match env.smtp_host.or(file.smtp_host) {
        Some(host) if !host.trim().is_empty() => Some(SmtpSettings {
            host,
            port: env.smtp_port.or(file.smtp_port).unwrap_or(DEFAULT_SMTP_PORT),
            username: env.smtp_username.or(file.smtp_username),
            password: env.smtp_password.or(file.smtp_password),
            from: env
                .smtp_from
                .or(file.smtp_from)
                .ok_or(ConfigError::Missing("SMTP_FROM"))?,
            starttls: env.smtp_starttls.or(file.smtp_starttls).unwrap_or(true),
        }),
        _ => None,
    };

    Ok(MonitorConfig {
        database_url,
        log_dir: env
            .log_dir
            .or(file.log_dir)
            .unwrap_or_else(default_log_dir),
        http_timeout_seconds,
        probe_timeout_seconds,
        max_in_flight_per_target,
        smtp,
        templates: templates.unwrap_or_default(),
    })
}
