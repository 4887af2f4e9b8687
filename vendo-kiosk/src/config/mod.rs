//! Configuration module for vendo-kiosk.
//!
//! Handles loading configuration from TOML files and CLI overrides, then
//! validates it into the runtime types used by the processors.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use url::Url;
use vendo_core::config::{BrokerConfig, DispenseConfig, SessionConfig};

use crate::config::file::FileConfig;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid backend url: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Backend connection settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub admin_id: Option<String>,
    pub request_timeout: Duration,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub broker: BrokerConfig,
    pub session: SessionConfig,
    pub backend: BackendConfig,
    pub dispense: DispenseConfig,
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub broker_host: Option<String>,
    pub broker_port: Option<u16>,
    pub backend_url: Option<String>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    overrides: Overrides,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, overrides: Overrides) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// A missing file is not an error: the defaults are used instead.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.config_path.display(),
                    "Config file not found, using defaults"
                );
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        self.build(file_config)
    }

    fn build(&self, mut file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        if let Some(host) = &self.overrides.broker_host {
            file_config.broker.host = host.clone();
        }
        if let Some(port) = self.overrides.broker_port {
            file_config.broker.port = port;
        }
        if let Some(url) = &self.overrides.backend_url {
            file_config.backend.base_url = url.clone();
        }

        validate(&file_config)?;

        let broker = file_config.broker;
        let client_id = broker
            .client_id
            .unwrap_or_else(|| format!("vendo-kiosk-{}", uuid::Uuid::new_v4()));

        Ok(LoadedConfig {
            broker: BrokerConfig {
                host: broker.host,
                port: broker.port,
                client_id,
                request_topic: broker.request_topic,
                response_topic: broker.response_topic,
                request_payload: broker.request_payload,
                reconnect_interval: Duration::from_millis(broker.reconnect_interval_ms),
                keep_alive: Duration::from_secs(broker.keep_alive_secs),
            },
            session: SessionConfig {
                removal_timeout: Duration::from_millis(file_config.session.removal_timeout_ms),
            },
            backend: BackendConfig {
                base_url: Url::parse(&file_config.backend.base_url)?,
                admin_id: file_config.backend.admin_id,
                request_timeout: Duration::from_secs(file_config.backend.request_timeout_secs),
            },
            dispense: DispenseConfig {
                dwell: Duration::from_millis(file_config.dispensing.dwell_ms),
                grace: Duration::from_millis(file_config.dispensing.grace_ms),
            },
        })
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let broker = &config.broker;
    if broker.host.is_empty() {
        return Err(ConfigError::ValidationError("broker host is empty".to_string()));
    }
    if broker.port == 0 {
        return Err(ConfigError::ValidationError("broker port must not be 0".to_string()));
    }
    if broker.request_topic.is_empty() || broker.response_topic.is_empty() {
        return Err(ConfigError::ValidationError(
            "broker topics must not be empty".to_string(),
        ));
    }
    if broker.reconnect_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "reconnect_interval_ms must be positive".to_string(),
        ));
    }
    if config.session.removal_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "removal_timeout_ms must be positive".to_string(),
        ));
    }
    if config.dispensing.dwell_ms == 0 {
        return Err(ConfigError::ValidationError("dwell_ms must be positive".to_string()));
    }
    Ok(())
}
