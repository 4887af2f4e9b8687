//! TOML file configuration structures.
//!
//! These structs directly map to the `vendo-config.toml` file format.
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub broker: BrokerConfig,
    pub session: SessionConfig,
    pub backend: BackendConfig,
    pub dispensing: DispensingConfig,
}

/// Card-reader broker section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// MQTT client id. Generated per process when absent.
    pub client_id: Option<String>,
    pub request_topic: String,
    pub response_topic: String,
    pub request_payload: String,
    pub reconnect_interval_ms: u64,
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: None,
            request_topic: "card/request".to_string(),
            response_topic: "card/response".to_string(),
            request_payload: "get_current".to_string(),
            reconnect_interval_ms: 1000,
            keep_alive_secs: 5,
        }
    }
}

/// Card presence session section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub removal_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            removal_timeout_ms: 5000,
        }
    }
}

/// Vending backend section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Admin credential attached to backend requests, if any.
    pub admin_id: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            admin_id: None,
            request_timeout_secs: 30,
        }
    }
}

/// Dispensing screen section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispensingConfig {
    pub dwell_ms: u64,
    pub grace_ms: u64,
}

impl Default for DispensingConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 3000,
            grace_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[broker]
host = "10.0.0.5"
port = 9003
client_id = "kiosk-1"
response_topic = "reader/card"

[session]
removal_timeout_ms = 2500

[backend]
base_url = "http://backend:5001"
admin_id = "admin-7"

[dispensing]
dwell_ms = 1000
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.broker.host, "10.0.0.5");
        assert_eq!(config.broker.port, 9003);
        assert_eq!(config.broker.client_id.as_deref(), Some("kiosk-1"));
        assert_eq!(config.broker.response_topic, "reader/card");
        assert_eq!(config.broker.request_topic, "card/request");
        assert_eq!(config.session.removal_timeout_ms, 2500);
        assert_eq!(config.backend.admin_id.as_deref(), Some("admin-7"));
        assert_eq!(config.dispensing.dwell_ms, 1000);
        assert_eq!(config.dispensing.grace_ms, 5000);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.request_payload, "get_current");
        assert_eq!(config.session.removal_timeout_ms, 5000);
        assert_eq!(config.backend.base_url, "http://localhost:5001");
        assert_eq!(config.dispensing.grace_ms, 5000);
    }
}
