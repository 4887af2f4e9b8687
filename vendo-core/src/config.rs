//! Runtime configuration types shared by the processors.
//!
//! These are the validated values; file parsing and CLI overrides are the
//! binary's job.

use std::time::Duration;

/// Connection settings for the card-reader broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Topic the "request current state" token is published to.
    pub request_topic: String,
    /// Topic the reader publishes card snapshots on.
    pub response_topic: String,
    pub request_payload: String,
    /// Fixed delay between reconnection attempts.
    pub reconnect_interval: Duration,
    pub keep_alive: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "vendo-kiosk".to_string(),
            request_topic: "card/request".to_string(),
            response_topic: "card/response".to_string(),
            request_payload: "get_current".to_string(),
            reconnect_interval: Duration::from_millis(1000),
            keep_alive: Duration::from_secs(5),
        }
    }
}

/// Card presence session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a `null` snapshot must stand unchallenged before the card
    /// is considered removed.
    pub removal_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            removal_timeout: Duration::from_millis(5000),
        }
    }
}

/// Dispensing run timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispenseConfig {
    /// Time a single unit spends in `Dispensing`.
    pub dwell: Duration,
    /// Delay between completion and leaving the dispensing screen.
    pub grace: Duration,
}

impl Default for DispenseConfig {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(3000),
            grace: Duration::from_millis(5000),
        }
    }
}
