//! Provider configuration
//!
//! Credentials come from the environment; reconciliation timings come from an
//! optional YAML file where every field falls back to a default.

use crate::error::{Result, SoftLayerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tessera_cloud::{PollStatus, StateWait};

pub const DEFAULT_ENDPOINT: &str = "https://api.softlayer.com/rest/v3.1";

/// SoftLayer API credentials
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub username: String,
    pub api_key: String,
    pub endpoint: String,
}

impl ApiConfig {
    /// Read `SOFTLAYER_USERNAME`, `SOFTLAYER_API_KEY` and the optional `SOFTLAYER_ENDPOINT_URL`
    pub fn from_env() -> Result<Self> {
        let username = std::env::var("SOFTLAYER_USERNAME")
            .map_err(|_| SoftLayerError::MissingEnvVar("SOFTLAYER_USERNAME".to_string()))?;
        let api_key = std::env::var("SOFTLAYER_API_KEY")
            .map_err(|_| SoftLayerError::MissingEnvVar("SOFTLAYER_API_KEY".to_string()))?;
        let endpoint = std::env::var("SOFTLAYER_ENDPOINT_URL")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            username,
            api_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

/// Timing knobs for the asynchronous flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Time for an order to materialize into an object (seconds)
    #[serde(default = "default_order_timeout")]
    pub order_timeout_secs: u64,

    /// Time for a routing transaction to finish (seconds)
    #[serde(default = "default_routing_timeout")]
    pub routing_timeout_secs: u64,

    /// Time for a live load balancer push to be accepted (seconds)
    #[serde(default = "default_live_push_timeout")]
    pub live_push_timeout_secs: u64,

    /// Time for a firewall update request to be applied (seconds)
    #[serde(default = "default_firewall_timeout")]
    pub firewall_timeout_secs: u64,

    /// First delay between probes (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Floor for delays between probes (milliseconds)
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Pause between the two HA node registrations (seconds)
    #[serde(default = "default_ha_settle_delay")]
    pub ha_settle_delay_secs: u64,
}

fn default_order_timeout() -> u64 {
    30 * 60
}
fn default_routing_timeout() -> u64 {
    30 * 60
}
fn default_live_push_timeout() -> u64 {
    10 * 60
}
fn default_firewall_timeout() -> u64 {
    15 * 60
}
fn default_poll_interval() -> u64 {
    10_000
}
fn default_min_interval() -> u64 {
    3_000
}
fn default_ha_settle_delay() -> u64 {
    10
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            order_timeout_secs: default_order_timeout(),
            routing_timeout_secs: default_routing_timeout(),
            live_push_timeout_secs: default_live_push_timeout(),
            firewall_timeout_secs: default_firewall_timeout(),
            poll_interval_ms: default_poll_interval(),
            min_interval_ms: default_min_interval(),
            ha_settle_delay_secs: default_ha_settle_delay(),
        }
    }
}

impl ReconcileConfig {
    /// Load from a YAML file; absent fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ReconcileConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 && self.min_interval_ms == 0 {
            return Err(SoftLayerError::InvalidConfig(
                "poll_interval_ms and min_interval_ms cannot both be 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ha_settle_delay(&self) -> Duration {
        Duration::from_secs(self.ha_settle_delay_secs)
    }

    fn base_wait(&self, operation: &str, timeout_secs: u64) -> StateWait {
        StateWait::new(operation)
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_min_interval(Duration::from_millis(self.min_interval_ms))
    }

    /// Order → object discovery
    pub fn order_wait(&self) -> StateWait {
        self.base_wait("order fulfilment", self.order_timeout_secs)
    }

    /// Routing-change transaction
    pub fn routing_wait(&self) -> StateWait {
        self.base_wait("routing transaction", self.routing_timeout_secs)
    }

    /// Live configuration push, re-issued every tick until accepted
    pub fn live_push_wait(&self) -> StateWait {
        self.base_wait("live configuration push", self.live_push_timeout_secs)
            .pending(&[PollStatus::InProgress])
            .target(&[PollStatus::Complete])
            .mutating_retry()
    }

    /// Firewall update request
    pub fn firewall_wait(&self) -> StateWait {
        self.base_wait("firewall update", self.firewall_timeout_secs)
    }
}
