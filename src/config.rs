//! Agent configuration
//!
//! The host application owns configuration parsing; this module only holds
//! the knobs the live metrics pipeline itself consumes, with defaults that
//! match the service contract. Endpoint and instrumentation key arrive as
//! suppliers so the host can rotate them without restarting the agent.

use crate::constants::{intervals, limits};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Supplies the live endpoint root; re-read when building request URLs
pub type EndpointSupplier = Arc<dyn Fn() -> String + Send + Sync>;

/// Supplies the instrumentation key; `None` keeps the collector silent
pub type KeySupplier = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Tunables for the live metrics pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveMetricsConfig {
    /// Delay between keep-alive pings while nobody is watching
    #[serde(default = "default_ping_interval", with = "duration_millis")]
    pub ping_interval: Duration,

    /// Delay between posts while the service is collecting
    #[serde(default = "default_post_interval", with = "duration_millis")]
    pub post_interval: Duration,

    /// Pause after repeated post failures before probing again
    #[serde(default = "default_wait_on_error", with = "duration_millis")]
    pub wait_on_error: Duration,

    /// Caller-side timeout for every outbound HTTP call
    #[serde(default = "default_http_timeout", with = "duration_millis")]
    pub http_timeout: Duration,

    /// Consecutive post failures that trigger error backoff
    #[serde(default = "default_max_post_failures")]
    pub max_post_failures: u32,

    /// Cloud role name reported to the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,

    /// Role instance; falls back to the machine name when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_instance: Option<String>,

    /// Agent version string carried in envelopes
    #[serde(default = "default_version")]
    pub version: String,

    /// Report CPU as the literal per-core percentage instead of dividing
    /// by the core count, for dashboards built on the historic definition
    #[serde(default)]
    pub back_compat_non_normalized_cpu: bool,
}

impl Default for LiveMetricsConfig {
    fn default() -> Self {
        Self {
            ping_interval: default_ping_interval(),
            post_interval: default_post_interval(),
            wait_on_error: default_wait_on_error(),
            http_timeout: default_http_timeout(),
            max_post_failures: default_max_post_failures(),
            role_name: None,
            role_instance: None,
            version: default_version(),
            back_compat_non_normalized_cpu: false,
        }
    }
}

impl LiveMetricsConfig {
    /// Reject configurations the coordinator cannot run on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("ping_interval"));
        }
        if self.post_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("post_interval"));
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::ZeroInterval("http_timeout"));
        }
        if self.max_post_failures == 0 {
            return Err(ConfigError::ZeroThreshold("max_post_failures"));
        }
        Ok(())
    }
}

fn default_ping_interval() -> Duration {
    intervals::PING
}

fn default_post_interval() -> Duration {
    intervals::POST
}

fn default_wait_on_error() -> Duration {
    intervals::WAIT_ON_ERROR
}

fn default_http_timeout() -> Duration {
    intervals::HTTP_TIMEOUT
}

fn default_max_post_failures() -> u32 {
    limits::MAX_POST_FAILURES
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Construction-time configuration failures
///
/// Fatal to the agent but never to the host; the caller decides whether to
/// run without live metrics.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("{0} must be at least one")]
    ZeroThreshold(&'static str),

    #[error("live endpoint is not configured")]
    MissingEndpoint,

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Identity stamped on every envelope and request header set
///
/// The stream id is generated once per process and correlates ping and post
/// traffic on the service side.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    /// Random 128-bit identifier as 32 hex characters
    pub stream_id: String,
    pub machine_name: String,
    pub instance_name: String,
    pub role_name: Option<String>,
    pub version: String,
}

impl AgentIdentity {
    #[must_use]
    pub fn from_config(config: &LiveMetricsConfig) -> Self {
        let machine_name = sysinfo::System::host_name().unwrap_or_default();
        let instance_name = config
            .role_instance
            .clone()
            .filter(|instance| !instance.is_empty())
            .or_else(|| (!machine_name.is_empty()).then(|| machine_name.clone()))
            .unwrap_or_else(|| "Unknown host".to_string());

        Self {
            stream_id: Uuid::new_v4().simple().to_string(),
            machine_name,
            instance_name,
            role_name: config.role_name.clone(),
            version: config.version.clone(),
        }
    }
}

/// Serialize a `Duration` as whole milliseconds
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
