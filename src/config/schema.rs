//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the database proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Primary (read/write) connection.
    pub primary: Option<ConnectionConfig>,

    /// Read-only replicas, registered in order.
    pub replicas: Vec<ConnectionConfig>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Pool tuning applied to every connection.
    pub pool: PoolConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Identity of a single database connection.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Database (schema) name.
    pub database: String,

    /// Host and port, e.g. "127.0.0.1:3306".
    pub address: String,

    pub username: String,

    pub password: String,

    /// Extra connection-string parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(
        database: impl Into<String>,
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            address: address.into(),
            username: username.into(),
            password: password.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add an extra connection-string parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("database", &self.database)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"***")
            .field("params", &self.params)
            .finish()
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Interval between health-check ticks in seconds.
    pub interval_secs: u64,

    /// Per-ping timeout in seconds.
    pub timeout_secs: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 5,
        }
    }
}

/// Pool tuning forwarded to the driver. Unset fields keep driver defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum idle connections kept per pool.
    pub max_idle_conns: Option<usize>,

    /// Maximum open connections per pool.
    pub max_open_conns: Option<usize>,

    /// Maximum lifetime of a pooled connection in seconds.
    pub conn_max_lifetime_secs: Option<u64>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
