//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse but make no
//! sense. Every violation is collected, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{ConnectionConfig, ProxyConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new(
            "health_check.interval_secs",
            "must be greater than zero",
        ));
    }
    if config.health_check.timeout_secs == 0 {
        errors.push(ValidationError::new(
            "health_check.timeout_secs",
            "must be greater than zero",
        ));
    }

    if let Some(primary) = &config.primary {
        check_connection("primary", primary, &mut errors);
    }
    for (i, replica) in config.replicas.iter().enumerate() {
        check_connection(&format!("replicas[{}]", i), replica, &mut errors);
    }

    if let (Some(idle), Some(open)) = (config.pool.max_idle_conns, config.pool.max_open_conns) {
        if open < idle {
            errors.push(ValidationError::new(
                "pool.max_open_conns",
                format!("must be at least max_idle_conns ({})", idle),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_connection(prefix: &str, conn: &ConnectionConfig, errors: &mut Vec<ValidationError>) {
    if conn.address.trim().is_empty() {
        errors.push(ValidationError::new(format!("{}.address", prefix), "must not be empty"));
    }
    if conn.database.trim().is_empty() {
        errors.push(ValidationError::new(format!("{}.database", prefix), "must not be empty"));
    }
}
