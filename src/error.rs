//! Error taxonomy for the proxy.

use thiserror::Error;

use crate::driver::DriverError;

/// Errors returned by connection and proxy operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening or pinging a connection failed. Degrades readiness only.
    #[error("connection to {address} failed: {source}")]
    Connection {
        address: String,
        #[source]
        source: DriverError,
    },

    /// A read was rejected by the driver.
    #[error("query failed: {0}")]
    Query(#[source] DriverError),

    /// A write, prepare or transaction start was rejected by the driver.
    #[error("exec failed: {0}")]
    Exec(#[source] DriverError),

    /// Last failure seen while closing every connection.
    #[error("shutdown failed: {0}")]
    Shutdown(#[source] Box<Error>),

    /// The caller's cancellation token fired first.
    #[error("operation cancelled")]
    Cancelled,

    /// The connection was explicitly closed.
    #[error("connection {0} is closed")]
    Closed(String),

    /// No primary has been configured yet.
    #[error("no primary connection configured")]
    NoPrimary,
}

impl Error {
    /// Return true for failures that only affect readiness.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }
}

/// Result alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;
