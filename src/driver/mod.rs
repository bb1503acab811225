//! Database driver abstraction.
//!
//! # Data Flow
//! ```text
//! ConnectionConfig
//!     → dsn.rs (connection string, parseTime forced on)
//!     → Connector::open (driver specific, e.g. mysql.rs)
//!     → DriverConnection (pooled handle owned by one Connection)
//! ```
//!
//! # Design Decisions
//! - The proxy never interprets rows, results or statements; they are
//!   associated types passed through untouched
//! - Driver errors are boxed and carried as the `source` of crate errors
//! - Pool tuning is pushed down to the driver, which owns the real pool

use std::time::Duration;

use async_trait::async_trait;

pub mod dsn;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(test)]
pub(crate) mod stub;

pub use dsn::Dsn;

use crate::config::PoolConfig;

/// Error produced by a driver, passed to callers unchanged.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Opens driver handles from connection strings.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: DriverConnection;

    async fn open(&self, dsn: &Dsn) -> Result<Self::Connection, DriverError>;
}

/// An open driver handle, usually a pool of physical connections.
#[async_trait]
pub trait DriverConnection: Send + Sync + 'static {
    /// Bound arguments for a statement.
    type Params: Send + 'static;
    /// Result set of a query.
    type Rows: Send + 'static;
    /// Single row of a query.
    type Row: Send + 'static;
    /// Outcome of a write.
    type ExecResult: Send + 'static;
    /// Prepared statement.
    type Statement: Send + 'static;
    /// Open transaction.
    type Transaction: Send + 'static;

    async fn ping(&self) -> Result<(), DriverError>;

    async fn query(&self, sql: &str, params: Self::Params) -> Result<Self::Rows, DriverError>;

    async fn query_row(
        &self,
        sql: &str,
        params: Self::Params,
    ) -> Result<Option<Self::Row>, DriverError>;

    async fn exec(&self, sql: &str, params: Self::Params)
        -> Result<Self::ExecResult, DriverError>;

    async fn prepare(&self, sql: &str) -> Result<Self::Statement, DriverError>;

    async fn begin(&self) -> Result<Self::Transaction, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;

    fn set_conn_max_lifetime(&self, lifetime: Duration);

    fn set_max_idle_conns(&self, n: usize);

    fn set_max_open_conns(&self, n: usize);
}

/// Pool settings recorded per connection and replayed onto new handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolTuning {
    pub max_idle_conns: Option<usize>,
    pub max_open_conns: Option<usize>,
    pub conn_max_lifetime: Option<Duration>,
}

impl PoolTuning {
    /// Push every recorded setting onto a driver handle.
    pub fn apply<D: DriverConnection + ?Sized>(&self, driver: &D) {
        if let Some(lifetime) = self.conn_max_lifetime {
            driver.set_conn_max_lifetime(lifetime);
        }
        if let Some(n) = self.max_idle_conns {
            driver.set_max_idle_conns(n);
        }
        if let Some(n) = self.max_open_conns {
            driver.set_max_open_conns(n);
        }
    }
}

impl From<&PoolConfig> for PoolTuning {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_idle_conns: config.max_idle_conns,
            max_open_conns: config.max_open_conns,
            conn_max_lifetime: config.conn_max_lifetime_secs.map(Duration::from_secs),
        }
    }
}

pub type Params<C> = <<C as Connector>::Connection as DriverConnection>::Params;
pub type Rows<C> = <<C as Connector>::Connection as DriverConnection>::Rows;
pub type Row<C> = <<C as Connector>::Connection as DriverConnection>::Row;
pub type ExecResult<C> = <<C as Connector>::Connection as DriverConnection>::ExecResult;
pub type Statement<C> = <<C as Connector>::Connection as DriverConnection>::Statement;
pub type Transaction<C> = <<C as Connector>::Connection as DriverConnection>::Transaction;
