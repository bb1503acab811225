//! Proxied connection abstraction.
//!
//! # Responsibilities
//! - Represent a single primary or replica connection
//! - Own the driver handle and forward calls to it unchanged
//! - Track readiness through the connection state machine
//! - Remember pool tuning and replay it onto reconnected handles

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionConfig;
use crate::driver::{
    Connector, DriverConnection, Dsn, ExecResult, Params, PoolTuning, Row, Rows, Statement,
    Transaction,
};
use crate::error::{Error, Result};
use crate::health::state::ConnectionState;
use crate::load_balancer::Readiness;

/// Which side of the proxy a connection serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Replica,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Replica => f.write_str("replica"),
        }
    }
}

/// A single database connection behind the proxy.
pub struct Connection<C: Connector> {
    role: Role,
    dsn: Dsn,
    connector: Arc<C>,
    handle: ArcSwapOption<C::Connection>,
    state: AtomicU8,
    tuning: Mutex<PoolTuning>,
    // Serializes open attempts; held across `Connector::open`.
    connecting: tokio::sync::Mutex<()>,
}

impl<C: Connector> Connection<C> {
    /// Create an unconnected connection. Call `connect` before use.
    pub fn new(role: Role, config: &ConnectionConfig, connector: Arc<C>) -> Self {
        Self {
            role,
            dsn: Dsn::new(config),
            connector,
            handle: ArcSwapOption::empty(),
            state: AtomicU8::new(ConnectionState::Unconnected as u8),
            tuning: Mutex::new(PoolTuning::default()),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn address(&self) -> &str {
        self.dsn.address()
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn pool_tuning(&self) -> PoolTuning {
        *self.tuning.lock()
    }

    /// Move to `next` unless closed. Returns the previous state.
    fn transition(&self, next: ConnectionState) -> ConnectionState {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == ConnectionState::Closed as u8 {
                    None
                } else {
                    Some(next as u8)
                }
            })
            .unwrap_or_else(|current| current);
        let prev = ConnectionState::from(prev);

        match (prev, next) {
            (ConnectionState::Ready, ConnectionState::Unready) => {
                tracing::warn!(role = %self.role, address = %self.address(), "Connection became unready");
            }
            (ConnectionState::Unready, ConnectionState::Ready) => {
                tracing::info!(role = %self.role, address = %self.address(), "Connection recovered");
            }
            _ => {}
        }
        prev
    }

    fn connection_error(&self, source: crate::driver::DriverError) -> Error {
        Error::Connection {
            address: self.address().to_string(),
            source,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Err(Error::Closed(self.address().to_string()));
        }
        Ok(())
    }

    fn driver(&self) -> Result<Arc<C::Connection>> {
        self.ensure_open()?;
        self.handle
            .load_full()
            .ok_or_else(|| self.connection_error("not connected".into()))
    }

    /// Open the driver handle. Ready on success, Unready on failure.
    /// An existing handle is replaced and closed.
    pub async fn connect(&self) -> Result<()> {
        self.open_handle(false).await
    }

    async fn open_handle(&self, only_if_absent: bool) -> Result<()> {
        let _guard = self.connecting.lock().await;
        self.ensure_open()?;
        if only_if_absent && self.handle.load().is_some() {
            // Another caller opened it while we waited for the lock.
            return Ok(());
        }
        self.transition(ConnectionState::Connecting);

        let driver = match self.connector.open(&self.dsn).await {
            Ok(driver) => driver,
            Err(source) => {
                self.transition(ConnectionState::Unready);
                tracing::error!(
                    role = %self.role,
                    dsn = %self.dsn.redacted(),
                    error = %source,
                    "Connection failed"
                );
                return Err(self.connection_error(source));
            }
        };

        self.pool_tuning().apply(&driver);
        let previous = self.handle.swap(Some(Arc::new(driver)));

        // `close` may have run while the driver was opening; whichever side
        // takes the handle out of the slot closes it.
        if self.state() == ConnectionState::Closed {
            if let Some(orphan) = self.handle.swap(None) {
                if let Err(e) = orphan.close().await {
                    tracing::warn!(address = %self.address(), error = %e, "Failed to close handle opened during shutdown");
                }
            }
            self.close_replaced(previous).await;
            return Err(Error::Closed(self.address().to_string()));
        }

        self.transition(ConnectionState::Ready);
        tracing::info!(role = %self.role, dsn = %self.dsn.redacted(), "Connected");
        self.close_replaced(previous).await;
        Ok(())
    }

    async fn close_replaced(&self, previous: Option<Arc<C::Connection>>) {
        if let Some(previous) = previous {
            if let Err(e) = previous.close().await {
                tracing::warn!(address = %self.address(), error = %e, "Failed to close replaced handle");
            }
        }
    }

    /// Probe liveness and update readiness. A connection that never opened
    /// retries its connect instead.
    pub async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        let Some(driver) = self.handle.load_full() else {
            return self.open_handle(true).await;
        };

        match driver.ping().await {
            Ok(()) => {
                self.transition(ConnectionState::Ready);
                Ok(())
            }
            Err(source) => {
                self.transition(ConnectionState::Unready);
                Err(self.connection_error(source))
            }
        }
    }

    /// `ping`, abandoned when the token fires. Readiness is left untouched
    /// on cancellation.
    pub async fn ping_cancellable(&self, token: &CancellationToken) -> Result<()> {
        cancellable(token, self.ping()).await
    }

    /// `ping` bounded by `timeout`. Elapsing counts as a failed probe.
    pub async fn ping_timeout(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.ping()).await {
            Ok(result) => result,
            Err(_) => {
                self.transition(ConnectionState::Unready);
                Err(self.connection_error(
                    format!("ping timed out after {:?}", timeout).into(),
                ))
            }
        }
    }

    pub async fn query(&self, sql: &str, params: Params<C>) -> Result<Rows<C>> {
        let driver = self.driver()?;
        driver.query(sql, params).await.map_err(Error::Query)
    }

    pub async fn query_cancellable(
        &self,
        token: &CancellationToken,
        sql: &str,
        params: Params<C>,
    ) -> Result<Rows<C>> {
        cancellable(token, self.query(sql, params)).await
    }

    pub async fn query_row(&self, sql: &str, params: Params<C>) -> Result<Option<Row<C>>> {
        let driver = self.driver()?;
        driver.query_row(sql, params).await.map_err(Error::Query)
    }

    pub async fn query_row_cancellable(
        &self,
        token: &CancellationToken,
        sql: &str,
        params: Params<C>,
    ) -> Result<Option<Row<C>>> {
        cancellable(token, self.query_row(sql, params)).await
    }

    pub async fn exec(&self, sql: &str, params: Params<C>) -> Result<ExecResult<C>> {
        let driver = self.driver()?;
        driver.exec(sql, params).await.map_err(Error::Exec)
    }

    pub async fn exec_cancellable(
        &self,
        token: &CancellationToken,
        sql: &str,
        params: Params<C>,
    ) -> Result<ExecResult<C>> {
        cancellable(token, self.exec(sql, params)).await
    }

    pub async fn prepare(&self, sql: &str) -> Result<Statement<C>> {
        let driver = self.driver()?;
        driver.prepare(sql).await.map_err(Error::Exec)
    }

    pub async fn prepare_cancellable(
        &self,
        token: &CancellationToken,
        sql: &str,
    ) -> Result<Statement<C>> {
        cancellable(token, self.prepare(sql)).await
    }

    pub async fn begin(&self) -> Result<Transaction<C>> {
        let driver = self.driver()?;
        driver.begin().await.map_err(Error::Exec)
    }

    pub async fn begin_cancellable(&self, token: &CancellationToken) -> Result<Transaction<C>> {
        cancellable(token, self.begin()).await
    }

    /// Release the driver handle. Terminal; closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let prev = ConnectionState::from(
            self.state.swap(ConnectionState::Closed as u8, Ordering::AcqRel),
        );
        if prev == ConnectionState::Closed {
            return Ok(());
        }

        let Some(driver) = self.handle.swap(None) else {
            return Ok(());
        };
        tracing::debug!(role = %self.role, address = %self.address(), "Closing connection");
        driver.close().await.map_err(|source| self.connection_error(source))
    }

    pub fn set_conn_max_lifetime(&self, lifetime: Duration) {
        self.tuning.lock().conn_max_lifetime = Some(lifetime);
        if let Some(driver) = self.handle.load_full() {
            driver.set_conn_max_lifetime(lifetime);
        }
    }

    pub fn set_max_idle_conns(&self, n: usize) {
        self.tuning.lock().max_idle_conns = Some(n);
        if let Some(driver) = self.handle.load_full() {
            driver.set_max_idle_conns(n);
        }
    }

    pub fn set_max_open_conns(&self, n: usize) {
        self.tuning.lock().max_open_conns = Some(n);
        if let Some(driver) = self.handle.load_full() {
            driver.set_max_open_conns(n);
        }
    }

    /// Apply every field of `tuning` that is set.
    pub fn apply_tuning(&self, tuning: &PoolTuning) {
        if let Some(lifetime) = tuning.conn_max_lifetime {
            self.set_conn_max_lifetime(lifetime);
        }
        if let Some(n) = tuning.max_idle_conns {
            self.set_max_idle_conns(n);
        }
        if let Some(n) = tuning.max_open_conns {
            self.set_max_open_conns(n);
        }
    }
}

impl<C: Connector> Readiness for Connection<C> {
    fn is_ready(&self) -> bool {
        Connection::is_ready(self)
    }
}

impl<C: Connector> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("dsn", &self.dsn)
            .field("state", &self.state())
            .finish()
    }
}

async fn cancellable<T>(
    token: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = operation => result,
    }
}
