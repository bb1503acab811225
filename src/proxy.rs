//! The proxy facade.
//!
//! # Responsibilities
//! - Own the primary slot, the replica registry and the health monitor task
//! - Route reads through round-robin selection, writes to the primary
//! - Fan pool tuning out to every connection, including future replicas
//! - Stop the monitor and close every connection on shutdown

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConnectionConfig, HealthCheckConfig, ProxyConfig};
use crate::driver::{
    Connector, ExecResult, Params, PoolTuning, Row, Rows, Statement, Transaction,
};
use crate::error::{Error, Result};
use crate::health::{ConnectionState, HealthMonitor, ReplicaHealth};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{Connection, LoadBalancer, ReplicaRegistry, Role, RoundRobin};
use crate::observability::metrics;

/// Kind of write-path operation about to be sent to the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteKind {
    Exec,
    Prepare,
    Begin,
}

/// Observer invoked before every write-path operation.
pub trait WriteHook: Send + Sync {
    /// `sql` is `None` for `begin`.
    fn before_write(&self, kind: WriteKind, sql: Option<&str>);
}

/// Outcome of `DbProxy::add_replica`.
///
/// The replica is registered whatever the connect outcome, so `index` is
/// always valid and the health monitor can bring it up later.
#[derive(Debug)]
pub struct ReplicaRegistration {
    pub index: usize,
    pub connected: Result<()>,
}

impl ReplicaRegistration {
    /// The index if the initial connect succeeded, otherwise the error.
    pub fn into_result(self) -> Result<usize> {
        self.connected.map(|()| self.index)
    }
}

/// Point-in-time view of one connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub role: Role,
    pub address: String,
    pub database: String,
    pub state: ConnectionState,
}

impl<C: Connector> From<&Connection<C>> for ConnectionStatus {
    fn from(conn: &Connection<C>) -> Self {
        Self {
            role: conn.role(),
            address: conn.address().to_string(),
            database: conn.dsn().database().to_string(),
            state: conn.state(),
        }
    }
}

/// Point-in-time view of the whole proxy.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub ready: bool,
    pub primary: Option<ConnectionStatus>,
    pub replicas: Vec<ConnectionStatus>,
    pub healthy_replicas: usize,
    pub replica_capacity: usize,
    pub health_ticks: u64,
    pub health_interval_secs: u64,
}

/// Read/write splitting proxy over one primary and any number of replicas.
///
/// Dropping the proxy without `close` stops the monitor but leaves driver
/// handles to their own drop logic.
pub struct DbProxy<C: Connector> {
    connector: Arc<C>,
    primary: Arc<ArcSwapOption<Connection<C>>>,
    replicas: Arc<ReplicaRegistry<Connection<C>>>,
    health: Arc<ReplicaHealth>,
    balancer: RoundRobin,
    monitor: HealthMonitor<C>,
    shutdown: Shutdown,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    tuning: Mutex<PoolTuning>,
    write_hook: Option<Arc<dyn WriteHook>>,
}

impl<C: Connector> DbProxy<C> {
    /// Create an empty proxy and start its health monitor.
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn new(connector: C, health_check: HealthCheckConfig) -> Self {
        let primary = Arc::new(ArcSwapOption::empty());
        let replicas = Arc::new(ReplicaRegistry::new());
        let health = Arc::new(ReplicaHealth::new());
        let monitor = HealthMonitor::new(
            primary.clone(),
            replicas.clone(),
            health.clone(),
            health_check,
        );

        let (shutdown, stop) = Shutdown::new();
        let task = tokio::spawn(monitor.clone().run(stop));

        Self {
            connector: Arc::new(connector),
            primary,
            replicas,
            health,
            balancer: RoundRobin::new(),
            monitor,
            shutdown,
            monitor_task: Mutex::new(Some(task)),
            tuning: Mutex::new(PoolTuning::default()),
            write_hook: None,
        }
    }

    /// Build a proxy from a loaded configuration and connect every
    /// configured connection. Connect failures are logged and leave the
    /// connection unready; they do not abort construction.
    pub async fn from_config(connector: C, config: &ProxyConfig) -> Self {
        let proxy = Self::new(connector, config.health_check.clone());
        proxy.set_pool_tuning(PoolTuning::from(&config.pool));

        if let Some(primary) = &config.primary {
            // Failure already logged by the connection.
            let _ = proxy.set_primary(primary).await;
        }
        for replica in &config.replicas {
            let _ = proxy.add_replica(replica).await;
        }

        tracing::info!(
            primary = config.primary.is_some(),
            replicas = proxy.replica_count(),
            ready = proxy.is_ready(),
            "Proxy initialized"
        );
        proxy
    }

    pub fn with_write_hook(mut self, hook: impl WriteHook + 'static) -> Self {
        self.write_hook = Some(Arc::new(hook));
        self
    }

    /// Connect and install the primary. The primary is installed even when
    /// the connect fails; a previous primary is closed.
    pub async fn set_primary(&self, config: &ConnectionConfig) -> Result<()> {
        let conn = Connection::new(Role::Primary, config, self.connector.clone());
        conn.apply_tuning(&self.tuning.lock());
        let connected = conn.connect().await;
        metrics::record_connection_ready(Role::Primary, conn.address(), conn.is_ready());

        if let Some(previous) = self.primary.swap(Some(Arc::new(conn))) {
            tracing::info!(address = %previous.address(), "Replacing primary");
            if let Err(e) = previous.close().await {
                tracing::warn!(address = %previous.address(), error = %e, "Failed to close previous primary");
            }
        }
        connected
    }

    /// Connect and register a replica.
    pub async fn add_replica(&self, config: &ConnectionConfig) -> ReplicaRegistration {
        let conn = Connection::new(Role::Replica, config, self.connector.clone());
        conn.apply_tuning(&self.tuning.lock());
        let connected = conn.connect().await;
        metrics::record_connection_ready(Role::Replica, conn.address(), conn.is_ready());

        let address = conn.address().to_string();
        let index = self.replicas.add(Arc::new(conn));
        tracing::info!(
            index,
            address = %address,
            connected = connected.is_ok(),
            "Replica registered"
        );
        ReplicaRegistration { index, connected }
    }

    /// Run one health-check pass now instead of waiting for the next tick.
    pub async fn check_health(&self) -> usize {
        self.monitor.check_all().await
    }

    /// Whether the primary is ready. Replicas do not affect this.
    pub fn is_ready(&self) -> bool {
        self.primary
            .load()
            .as_ref()
            .is_some_and(|primary| primary.is_ready())
    }

    /// Healthy replicas as of the last health-check pass.
    pub fn healthy_replicas(&self) -> usize {
        self.health.healthy()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.count()
    }

    pub fn health_check_interval(&self) -> Duration {
        self.monitor.interval()
    }

    pub fn primary(&self) -> Option<Arc<Connection<C>>> {
        self.primary.load_full()
    }

    pub fn replica(&self, index: usize) -> Option<Arc<Connection<C>>> {
        self.replicas.get(index)
    }

    pub fn status(&self) -> ProxyStatus {
        let snapshot = self.replicas.snapshot();
        ProxyStatus {
            ready: self.is_ready(),
            primary: self
                .primary
                .load()
                .as_deref()
                .map(ConnectionStatus::from),
            replicas: snapshot
                .iter()
                .map(|replica| ConnectionStatus::from(replica.as_ref()))
                .collect(),
            healthy_replicas: self.health.healthy(),
            replica_capacity: self.replicas.capacity(),
            health_ticks: self.health.ticks(),
            health_interval_secs: self.monitor.interval().as_secs(),
        }
    }

    fn primary_or_err(&self) -> Result<Arc<Connection<C>>> {
        self.primary.load_full().ok_or(Error::NoPrimary)
    }

    /// Pick the connection for a read.
    fn read_target(&self) -> Result<Arc<Connection<C>>> {
        let snapshot = self.replicas.snapshot();
        match self.balancer.next_replica(self.health.healthy(), &snapshot) {
            Some(replica) => {
                metrics::record_routed(Role::Replica);
                Ok(replica)
            }
            None => {
                let primary = self.primary_or_err()?;
                metrics::record_routed(Role::Primary);
                Ok(primary)
            }
        }
    }

    /// Pick the connection for a write and notify the hook.
    fn write_target(&self, kind: WriteKind, sql: Option<&str>) -> Result<Arc<Connection<C>>> {
        let primary = self.primary_or_err()?;
        if let Some(hook) = &self.write_hook {
            hook.before_write(kind, sql);
        }
        metrics::record_routed(Role::Primary);
        Ok(primary)
    }

    pub async fn query(&self, sql: &str, params: Params<C>) -> Result<Rows<C>> {
        self.read_target()?.query(sql, params).await
    }

    pub async fn query_cancellable(
        &self,
        token: &CancellationToken,
        sql: &str,
        params: Params<C>,
    ) -> Result<Rows<C>> {
        self.read_target()?
            .query_cancellable(token, sql, params)
            .await
    }

    pub async fn query_row(&self, sql: &str, params: Params<C>) -> Result<Option<Row<C>>> {
        self.read_target()?.query_row(sql, params).await
    }

    pub async fn query_row_cancellable(
        &self,
        token: &CancellationToken,
        sql: &str,
        params: Params<C>,
    ) -> Result<Option<Row<C>>> {
        self.read_target()?
            .query_row_cancellable(token, sql, params)
            .await
    }

    pub async fn exec(&self, sql: &str, params: Params<C>) -> Result<ExecResult<C>> {
        self.write_target(WriteKind::Exec, Some(sql))?
            .exec(sql, params)
            .await
    }

    pub async fn exec_cancellable(
        &self,
        token: &CancellationToken,
        sql: &str,
        params: Params<C>,
    ) -> Result<ExecResult<C>> {
        self.write_target(WriteKind::Exec, Some(sql))?
            .exec_cancellable(token, sql, params)
            .await
    }

    pub async fn prepare(&self, sql: &str) -> Result<Statement<C>> {
        self.write_target(WriteKind::Prepare, Some(sql))?
            .prepare(sql)
            .await
    }

    pub async fn prepare_cancellable(
        &self,
        token: &CancellationToken,
        sql: &str,
    ) -> Result<Statement<C>> {
        self.write_target(WriteKind::Prepare, Some(sql))?
            .prepare_cancellable(token, sql)
            .await
    }

    pub async fn begin(&self) -> Result<Transaction<C>> {
        self.write_target(WriteKind::Begin, None)?.begin().await
    }

    pub async fn begin_cancellable(&self, token: &CancellationToken) -> Result<Transaction<C>> {
        self.write_target(WriteKind::Begin, None)?
            .begin_cancellable(token)
            .await
    }

    fn each_connection(&self, f: impl Fn(&Connection<C>)) {
        if let Some(primary) = self.primary.load().as_deref() {
            f(primary);
        }
        for replica in self.replicas.snapshot().iter() {
            f(replica);
        }
    }

    pub fn set_conn_max_lifetime(&self, lifetime: Duration) {
        self.tuning.lock().conn_max_lifetime = Some(lifetime);
        self.each_connection(|conn| conn.set_conn_max_lifetime(lifetime));
    }

    pub fn set_max_idle_conns(&self, n: usize) {
        self.tuning.lock().max_idle_conns = Some(n);
        self.each_connection(|conn| conn.set_max_idle_conns(n));
    }

    pub fn set_max_open_conns(&self, n: usize) {
        self.tuning.lock().max_open_conns = Some(n);
        self.each_connection(|conn| conn.set_max_open_conns(n));
    }

    /// Apply every field of `tuning` that is set.
    pub fn set_pool_tuning(&self, tuning: PoolTuning) {
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

    /// Stop the health monitor, then close every replica and the primary.
    ///
    /// Every connection is attempted; only the last failure is returned.
    /// Calling this again is harmless.
    pub async fn close(&self) -> Result<()> {
        if self.shutdown.trigger() {
            tracing::info!("Shutting down proxy");
        }
        let task = self.monitor_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Health monitor task failed");
            }
        }

        let mut last_error = None;
        for replica in self.replicas.snapshot().iter() {
            if let Err(e) = replica.close().await {
                tracing::warn!(address = %replica.address(), error = %e, "Failed to close replica");
                last_error = Some(e);
            }
        }
        if let Some(primary) = self.primary.load_full() {
            if let Err(e) = primary.close().await {
                tracing::warn!(address = %primary.address(), error = %e, "Failed to close primary");
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(Error::Shutdown(Box::new(e))),
            None => Ok(()),
        }
    }
}

impl<C: Connector> fmt::Debug for DbProxy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbProxy")
            .field("primary", &self.primary.load_full())
            .field("replicas", &self.replicas)
            .field("healthy_replicas", &self.health.healthy())
            .field("closed", &self.shutdown.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::stub::StubConnector;

    fn conn(address: &str) -> ConnectionConfig {
        ConnectionConfig::new("app", address, "u", "p")
    }

    #[tokio::test]
    async fn test_operations_without_primary() {
        let proxy = DbProxy::new(StubConnector::new(), HealthCheckConfig::default());
        assert!(!proxy.is_ready());
        assert!(matches!(proxy.query("SELECT 1", ()).await, Err(Error::NoPrimary)));
        assert!(matches!(proxy.exec("DELETE", ()).await, Err(Error::NoPrimary)));
        assert!(proxy.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_replica_registered_even_when_connect_fails() {
        let stub = StubConnector::new();
        stub.set_down("r0:3306", true);
        let proxy = DbProxy::new(stub.clone(), HealthCheckConfig::default());

        let registration = proxy.add_replica(&conn("r0:3306")).await;
        assert_eq!(registration.index, 0);
        assert!(registration.into_result().unwrap_err().is_connection());
        assert_eq!(proxy.replica_count(), 1);

        stub.set_down("r0:3306", false);
        assert_eq!(proxy.check_health().await, 1);
        assert!(proxy.replica(0).unwrap().is_ready());
    }

    #[tokio::test]
    async fn test_replacing_primary_closes_previous() {
        let proxy = DbProxy::new(StubConnector::new(), HealthCheckConfig::default());
        proxy.set_primary(&conn("p1:3306")).await.unwrap();
        let first = proxy.primary().unwrap();

        proxy.set_primary(&conn("p2:3306")).await.unwrap();
        assert_eq!(first.state(), ConnectionState::Closed);
        assert_eq!(proxy.primary().unwrap().address(), "p2:3306");
        assert!(proxy.is_ready());
    }

    #[tokio::test]
    async fn test_status_reports_every_connection() {
        let proxy = DbProxy::new(StubConnector::new(), HealthCheckConfig::default());
        proxy.set_primary(&conn("p:3306")).await.unwrap();
        proxy.add_replica(&conn("r0:3306")).await.into_result().unwrap();
        proxy.check_health().await;

        let status = proxy.status();
        assert!(status.ready);
        assert_eq!(status.replicas.len(), 1);
        assert_eq!(status.healthy_replicas, 1);
        assert_eq!(status.health_ticks, 1);
        assert_eq!(status.health_interval_secs, 5);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["primary"]["role"], "primary");
        assert_eq!(json["replicas"][0]["state"], "ready");
    }

    #[tokio::test]
    async fn test_close_twice_is_safe() {
        let proxy = DbProxy::new(StubConnector::new(), HealthCheckConfig::default());
        proxy.set_primary(&conn("p:3306")).await.unwrap();
        proxy.close().await.unwrap();
        proxy.close().await.unwrap();
        assert!(!proxy.is_ready());
    }
}
