//! Shared utilities for integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use db_proxy::config::ConnectionConfig;
use db_proxy::driver::{Connector, DriverConnection, DriverError, Dsn, PoolTuning};

#[derive(Debug, Default)]
struct Script {
    failing_open: HashSet<String>,
    failing_ping: HashSet<String>,
    failing_close: HashSet<String>,
    hung: HashSet<String>,
    calls: HashMap<String, usize>,
    tuning: HashMap<String, PoolTuning>,
}

/// In-memory driver. Every query answers with the address it ran on.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: Arc<Mutex<Script>>,
}

#[allow(dead_code)]
impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self, address: &str) {
        self.script.lock().failing_open.insert(address.to_string());
    }

    pub fn set_ping_ok(&self, address: &str, ok: bool) {
        let mut script = self.script.lock();
        if ok {
            script.failing_ping.remove(address);
            script.failing_open.remove(address);
        } else {
            script.failing_ping.insert(address.to_string());
        }
    }

    pub fn fail_close(&self, address: &str) {
        self.script.lock().failing_close.insert(address.to_string());
    }

    /// Pings and calls against `address` never complete.
    pub fn hang(&self, address: &str) {
        self.script.lock().hung.insert(address.to_string());
    }

    /// Queries, execs, prepares and begins sent to `address`.
    pub fn calls(&self, address: &str) -> usize {
        self.script.lock().calls.get(address).copied().unwrap_or(0)
    }

    pub fn tuning(&self, address: &str) -> PoolTuning {
        self.script
            .lock()
            .tuning
            .get(address)
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct MockConnection {
    address: String,
    script: Arc<Mutex<Script>>,
}

impl MockConnection {
    async fn call(&self) -> Result<String, DriverError> {
        let hung = {
            let mut script = self.script.lock();
            *script.calls.entry(self.address.clone()).or_insert(0) += 1;
            script.hung.contains(&self.address)
        };
        if hung {
            std::future::pending::<()>().await;
        }
        Ok(self.address.clone())
    }

    fn tune(&self, f: impl FnOnce(&mut PoolTuning)) {
        let mut script = self.script.lock();
        f(script.tuning.entry(self.address.clone()).or_default());
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn open(&self, dsn: &Dsn) -> Result<MockConnection, DriverError> {
        if self.script.lock().failing_open.contains(dsn.address()) {
            return Err(format!("connection refused by {}", dsn.address()).into());
        }
        Ok(MockConnection {
            address: dsn.address().to_string(),
            script: self.script.clone(),
        })
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    type Params = Vec<String>;
    type Rows = String;
    type Row = String;
    type ExecResult = String;
    type Statement = String;
    type Transaction = String;

    async fn ping(&self) -> Result<(), DriverError> {
        let (failing, hung) = {
            let script = self.script.lock();
            (
                script.failing_ping.contains(&self.address),
                script.hung.contains(&self.address),
            )
        };
        if failing {
            return Err(format!("{} did not answer ping", self.address).into());
        }
        if hung {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn query(&self, _sql: &str, _params: Vec<String>) -> Result<String, DriverError> {
        self.call().await
    }

    async fn query_row(
        &self,
        _sql: &str,
        _params: Vec<String>,
    ) -> Result<Option<String>, DriverError> {
        self.call().await.map(Some)
    }

    async fn exec(&self, _sql: &str, _params: Vec<String>) -> Result<String, DriverError> {
        self.call().await
    }

    async fn prepare(&self, _sql: &str) -> Result<String, DriverError> {
        self.call().await
    }

    async fn begin(&self) -> Result<String, DriverError> {
        self.call().await
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.script.lock().failing_close.contains(&self.address) {
            return Err(format!("{} failed to close", self.address).into());
        }
        Ok(())
    }

    fn set_conn_max_lifetime(&self, lifetime: Duration) {
        self.tune(|t| t.conn_max_lifetime = Some(lifetime));
    }

    fn set_max_idle_conns(&self, n: usize) {
        self.tune(|t| t.max_idle_conns = Some(n));
    }

    fn set_max_open_conns(&self, n: usize) {
        self.tune(|t| t.max_open_conns = Some(n));
    }
}

#[allow(dead_code)]
pub fn connection(address: &str) -> ConnectionConfig {
    ConnectionConfig::new("app", address, "app_user", "app_pass")
}

#[allow(dead_code)]
pub fn replica_address(i: usize) -> String {
    format!("10.0.0.{}:3306", i + 10)
}
