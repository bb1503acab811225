//! In-memory driver used by unit tests.
//!
//! Every result is the address of the handle that produced it, so tests can
//! see where a call was routed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{Connector, DriverConnection, DriverError, Dsn, PoolTuning};

#[derive(Debug, Default)]
struct Switches {
    down: HashSet<String>,
    hung: HashSet<String>,
    failing_close: HashSet<String>,
    open_delay: Option<Duration>,
    opens: usize,
    closes: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StubConnector {
    switches: Arc<Mutex<Switches>>,
}

impl StubConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make opens and pings against `address` fail (or succeed again).
    pub(crate) fn set_down(&self, address: &str, down: bool) {
        let mut switches = self.switches.lock();
        if down {
            switches.down.insert(address.to_string());
        } else {
            switches.down.remove(address);
        }
    }

    /// Make every call against `address` wait forever.
    pub(crate) fn set_hung(&self, address: &str) {
        self.switches.lock().hung.insert(address.to_string());
    }

    pub(crate) fn fail_close(&self, address: &str) {
        self.switches.lock().failing_close.insert(address.to_string());
    }

    /// Make every open sleep for `delay` before answering.
    pub(crate) fn delay_open(&self, delay: Duration) {
        self.switches.lock().open_delay = Some(delay);
    }

    /// Handles opened so far.
    pub(crate) fn opens(&self) -> usize {
        self.switches.lock().opens
    }

    /// Handles closed so far.
    pub(crate) fn closes(&self) -> usize {
        self.switches.lock().closes
    }

    fn is_down(&self, address: &str) -> bool {
        self.switches.lock().down.contains(address)
    }
}

#[derive(Debug)]
pub(crate) struct StubConnection {
    address: String,
    connector: StubConnector,
    pub(crate) tuning: Mutex<PoolTuning>,
}

impl StubConnection {
    async fn answer(&self) -> Result<String, DriverError> {
        if self.connector.switches.lock().hung.contains(&self.address) {
            std::future::pending::<()>().await;
        }
        Ok(self.address.clone())
    }
}

#[async_trait]
impl Connector for StubConnector {
    type Connection = StubConnection;

    async fn open(&self, dsn: &Dsn) -> Result<StubConnection, DriverError> {
        let delay = self.switches.lock().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.is_down(dsn.address()) {
            return Err(format!("{} refused connection", dsn.address()).into());
        }
        self.switches.lock().opens += 1;
        Ok(StubConnection {
            address: dsn.address().to_string(),
            connector: self.clone(),
            tuning: Mutex::new(PoolTuning::default()),
        })
    }
}

#[async_trait]
impl DriverConnection for StubConnection {
    type Params = ();
    type Rows = String;
    type Row = String;
    type ExecResult = String;
    type Statement = String;
    type Transaction = String;

    async fn ping(&self) -> Result<(), DriverError> {
        if self.connector.is_down(&self.address) {
            return Err(format!("{} is down", self.address).into());
        }
        self.answer().await.map(|_| ())
    }

    async fn query(&self, _sql: &str, _params: ()) -> Result<String, DriverError> {
        self.answer().await
    }

    async fn query_row(&self, _sql: &str, _params: ()) -> Result<Option<String>, DriverError> {
        self.answer().await.map(Some)
    }

    async fn exec(&self, _sql: &str, _params: ()) -> Result<String, DriverError> {
        self.answer().await
    }

    async fn prepare(&self, _sql: &str) -> Result<String, DriverError> {
        self.answer().await
    }

    async fn begin(&self) -> Result<String, DriverError> {
        self.answer().await
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut switches = self.connector.switches.lock();
        switches.closes += 1;
        if switches.failing_close.contains(&self.address) {
            return Err(format!("{} failed to close", self.address).into());
        }
        Ok(())
    }

    fn set_conn_max_lifetime(&self, lifetime: Duration) {
        self.tuning.lock().conn_max_lifetime = Some(lifetime);
    }

    fn set_max_idle_conns(&self, n: usize) {
        self.tuning.lock().max_idle_conns = Some(n);
    }

    fn set_max_open_conns(&self, n: usize) {
        self.tuning.lock().max_open_conns = Some(n);
    }
}
