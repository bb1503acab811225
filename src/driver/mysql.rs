//! MySQL driver backed by an `sqlx` pool.
//!
//! # Responsibilities
//! - Translate a `Dsn` into a `mysql://` URL
//! - Own one `MySqlPool` per proxied connection
//! - Rebuild the pool when tuning changes (sqlx pools are fixed at creation)

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlQueryResult, MySqlRow,
    MySqlStatement,
};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Connection as _, Executor as _, Statement as _};
use url::Url;

use crate::driver::dsn::PARSE_TIME;
use crate::driver::{Connector, DriverConnection, DriverError, Dsn, PoolTuning};

/// A bound statement argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<u64> for Param {
    fn from(v: u64) -> Self {
        Param::UInt(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<Vec<u8>> for Param {
    fn from(v: Vec<u8>) -> Self {
        Param::Bytes(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Param::Null)
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: Vec<Param>,
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            Param::Null => query.bind(None::<String>),
            Param::Bool(v) => query.bind(v),
            Param::Int(v) => query.bind(v),
            Param::UInt(v) => query.bind(v),
            Param::Float(v) => query.bind(v),
            Param::Text(v) => query.bind(v),
            Param::Bytes(v) => query.bind(v),
        };
    }
    query
}

/// Build the sqlx URL. `parseTime` has no sqlx counterpart (temporal
/// columns always decode to typed values), so it is dropped here.
fn mysql_url(dsn: &Dsn) -> Result<Url, DriverError> {
    let mut url = Url::parse(&format!("mysql://{}/{}", dsn.address(), dsn.database()))?;
    url.set_username(dsn.username())
        .map_err(|_| "username cannot be encoded in a mysql URL")?;
    url.set_password(Some(dsn.password()))
        .map_err(|_| "password cannot be encoded in a mysql URL")?;

    let extra: Vec<_> = dsn.params().iter().filter(|(k, _)| k != PARSE_TIME).collect();
    if !extra.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in extra {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn pool_options(tuning: &PoolTuning) -> MySqlPoolOptions {
    let mut options = MySqlPoolOptions::new();
    if let Some(max_open) = tuning.max_open_conns {
        options = options.max_connections(to_u32(max_open.max(1)));
    }
    // sqlx has no idle cap; keeping `max_idle` connections warm is the
    // closest equivalent.
    if let Some(max_idle) = tuning.max_idle_conns {
        let cap = tuning.max_open_conns.unwrap_or(max_idle);
        options = options.min_connections(to_u32(max_idle.min(cap)));
    }
    if let Some(lifetime) = tuning.conn_max_lifetime {
        options = options.max_lifetime(lifetime);
    }
    options
}

/// Opens `MySqlDriver` handles.
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Connection = MySqlDriver;

    async fn open(&self, dsn: &Dsn) -> Result<MySqlDriver, DriverError> {
        let url = mysql_url(dsn)?;
        let tuning = PoolTuning::default();
        let pool = pool_options(&tuning).connect(url.as_str()).await?;
        Ok(MySqlDriver {
            url,
            pool: RwLock::new(pool),
            tuning: Mutex::new(tuning),
        })
    }
}

/// A pool of MySQL connections to one server.
#[derive(Debug)]
pub struct MySqlDriver {
    url: Url,
    pool: RwLock<MySqlPool>,
    tuning: Mutex<PoolTuning>,
}

impl MySqlDriver {
    fn pool(&self) -> MySqlPool {
        self.pool.read().clone()
    }

    fn retune(&self, update: impl FnOnce(&mut PoolTuning)) {
        let tuning = {
            let mut current = self.tuning.lock();
            let before = *current;
            update(&mut *current);
            if *current == before {
                return;
            }
            *current
        };

        // Pool construction spawns sqlx maintenance tasks.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime, mysql pool keeps its previous settings");
            return;
        };
        let _entered = runtime.enter();

        match pool_options(&tuning).connect_lazy(self.url.as_str()) {
            Ok(pool) => {
                let old = std::mem::replace(&mut *self.pool.write(), pool);
                runtime.spawn(async move { old.close().await });
                tracing::debug!(?tuning, "mysql pool rebuilt");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to rebuild mysql pool, keeping previous settings");
            }
        }
    }
}

/// A prepared statement pinned to the pooled connection it was prepared on.
#[derive(Debug)]
pub struct Prepared {
    conn: PoolConnection<MySql>,
    statement: MySqlStatement<'static>,
}

impl Prepared {
    pub fn sql(&self) -> &str {
        self.statement.sql()
    }

    pub async fn execute(&mut self, params: Vec<Param>) -> Result<MySqlQueryResult, sqlx::Error> {
        bind_all(sqlx::query(self.statement.sql()), params)
            .execute(&mut *self.conn)
            .await
    }

    pub async fn fetch_all(&mut self, params: Vec<Param>) -> Result<Vec<MySqlRow>, sqlx::Error> {
        bind_all(sqlx::query(self.statement.sql()), params)
            .fetch_all(&mut *self.conn)
            .await
    }
}

#[async_trait]
impl DriverConnection for MySqlDriver {
    type Params = Vec<Param>;
    type Rows = Vec<MySqlRow>;
    type Row = MySqlRow;
    type ExecResult = MySqlQueryResult;
    type Statement = Prepared;
    type Transaction = sqlx::Transaction<'static, MySql>;

    async fn ping(&self) -> Result<(), DriverError> {
        let mut conn = self.pool().acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn query(&self, sql: &str, params: Vec<Param>) -> Result<Vec<MySqlRow>, DriverError> {
        let pool = self.pool();
        Ok(bind_all(sqlx::query(sql), params).fetch_all(&pool).await?)
    }

    async fn query_row(
        &self,
        sql: &str,
        params: Vec<Param>,
    ) -> Result<Option<MySqlRow>, DriverError> {
        let pool = self.pool();
        Ok(bind_all(sqlx::query(sql), params).fetch_optional(&pool).await?)
    }

    async fn exec(&self, sql: &str, params: Vec<Param>) -> Result<MySqlQueryResult, DriverError> {
        let pool = self.pool();
        Ok(bind_all(sqlx::query(sql), params).execute(&pool).await?)
    }

    async fn prepare(&self, sql: &str) -> Result<Prepared, DriverError> {
        let mut conn = self.pool().acquire().await?;
        let prepared = (&mut *conn).prepare(sql).await?;
        let statement = sqlx::Statement::to_owned(&prepared);
        Ok(Prepared { conn, statement })
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, MySql>, DriverError> {
        Ok(self.pool().begin().await?)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.pool().close().await;
        Ok(())
    }

    fn set_conn_max_lifetime(&self, lifetime: Duration) {
        self.retune(|t| t.conn_max_lifetime = Some(lifetime));
    }

    fn set_max_idle_conns(&self, n: usize) {
        self.retune(|t| t.max_idle_conns = Some(n));
    }

    fn set_max_open_conns(&self, n: usize) {
        self.retune(|t| t.max_open_conns = Some(n));
    }
}
