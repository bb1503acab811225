//! Read/write splitting database proxy library

pub mod config;
pub mod driver;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod proxy;

pub use config::schema::ProxyConfig;
pub use driver::{Connector, DriverConnection, DriverError, Dsn, PoolTuning};
pub use error::{Error, Result};
pub use health::ConnectionState;
pub use lifecycle::Shutdown;
pub use load_balancer::{Connection, Role};
pub use proxy::{DbProxy, ProxyStatus, ReplicaRegistration, WriteHook, WriteKind};
