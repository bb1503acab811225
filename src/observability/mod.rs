//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connections, health monitor, proxy facade produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (readiness gauges, routing counters)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for production)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Library code only emits events; the binary installs the subscriber
//! - Metrics go through the `metrics` facade and are no-ops until an
//!   exporter is installed

pub mod logging;
pub mod metrics;
