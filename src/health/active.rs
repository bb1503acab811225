//! Active health checking.
//!
//! # Responsibilities
//! - Periodically ping the primary and every replica
//! - Update each connection's readiness from the ping outcome
//! - Recompute the healthy replica count consumed by the selector

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::driver::Connector;
use crate::health::state::ReplicaHealth;
use crate::load_balancer::{Connection, ReplicaRegistry};
use crate::observability::metrics;

pub struct HealthMonitor<C: Connector> {
    primary: Arc<ArcSwapOption<Connection<C>>>,
    replicas: Arc<ReplicaRegistry<Connection<C>>>,
    health: Arc<ReplicaHealth>,
    config: HealthCheckConfig,
}

impl<C: Connector> Clone for HealthMonitor<C> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            replicas: self.replicas.clone(),
            health: self.health.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: Connector> HealthMonitor<C> {
    pub fn new(
        primary: Arc<ArcSwapOption<Connection<C>>>,
        replicas: Arc<ReplicaRegistry<Connection<C>>>,
        health: Arc<ReplicaHealth>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            primary,
            replicas,
            health,
            config,
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval()
    }

    /// Tick until `stop` fires or its sender is dropped.
    pub async fn run(self, mut stop: oneshot::Receiver<()>) {
        let interval = self.interval();
        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_secs = self.config.timeout_secs,
            "Health monitor starting"
        );

        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Stop wins over a due tick, and an in-flight tick is abandoned.
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = &mut stop => {
                            tracing::info!("Health monitor received shutdown signal mid-tick, exiting loop");
                            break;
                        }
                        _ = self.check_all() => {}
                    }
                }
            }
        }
    }

    /// Run one pass and return the healthy replica count.
    pub async fn check_all(&self) -> usize {
        let timeout = self.config.timeout();

        if let Some(primary) = self.primary.load_full() {
            if let Err(e) = primary.ping_timeout(timeout).await {
                tracing::warn!(address = %primary.address(), error = %e, "Primary health check failed");
            }
            metrics::record_connection_ready(primary.role(), primary.address(), primary.is_ready());
        }

        let snapshot = self.replicas.snapshot();
        let mut healthy = 0;
        for replica in snapshot.iter() {
            match replica.ping_timeout(timeout).await {
                Ok(()) => healthy += 1,
                Err(e) => {
                    tracing::warn!(address = %replica.address(), error = %e, "Replica health check failed");
                }
            }
            metrics::record_connection_ready(replica.role(), replica.address(), replica.is_ready());
        }

        self.health.record_tick(healthy);
        metrics::record_healthy_replicas(healthy);
        tracing::debug!(
            healthy,
            registered = snapshot.len(),
            tick = self.health.ticks(),
            "Health check complete"
        );
        healthy
    }
}
