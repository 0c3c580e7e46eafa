//! Periodic retention sweep
//!
//! Events older than the configured horizon are archived (optionally) and
//! deleted on a fixed cadence. The sweep shares the store with the pollers
//! and runs inside one transaction per pass, so a concurrent replay of old
//! data either lands before the sweep or is swept by the next pass.

use crate::store::EventStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::interval;

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Events older than now minus this many seconds are swept.
    pub max_age_secs: i64,
    pub sweep_interval: Duration,
    pub archive: bool,
}

/// One sweep against the shared store, with the cutoff computed from the
/// wall clock at sweep time.
pub async fn sweep_once(store: &Arc<Mutex<EventStore>>, policy: &RetentionPolicy) {
    let cutoff = chrono::Utc::now().timestamp() - policy.max_age_secs;

    let mut store = store.lock().await;
    match store.apply_retention(cutoff, policy.archive) {
        Ok(report) => {
            log::debug!(
                "Retention pass: {} deleted, {} archived",
                report.deleted,
                report.archived
            );
        }
        Err(e) => {
            // Data stays put on failure; the next pass retries.
            log::warn!("Retention pass failed: {}", e);
        }
    }
}

/// Background task that sweeps until shutdown flips.
pub async fn retention_task(
    store: Arc<Mutex<EventStore>>,
    policy: RetentionPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timer = interval(policy.sweep_interval);
    // The first tick fires immediately; skip it so startup is not a sweep.
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => {
                sweep_once(&store, &policy).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    log::info!("🛑 Retention task stopped");
                    return;
                }
            }
        }
    }
}
