//! Background reclamation of expired pending registrations.
//!
//! Lookups already ignore expired records, so the sweep only frees space.
//! It also drops relay rooms whose websocket subscribers have all left.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::relay::BroadcastRelay;
use crate::store::{PendingRegistrationStore, StoreResult};

pub struct PendingSweeper {
    pending: Arc<dyn PendingRegistrationStore>,
    relay: Option<Arc<BroadcastRelay>>,
}

/// Statistics from a sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub pending_purged: u64,
    pub rooms_pruned: usize,
}

impl PendingSweeper {
    pub fn new(pending: Arc<dyn PendingRegistrationStore>) -> Self {
        Self { pending, relay: None }
    }

    pub fn with_relay(mut self, relay: Arc<BroadcastRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Run a single sweep
    pub async fn run_once(&self, now: DateTime<Utc>) -> StoreResult<SweepStats> {
        let pending_purged = self.pending.purge_expired(now).await?;
        let rooms_pruned = self.relay.as_ref().map_or(0, |relay| relay.prune());

        if pending_purged > 0 || rooms_pruned > 0 {
            tracing::info!(pending_purged, rooms_pruned, "Sweep completed");
        } else {
            tracing::debug!("Sweep found nothing to reclaim");
        }

        Ok(SweepStats {
            pending_purged,
            rooms_pruned,
        })
    }
}

/// Spawn the background sweep task
pub fn spawn_sweeper_task(sweeper: PendingSweeper, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::info!("Pending registration sweep is disabled");
        return;
    }

    tracing::info!(interval_secs, "Starting pending registration sweeper");

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = sweeper.run_once(Utc::now()).await {
                tracing::error!(error = %e, "Sweep failed");
            }
        }
    });
}
