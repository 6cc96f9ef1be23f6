//! Presence lifecycle - background eviction of idle devices
//!
//! A device that closed all its streams stays known for a while so that a
//! quick reconnect (page reload, network blip) keeps its identity visible.
//! Once it has been idle past the threshold it is removed and every remaining
//! device is told it left.
//!
//! # Defaults
//! - SWEEP_INTERVAL: 30 seconds between sweeps
//! - IDLE_TIMEOUT: 2 minutes without a stream or registration

use std::sync::Arc;
use std::time::{Duration, Instant};

use lanshare_core::PresenceConfig;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::fanout::Fanout;
use crate::registry::Registry;

/// Sweep interval in seconds
pub const SWEEP_INTERVAL_SECS: u64 = 30;

/// Idle threshold in seconds
pub const IDLE_TIMEOUT_SECS: u64 = 120;

/// Periodic eviction of idle devices
pub struct PresenceSweeper {
    registry: Arc<Registry>,
    fanout: Fanout,
    sweep_interval: Duration,
    idle_timeout: Duration,
}

impl PresenceSweeper {
    /// Create a sweeper with default timings
    pub fn new(registry: Arc<Registry>, fanout: Fanout) -> Self {
        Self::with_config(
            registry,
            fanout,
            Duration::from_secs(SWEEP_INTERVAL_SECS),
            Duration::from_secs(IDLE_TIMEOUT_SECS),
        )
    }

    pub fn with_config(
        registry: Arc<Registry>,
        fanout: Fanout,
        sweep_interval: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            fanout,
            sweep_interval,
            idle_timeout,
        }
    }

    pub fn from_presence_config(registry: Arc<Registry>, fanout: Fanout, config: &PresenceConfig) -> Self {
        Self::with_config(registry, fanout, config.sweep_interval(), config.idle_timeout())
    }

    /// Run the sweep loop until cancelled (call from a tokio task)
    pub async fn run_loop(self, cancel: CancellationToken) {
        let mut tick = interval(self.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Presence sweeper stopped");
                    return;
                }
                _ = tick.tick() => {
                    self.sweep();
                }
            }
        }
    }

    /// Evict idle devices now and announce their departure
    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(Instant::now())
    }

    /// [`sweep`](Self::sweep) evaluated at a given instant
    pub fn sweep_at(&self, now: Instant) -> Vec<String> {
        let evicted = self.registry.evict_idle_at(now, self.idle_timeout);

        for id in &evicted {
            self.fanout.device_evicted(id);
        }

        if evicted.is_empty() {
            debug!("Presence sweep: nothing idle ({} devices)", self.registry.len());
        } else {
            info!(
                "Presence sweep: evicted {} idle devices ({} remain)",
                evicted.len(),
                self.registry.len()
            );
        }

        evicted
    }
}
