//! Per-provider request pacing.
//!
//! Each provider owns a "next free slot". Callers reserve the slot under the
//! lock, release the lock, then sleep until the slot. Concurrent callers for
//! the same provider therefore queue up one interval apart, whichever job
//! (historical or real-time) they come from.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub struct ProviderPacer {
    last_slots: Mutex<HashMap<&'static str, Instant>>,
    intervals: HashMap<&'static str, Duration>,
    default_interval: Duration,
}

impl ProviderPacer {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            last_slots: Mutex::new(HashMap::new()),
            intervals: HashMap::new(),
            default_interval,
        }
    }

    pub fn with_interval(mut self, provider: &'static str, interval: Duration) -> Self {
        self.intervals.insert(provider, interval);
        self
    }

    pub fn interval_for(&self, provider: &str) -> Duration {
        self.intervals
            .get(provider)
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Waits for the provider's next slot and returns the instant it was granted.
    pub async fn acquire(&self, provider: &'static str) -> Instant {
        let slot = {
            let mut slots = self.last_slots.lock().await;
            let now = Instant::now();
            let slot = match slots.get(provider) {
                Some(last) => (*last + self.interval_for(provider)).max(now),
                None => now,
            };
            slots.insert(provider, slot);
            slot
        };

        let now = Instant::now();
        if slot > now {
            debug!("Pacer: waiting {:?} for provider '{}'", slot - now, provider);
            tokio::time::sleep_until(slot).await;
        }

        slot
    }
}
