//! Room model

use std::time::{Duration, Instant};

use crate::messages::Signal;

/// An append-only signal log shared by two roles
pub struct Room {
    pub id: String,
    created_at: Instant,
    signals: Vec<Signal>,
}

impl Room {
    pub fn new(id: String, created_at: Instant) -> Self {
        Self {
            id,
            created_at,
            signals: Vec::new(),
        }
    }

    pub fn append(&mut self, signal: Signal) {
        self.signals.push(signal);
    }

    /// Signals at or after `since` not sent by `role`, and the log length
    pub fn signals_since(&self, since: usize, role: &str) -> (Vec<Signal>, usize) {
        let signals = self
            .signals
            .get(since..)
            .unwrap_or_default()
            .iter()
            .filter(|s| s.from != role)
            .cloned()
            .collect();
        (signals, self.signals.len())
    }

    /// Whether the room has outlived `lifetime` at `now`
    pub fn is_expired(&self, now: Instant, lifetime: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= lifetime
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
