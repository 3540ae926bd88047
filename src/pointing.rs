//! Last accepted pointing, used as the search hint for the next solve.
//!
//! Owned by the orchestrator thread alone, so it needs no locking. It is not
//! persisted; a restart begins unhinted.

use std::time::{Duration, Instant};

use crate::model::Equatorial;

#[derive(Debug, Clone, Default)]
pub struct PointingCache {
    last: Option<(Equatorial, Instant)>,
}

impl PointingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pointing observed at `now`, replacing any earlier one.
    pub fn record(&mut self, ra_deg: f64, dec_deg: f64, now: Instant) {
        self.last = Some((Equatorial::new(ra_deg, dec_deg), now));
    }

    /// The stored pointing if it is no older than `timeout` at `now`.
    pub fn hint(&self, now: Instant, timeout: Duration) -> Option<Equatorial> {
        let (coords, recorded_at) = self.last?;
        let age = now.saturating_duration_since(recorded_at);
        (age <= timeout).then_some(coords)
    }

    pub fn last(&self) -> Option<Equatorial> {
        self.last.map(|(coords, _)| coords)
    }
}
