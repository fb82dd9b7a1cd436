//! Routing counters
//!
//! Dropped messages are silent to peers; these counters are how an operator
//! sees them.

use crate::router::{DropReason, RouteOutcome};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RouterStats {
    received: AtomicU64,
    malformed: AtomicU64,
    unknown_kind: AtomicU64,
    not_found: AtomicU64,
    store_failures: AtomicU64,
    delivered_direct: AtomicU64,
    broadcast: AtomicU64,
    history_served: AtomicU64,
    delivery_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub malformed: u64,
    pub unknown_kind: u64,
    pub not_found: u64,
    pub store_failures: u64,
    pub delivered_direct: u64,
    pub broadcast: u64,
    pub history_served: u64,
    pub delivery_failures: u64,
}

impl RouterStats {
    pub fn record(&self, outcome: &RouteOutcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RouteOutcome::HistoryServed => &self.history_served,
            RouteOutcome::DeliveredDirect => &self.delivered_direct,
            RouteOutcome::Broadcast { .. } => &self.broadcast,
            RouteOutcome::DeliveryFailed => &self.delivery_failures,
            RouteOutcome::Discarded(DropReason::Malformed) => &self.malformed,
            RouteOutcome::Discarded(DropReason::UnknownKind) => &self.unknown_kind,
            RouteOutcome::Discarded(DropReason::NotFound) => &self.not_found,
            RouteOutcome::Discarded(DropReason::StoreFailure) => &self.store_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            received: load(&self.received),
            malformed: load(&self.malformed),
            unknown_kind: load(&self.unknown_kind),
            not_found: load(&self.not_found),
            store_failures: load(&self.store_failures),
            delivered_direct: load(&self.delivered_direct),
            broadcast: load(&self.broadcast),
            history_served: load(&self.history_served),
            delivery_failures: load(&self.delivery_failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_land_in_their_counters() {
        let stats = RouterStats::default();
        stats.record(&RouteOutcome::Broadcast { notified: 2 });
        stats.record(&RouteOutcome::Discarded(DropReason::Malformed));
        stats.record(&RouteOutcome::Discarded(DropReason::Malformed));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 3);
        assert_eq!(snapshot.broadcast, 1);
        assert_eq!(snapshot.malformed, 2);
        assert_eq!(snapshot.delivered_direct, 0);
    }
}
