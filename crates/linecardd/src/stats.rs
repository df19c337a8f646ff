//! Line card activity counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinecardStats {
    /// Full-chassis scans run.
    pub scans: u64,
    /// Slot status queries that failed.
    pub query_failures: u64,
    /// Unsolicited status events applied.
    pub events_processed: u64,
    /// Unsolicited status events rejected (bad payload or slot).
    pub events_rejected: u64,
    /// Status records that changed slot state.
    pub transitions: u64,
    /// Provisioning fan-outs that were rolled back.
    pub provision_rollbacks: u64,
}

/// Shared counters updated from any thread.
#[derive(Debug, Default)]
pub struct LinecardCounters {
    scans: AtomicU64,
    query_failures: AtomicU64,
    events_processed: AtomicU64,
    events_rejected: AtomicU64,
    transitions: AtomicU64,
    provision_rollbacks: AtomicU64,
}

impl LinecardCounters {
    pub fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_failure(&self) {
        self.query_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self, accepted: bool) {
        if accepted {
            self.events_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.events_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.provision_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinecardStats {
        LinecardStats {
            scans: self.scans.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            provision_rollbacks: self.provision_rollbacks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = LinecardCounters::default();
        assert_eq!(counters.snapshot(), LinecardStats::default());
    }

    #[test]
    fn test_record_events() {
        let counters = LinecardCounters::default();
        counters.record_scan();
        counters.record_event(true);
        counters.record_event(false);
        counters.record_event(false);
        counters.record_rollback();

        let stats = counters.snapshot();
        assert_eq!(stats.scans, 1);
        assert_eq!(stats.events_processed, 1);
        assert_eq!(stats.events_rejected, 2);
        assert_eq!(stats.provision_rollbacks, 1);
        assert_eq!(stats.transitions, 0);
    }
}
