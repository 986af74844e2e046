//! Termination counters — how many nodes each disruption policy removed.
//!
//! Uses one atomic counter per reason; the set of reasons is closed, so no
//! locking is needed on the hot path.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Why a node was terminated. Rendered as the `reason` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// The node stayed empty past its provisioner's empty TTL.
    Emptiness,
    /// The node outlived its provisioner's maximum lifetime.
    Expiration,
}

impl TerminationReason {
    pub const ALL: [TerminationReason; 2] =
        [TerminationReason::Emptiness, TerminationReason::Expiration];

    /// Label value used in exposition.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Emptiness => "emptiness",
            TerminationReason::Expiration => "expiration",
        }
    }

    fn index(&self) -> usize {
        match self {
            TerminationReason::Emptiness => 0,
            TerminationReason::Expiration => 1,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter of node terminations, labelled by reason.
///
/// Shared across reconciliation tasks behind an `Arc`.
#[derive(Debug, Default)]
pub struct TerminationMetrics {
    counts: [AtomicU64; 2],
}

impl TerminationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one terminated node.
    pub fn inc(&self, reason: TerminationReason) {
        let total = self.counts[reason.index()].fetch_add(1, Ordering::Relaxed) + 1;
        debug!(%reason, total, "node termination counted");
    }

    /// Current count for a reason.
    pub fn count(&self, reason: TerminationReason) -> u64 {
        self.counts[reason.index()].load(Ordering::Relaxed)
    }

    /// Point-in-time values for every reason, in a stable order.
    pub fn snapshot(&self) -> Vec<(TerminationReason, u64)> {
        TerminationReason::ALL
            .iter()
            .map(|r| (*r, self.count(*r)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_start_at_zero() {
        let metrics = TerminationMetrics::new();
        assert_eq!(metrics.count(TerminationReason::Emptiness), 0);
        assert_eq!(metrics.count(TerminationReason::Expiration), 0);
    }

    #[test]
    fn reasons_are_counted_independently() {
        let metrics = TerminationMetrics::new();
        metrics.inc(TerminationReason::Emptiness);
        metrics.inc(TerminationReason::Emptiness);
        metrics.inc(TerminationReason::Expiration);

        assert_eq!(
            metrics.snapshot(),
            vec![
                (TerminationReason::Emptiness, 2),
                (TerminationReason::Expiration, 1),
            ]
        );
    }

    #[test]
    fn concurrent_increments() {
        let metrics = Arc::new(TerminationMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.inc(TerminationReason::Expiration);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.count(TerminationReason::Expiration), 800);
    }

    #[test]
    fn label_values() {
        assert_eq!(TerminationReason::Emptiness.to_string(), "emptiness");
        assert_eq!(TerminationReason::Expiration.as_str(), "expiration");
    }
}
