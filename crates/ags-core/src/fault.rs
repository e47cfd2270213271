//! Runtime faults recorded on the tick path.
//!
//! Faults are never returned through the audio path. The tick records them
//! in a bounded [`FaultLog`] and carries on; a control thread drains the log
//! at its own pace. A full log drops new faults and counts them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::ids::RecallKey;

/// A degraded but non-fatal runtime event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// A leaf recall overran its share of the tick. Its output for the tick
    /// was dropped.
    #[error("{recall} overran its budget: {elapsed:?} > {budget:?}")]
    RealtimeViolation {
        /// Offending recall.
        recall: RecallKey,
        /// Time spent in the run call.
        elapsed: Duration,
        /// Allowed time.
        budget: Duration,
    },

    /// A worker reply did not arrive in time. The recall retries next tick.
    #[error("{recall} waited {waited_ticks} tick(s) for a worker reply")]
    WorkerTimeout {
        /// Waiting recall.
        recall: RecallKey,
        /// Ticks since the work was scheduled.
        waited_ticks: u64,
    },
}

/// Bounded, lock-free fault sink.
#[derive(Debug)]
pub struct FaultLog {
    tx: Sender<Fault>,
    rx: Receiver<Fault>,
    dropped: AtomicU64,
}

impl FaultLog {
    /// Creates a log holding up to `capacity` faults (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Records `fault`. Never blocks.
    pub fn record(&self, fault: Fault) {
        tracing::warn!("fault: {fault}");
        match self.tx.try_send(fault) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Takes every recorded fault.
    pub fn drain(&self) -> Vec<Fault> {
        self.rx.try_iter().collect()
    }

    /// Faults recorded and not drained yet.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no fault is pending.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Faults lost because the log was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Key;

    fn timeout(ticks: u64) -> Fault {
        Fault::WorkerTimeout {
            recall: RecallKey::from_parts(1, 0),
            waited_ticks: ticks,
        }
    }

    #[test]
    fn full_log_counts_drops() {
        let log = FaultLog::new(2);
        for i in 0..5 {
            log.record(timeout(i));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 3);
        assert_eq!(log.drain(), vec![timeout(0), timeout(1)]);
        assert!(log.is_empty());
    }

    #[test]
    fn display_names_recall() {
        let text = timeout(3).to_string();
        assert!(text.contains("recall#1"), "{text}");
        assert!(text.contains("3 tick"), "{text}");
    }
}
