//! Violation aggregation

use crate::error::MonitorError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use vigil_core::{ViolationEvent, ViolationLedger};

/// Callback invoked once per merged violation event
pub type ViolationCallback = Arc<dyn Fn(&ViolationEvent) + Send + Sync>;

/// Shared violation ledger for one session.
///
/// A batch is applied under a single write lock, so readers never observe
/// half of a frame's events.
pub struct ViolationAggregator {
    ledger: RwLock<ViolationLedger>,
    frozen: AtomicBool,
    listeners: RwLock<Vec<ViolationCallback>>,
}

impl ViolationAggregator {
    pub fn new() -> Self {
        Self {
            ledger: RwLock::new(ViolationLedger::new()),
            frozen: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Merge one frame's events and notify subscribers.
    ///
    /// Listeners run after the ledger lock is released, in event order.
    pub fn merge(&self, events: &[ViolationEvent]) -> Result<usize, MonitorError> {
        let merged = {
            let mut ledger = self.ledger.write();
            if self.frozen.load(Ordering::SeqCst) {
                debug!("Dropping {} events, ledger is frozen", events.len());
                return Err(MonitorError::SessionStopped);
            }
            ledger.merge(events)
        };

        if merged > 0 {
            let listeners: Vec<ViolationCallback> = self.listeners.read().clone();
            for event in events {
                for listener in &listeners {
                    listener(event);
                }
            }
        }

        Ok(merged)
    }

    /// Copy of the current ledger
    pub fn snapshot(&self) -> ViolationLedger {
        self.ledger.read().clone()
    }

    /// Reject all further merges. Waits for an in-progress merge to finish.
    pub fn freeze(&self) {
        let _ledger = self.ledger.write();
        if !self.frozen.swap(true, Ordering::SeqCst) {
            info!("Violation ledger frozen");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ViolationEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(callback));
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl Default for ViolationAggregator {
    fn default() -> Self {
        Self::new()
    }
}
