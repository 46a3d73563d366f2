//! Background task dedup
//!
//! The autopeer workflow runs as a spawned task, at most one in flight
//! per (from ASN, to ASN) pair. A second request for a running pair is
//! rejected, never queued.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct TaskRegistry {
    inflight: Mutex<HashSet<(u32, u32)>>,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(TaskRegistry::default())
    }

    /// Claim the pair. The returned guard releases the claim on drop, so
    /// a panicking task does not wedge the pair forever.
    pub fn try_acquire(self: &Arc<Self>, from_asn: u32, to_asn: u32) -> Result<TaskGuard> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());

        if !inflight.insert((from_asn, to_asn)) {
            return Err(Error::TaskLimit(format!(
                "autopeer task for AS{from_asn} -> AS{to_asn}"
            )));
        }

        Ok(TaskGuard {
            registry: Arc::clone(self),
            pair: (from_asn, to_asn),
        })
    }
}

#[derive(Debug)]
pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    pair: (u32, u32),
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut inflight = self
            .registry
            .inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        inflight.remove(&self.pair);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_pair_is_rejected() {
        let registry = TaskRegistry::new();

        let guard = registry.try_acquire(63311, 20).unwrap();
        let err = registry.try_acquire(63311, 20).unwrap_err();
        assert!(matches!(err, Error::TaskLimit(_)));

        // a different pair is unaffected
        registry.try_acquire(63311, 21).unwrap();

        drop(guard);
        registry.try_acquire(63311, 20).unwrap();
    }
}
