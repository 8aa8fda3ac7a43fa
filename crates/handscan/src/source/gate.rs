//! Single-outstanding-request guard for external backends.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SourceError;

/// Busy flag owned by one backend adapter.
///
/// A second request while one is outstanding is rejected rather than
/// queued, so two completions can never race to resolve the same result.
#[derive(Debug)]
pub struct RequestGate {
    name: &'static str,
    busy: AtomicBool,
}

/// Held for the duration of one request; releases the gate on drop.
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a RequestGate,
}

impl RequestGate {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            busy: AtomicBool::new(false),
        }
    }

    pub fn try_acquire(&self) -> Result<GatePermit<'_>, SourceError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SourceError::Busy(self.name))?;
        Ok(GatePermit { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}
