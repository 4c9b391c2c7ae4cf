//! Handoff of the link between the poller and the scanner.
//!
//! The poller may only talk to the radio while holding a [`PollTurn`]; the
//! scanner only while holding the [`ScanLease`]. Both are taken under the
//! same lock, so "is a scan running?" and "send the next poll command" can
//! never be split by a scan starting in between.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

#[derive(Debug, Default)]
pub struct LinkArbiter {
    /// `true` while a scan lease is outstanding.
    leased: Mutex<bool>,
}

/// The poller's right to use the link for one poll cycle.
///
/// Holding it blocks a scan from starting until the cycle ends.
#[must_use]
pub struct PollTurn<'a> {
    _guard: MutexGuard<'a, bool>,
}

/// The scanner's exclusive claim on the link. Released on drop.
#[must_use]
pub struct ScanLease {
    arbiter: Arc<LinkArbiter>,
}

impl LinkArbiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A poll turn, unless a scan holds the link.
    pub fn poll_turn(&self) -> Option<PollTurn<'_>> {
        let guard = self.lock();
        if *guard {
            return None;
        }
        Some(PollTurn { _guard: guard })
    }

    /// Claim the link for a scan, waiting for any poll cycle in progress.
    /// `None` if another lease is already out.
    pub fn lease(self: &Arc<Self>) -> Option<ScanLease> {
        let mut leased = self.lock();
        if *leased {
            return None;
        }
        *leased = true;
        debug!("scan lease taken");
        Some(ScanLease {
            arbiter: Arc::clone(self),
        })
    }

    pub fn is_leased(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.leased.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ScanLease {
    fn drop(&mut self) {
        *self.arbiter.lock() = false;
        debug!("scan lease released");
    }
}
