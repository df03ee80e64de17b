//! Reference-counted exit gate
//!
//! The gate keeps the process alive while anything still holds a
//! [`GateReference`]: every visible window holds one, and every in-flight
//! window spawn holds one until the new window has registered itself.
//!
//! The counter itself is a lock-free atomic. The mutex/condvar pair is only
//! used for the notify-on-zero handshake, so a release that drops the count to
//! zero can never slip in between a waiter's check and its sleep.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Counted barrier that gates process exit on zero outstanding references
#[derive(Debug, Default)]
pub struct ReferenceGate {
    count: AtomicUsize,
    lock: Mutex<()>,
    zero: Condvar,
}

impl ReferenceGate {
    /// Create a new gate with no outstanding references
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take one reference
    ///
    /// The reference is released when the returned token is dropped. The
    /// token is the only way to decrement the counter, so the gate can never
    /// underflow.
    #[must_use = "dropping the reference releases it immediately"]
    pub fn acquire(self: &Arc<Self>) -> GateReference {
        let previous = self.count.fetch_add(1, Ordering::AcqRel);
        log::trace!("Gate reference acquired ({} -> {})", previous, previous + 1);
        GateReference {
            gate: Arc::clone(self),
        }
    }

    /// Current number of outstanding references
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Block the calling thread until the counter is zero
    pub fn wait_until_zero(&self) {
        let mut guard = self.lock.lock();
        while self.count() != 0 {
            self.zero.wait(&mut guard);
        }
    }

    /// Block until the counter is zero or the timeout elapses
    ///
    /// Returns `true` if the counter was observed at zero.
    pub fn wait_until_zero_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        while self.count() != 0 {
            if self.zero.wait_until(&mut guard, deadline).timed_out() {
                return self.count() == 0;
            }
        }
        true
    }

    fn release(&self) {
        let previous = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "reference gate underflow");
        log::trace!("Gate reference released ({} -> {})", previous, previous - 1);
        if previous == 1 {
            // Taking the lock orders this notify after any waiter that has
            // already checked the counter and is about to sleep.
            let _guard = self.lock.lock();
            self.zero.notify_all();
        }
    }
}

/// Scoped reference on a [`ReferenceGate`]
///
/// Deliberately not `Clone`: each token accounts for exactly one increment.
#[derive(Debug)]
pub struct GateReference {
    gate: Arc<ReferenceGate>,
}

impl GateReference {
    /// The gate this reference is held on
    pub fn gate(&self) -> &Arc<ReferenceGate> {
        &self.gate
    }
}

impl Drop for GateReference {
    fn drop(&mut self) {
        self.gate.release();
    }
}
