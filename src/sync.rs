//! The counting semaphore gating the work queue.
//!
//! A plain counting event built from a mutex and a condition variable, the
//! portable emulation of a native counting semaphore. It is the only
//! inter-thread signalling primitive in the crate.

use parking_lot::{Condvar, Mutex};

/// A counting semaphore.
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create with an initial count.
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Increase the count by one and wake one waiter.
    pub fn release(&self) {
        let mut count = self.count.lock();
        *count += 1;
        drop(count);
        self.available.notify_one();
    }

    /// Decrease the count by one, blocking while it is zero.
    pub fn acquire(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
    }

    /// Decrease the count by one if it is positive; returns whether it was.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// The current count. Advisory only: the value can change the moment it
    /// is read, so it is useful for debugging and never for coordination.
    pub fn value(&self) -> usize {
        *self.count.lock()
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
