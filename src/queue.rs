//! The multi-producer / single-consumer work queue bridging threads.
//!
//! Two FIFO lanes behind independent locks: an out-of-band lane that is
//! always drained first (cancellations and other items that must overtake
//! regular work) and a normal lane. A counting [`Semaphore`] records the
//! total item count across both lanes and gates blocking dequeues.
//!
//! Each lock is held only long enough to link or unlink a single item, and
//! an item's payload is moved out only after it has been detached, so
//! producers never contend with a running work item.

use std::collections::VecDeque;

use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::trace;

use crate::sync::Semaphore;

/// A unit of queued work: takes no arguments, returns nothing.
pub type WorkItem = Box<dyn FnOnce() + Send>;

/// Multiple-writer, one-reader queue of [`WorkItem`]s with normal and
/// out-of-band lanes.
///
/// Any number of threads may enqueue; exactly one thread should dequeue.
/// Several threads dequeueing concurrently is outside the contract: nothing
/// unsafe happens, but the inter-lane ordering guarantees no longer hold.
pub struct WorkQueue {
    normal: Mutex<VecDeque<WorkItem>>,
    out_of_band: Mutex<VecDeque<WorkItem>>,
    /// Total item count across both lanes.
    items: Semaphore,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            normal: Mutex::new(VecDeque::new()),
            out_of_band: Mutex::new(VecDeque::new()),
            items: Semaphore::new(0),
        }
    }

    /// Append a work item to the normal lane and wake one waiter. Never
    /// blocks beyond the moment needed to link the item.
    pub fn enqueue(&self, item: WorkItem) {
        self.enqueue_on(&self.normal, item);

        #[cfg(feature = "tracing")]
        trace!(lane = "normal", "enqueued work item");
    }

    /// Append a work item to the out-of-band lane. Out-of-band items are
    /// handled before all regular ones — a cancellation of a previous work
    /// item, or something similar.
    pub fn enqueue_oob(&self, item: WorkItem) {
        self.enqueue_on(&self.out_of_band, item);

        #[cfg(feature = "tracing")]
        trace!(lane = "oob", "enqueued work item");
    }

    fn enqueue_on(&self, lane: &Mutex<VecDeque<WorkItem>>, item: WorkItem) {
        lane.lock().push_back(item);
        // The counter is released only after the item is linked, so a woken
        // consumer always finds it.
        self.items.release();
    }

    /// Dequeue a work item, blocking until one is available. Drains the
    /// out-of-band lane before the normal lane.
    pub fn dequeue(&self) -> WorkItem {
        self.items.acquire();
        self.unlink_one()
            .expect("work queue counter and lane contents disagree")
    }

    /// Dequeue a work item if any is queued, without blocking.
    pub fn try_dequeue(&self) -> Option<WorkItem> {
        if self.items.try_acquire() {
            Some(
                self.unlink_one()
                    .expect("work queue counter and lane contents disagree"),
            )
        } else {
            None
        }
    }

    /// How many items are queued right now. Advisory, like
    /// [`Semaphore::value`].
    pub fn len(&self) -> usize {
        self.items.value()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unlink_one(&self) -> Option<WorkItem> {
        // One lane lock at a time; the item is moved out after unlinking.
        if let Some(item) = self.out_of_band.lock().pop_front() {
            return Some(item);
        }
        self.normal.lock().pop_front()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("queued", &self.len())
            .finish()
    }
}
