//! The cross-thread bridge: remote operations, promises, and the inverse
//! promised-operation adapter.
//!
//! A [`RemoteOperation`] is a consumer-side placeholder for a result
//! produced on another thread. Its [`Promise`] lives with the producer and
//! never touches the operation directly: each fulfillment is a closure
//! carrying the result, enqueued on the consumer's [`WorkQueue`] and applied
//! there. The dependents map is owned by the consumer thread, the promise by
//! the producer thread, and the queue is the only thing both touch.
//!
//! Cancellation is value-based: dropping the last strong handle to the
//! remote turns every later delivery into a no-op, and producers can poll
//! [`Promise::still_needed`] to skip work entirely.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

use crate::error::{BrokenPromise, Captured, ErrorCode, Failure, OpError};
use crate::impl_result_op;
use crate::node::NodeCore;
use crate::operation::{
    register_as_dependent, OpCell, OpRef, Operation, OperationExt, ResultOp, WeakOpRef,
};
use crate::queue::WorkQueue;
use crate::result::OpResult;

/// A local placeholder for an operation whose result is produced in another
/// thread. Created in a pair with its [`Promise`]; finished only by the
/// delivery closures the promise enqueues.
pub struct RemoteOperation<T: Send + 'static> {
    cell: OpCell<T>,
}

impl<T: Send + 'static> RemoteOperation<T> {
    /// Create a linked (remote, promise) pair bound to the consumer's
    /// queue. The remote lives with the consumer; the promise is handed to
    /// the producer.
    pub fn create(queue: Arc<WorkQueue>) -> (Arc<Self>, Promise<T>) {
        let remote: Arc<RemoteOperation<T>> = Arc::new_cyclic(|weak: &Weak<RemoteOperation<T>>| {
            let self_ref: WeakOpRef = weak.clone();
            RemoteOperation {
                cell: OpCell::new(self_ref, std::iter::empty()),
            }
        });

        #[cfg(feature = "tracing")]
        debug!(id = ?remote.id(), "created remote operation");

        let promise = Promise {
            remote: Arc::downgrade(&remote),
            queue,
            fulfilled: false,
        };
        (remote, promise)
    }
}

impl<T: Send + 'static> Operation for RemoteOperation<T> {
    fn node(&self) -> &NodeCore {
        self.cell.node()
    }

    fn failure(&self) -> Option<Failure> {
        self.cell.failure()
    }

    fn on_dependency_finished(&self, _dependency: &OpRef) -> Result<(), OpError> {
        Err(OpError::BadDependency(
            "remote operations have no dependencies",
        ))
    }
}

impl_result_op!(<T> RemoteOperation<T>);

/// The producer-side setter of a [`RemoteOperation`].
///
/// Holds only a weak reference to its remote — a promise must not extend
/// the remote's life — plus a handle to the consumer's queue. Designed for
/// a single producer: the setters take `&mut self` and each promise can be
/// fulfilled at most once.
///
/// Dropping a promise that is still needed synthesises a [`BrokenPromise`]
/// failure and delivers it through the queue; the drop path never panics.
pub struct Promise<T: Send + 'static> {
    remote: Weak<RemoteOperation<T>>,
    queue: Arc<WorkQueue>,
    fulfilled: bool,
}

impl<T: Send + 'static> Promise<T> {
    /// Fulfill with a value.
    pub fn set_result(&mut self, value: T) -> Result<(), OpError> {
        if self.fulfilled {
            return Err(OpError::InvalidResult("promise already fulfilled"));
        }
        self.deliver(OpResult::Value(value));
        Ok(())
    }

    /// Fulfill with an error code. The zero code is rejected before the
    /// promise is considered fulfilled.
    pub fn set_error(&mut self, code: ErrorCode) -> Result<(), OpError> {
        if self.fulfilled {
            return Err(OpError::InvalidResult("promise already fulfilled"));
        }
        if code.is_none() {
            return Err(OpError::InvalidArgument(
                "cannot store a no-error error code",
            ));
        }
        self.deliver(OpResult::Error(code));
        Ok(())
    }

    /// Fulfill with a captured panic.
    pub fn set_panicked(&mut self, captured: Captured) -> Result<(), OpError> {
        if self.fulfilled {
            return Err(OpError::InvalidResult("promise already fulfilled"));
        }
        self.deliver(OpResult::Panicked(captured));
        Ok(())
    }

    /// Is the result still wanted? False once the promise has been
    /// fulfilled or the remote has been dropped. Producers may poll this to
    /// skip work whose consumer has gone away.
    pub fn still_needed(&self) -> bool {
        !self.fulfilled && self.remote.strong_count() > 0
    }

    pub fn fulfilled(&self) -> bool {
        self.fulfilled
    }

    /// Enqueue the delivery closure and mark the promise fulfilled. The
    /// closure holds the remote weakly and upgrades on the consumer thread;
    /// a dead remote makes it a no-op.
    fn deliver(&mut self, result: OpResult<T>) {
        if self.remote.strong_count() > 0 {
            let weak = self.remote.clone();
            self.queue.enqueue(Box::new(move || {
                if let Some(remote) = weak.upgrade() {
                    if let Err(_err) = remote.cell.set_raw_result(result) {
                        #[cfg(feature = "tracing")]
                        warn!(error = %_err, "remote operation rejected delivery");
                    }
                }
            }));
        }
        self.fulfilled = true;
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if self.fulfilled {
            return;
        }

        #[cfg(feature = "tracing")]
        debug!("promise dropped unfulfilled, delivering broken promise");

        // Still needed: the consumer must learn it will never get a real
        // result. Delivery failures are swallowed; a destructor cannot
        // meaningfully report them.
        self.deliver(OpResult::Panicked(Captured::new(BrokenPromise)));
    }
}

/// The inverse bridge: watches a local operation and forwards its result
/// into a [`Promise`] for some other thread's remote operation.
///
/// It is itself an operation over `T`, with the local operation as its sole
/// dependency; when the local finishes, the result is copied into the
/// promise and mirrored here.
///
/// Supplying the remote's own promise together with a local operation that
/// (transitively) waits on that same remote creates a cross-thread cycle.
/// Nothing here can detect that; it is the caller's responsibility.
pub struct PromisedOperation<T: Clone + Send + 'static> {
    cell: OpCell<T>,
    state: Mutex<Option<PromisedState<T>>>,
}

struct PromisedState<T: Clone + Send + 'static> {
    promise: Promise<T>,
    local: Arc<dyn ResultOp<T>>,
}

impl<T: Clone + Send + 'static> PromisedOperation<T> {
    /// Wire `promise` to be fulfilled from `local` when it finishes on this
    /// thread.
    pub fn create<O>(promise: Promise<T>, local: Arc<O>) -> Arc<Self>
    where
        O: ResultOp<T> + 'static,
    {
        let dependency: OpRef = local.clone();
        let typed: Arc<dyn ResultOp<T>> = local;

        let op: Arc<PromisedOperation<T>> = Arc::new_cyclic(|weak: &Weak<PromisedOperation<T>>| {
            let self_ref: WeakOpRef = weak.clone();
            PromisedOperation {
                cell: OpCell::new(self_ref, [dependency]),
                state: Mutex::new(Some(PromisedState {
                    promise,
                    local: typed,
                })),
            }
        });

        let handle: OpRef = op.clone();
        if let Err(_err) = register_as_dependent(&handle) {
            #[cfg(feature = "tracing")]
            warn!(id = ?op.id(), error = %_err, "promised operation registration failed");
        }
        op
    }
}

impl<T: Clone + Send + 'static> Operation for PromisedOperation<T> {
    fn node(&self) -> &NodeCore {
        self.cell.node()
    }

    fn failure(&self) -> Option<Failure> {
        self.cell.failure()
    }

    fn on_dependency_finished(&self, _dependency: &OpRef) -> Result<(), OpError> {
        if self.finished() {
            return Ok(());
        }
        let Some(state) = self.state.lock().take() else {
            return Ok(());
        };
        let PromisedState { mut promise, local } = state;

        let result = local.raw_result();
        let forwarded = match result.clone() {
            // The local finished without a result (destructively moved
            // out); the promise is dropped unfulfilled and reports a
            // broken promise instead.
            OpResult::Unset => Ok(()),
            OpResult::Value(value) => promise.set_result(value),
            OpResult::Error(code) => promise.set_error(code),
            OpResult::Panicked(captured) => promise.set_panicked(captured),
        };
        if let Err(_err) = forwarded {
            #[cfg(feature = "tracing")]
            warn!(id = ?self.id(), error = %_err, "promise rejected forwarded result");
        }
        drop(promise);

        if result.is_set() {
            self.cell.set_raw_result(result)
        } else {
            self.cell.node().finish();
            Ok(())
        }
    }
}

impl_result_op!(<T> PromisedOperation<T>);
