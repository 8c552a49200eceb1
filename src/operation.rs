//! The operation traits and the typed result cell concrete operations embed.
//!
//! An operation is a [`NodeCore`] plus an [`OpResult`]. Concrete operation
//! types own an [`OpCell`] privately and implement two traits over it:
//! [`Operation`] (the type-erased graph surface, including the readiness
//! hook) and [`ResultOp`] (the typed query surface). The cell's setters are
//! reachable only through that private ownership, which is what restricts
//! them to the operation's own implementation — handles passed around the
//! graph expose queries alone.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::trace;

use crate::error::{Captured, ErrorCode, Failure, OpError};
use crate::node::{NodeCore, NodeId};
use crate::result::OpResult;

/// Shared handle to a type-erased operation: the owning forward edge of the
/// graph.
pub type OpRef = Arc<dyn Operation>;

/// Weak handle to a type-erased operation: the back edge from a dependency
/// to its dependents.
pub type WeakOpRef = Weak<dyn Operation>;

/// Shared handle to an operation with result type `T`.
pub type OpHandle<T> = Arc<dyn ResultOp<T>>;

/// The type-erased surface every operation exposes to the graph.
///
/// Implementors embed an [`OpCell`] (or a bare [`NodeCore`]) and route
/// `node` and `failure` to it; `on_dependency_finished` is the hook where
/// each concrete operation decides whether it now has enough information to
/// produce its own result.
pub trait Operation: Send + Sync {
    /// The graph state of this operation.
    fn node(&self) -> &NodeCore;

    /// The failure this operation's result carries, if it finished badly.
    /// Used by dependents to fail fast without knowing the result type.
    fn failure(&self) -> Option<Failure>;

    /// A dependency of this operation has gone from unfinished to finished.
    ///
    /// This is *the* hook to implement. It runs on the operation's owning
    /// thread, after the notification has been validated against the
    /// dependency set. Implementations decide whether to finish, fail fast,
    /// or keep waiting.
    fn on_dependency_finished(&self, dependency: &OpRef) -> Result<(), OpError>;
}

/// Convenience queries and the validated notification entry point, blanket
/// implemented for every operation.
pub trait OperationExt: Operation {
    fn id(&self) -> NodeId {
        self.node().id()
    }

    fn finished(&self) -> bool {
        self.node().finished()
    }

    /// Entry point called by a finished dependency. Rejects operations this
    /// node does not depend on with `BadDependency`, then delegates to
    /// [`Operation::on_dependency_finished`].
    fn dependency_finished(&self, dependency: &OpRef) -> Result<(), OpError> {
        if !self.node().has_dependency(dependency.node().id()) {
            return Err(OpError::BadDependency("unknown dependency finished"));
        }
        self.on_dependency_finished(dependency)
    }
}

impl<O: Operation + ?Sized> OperationExt for O {}

/// The typed query surface of an operation with result type `T`.
///
/// All accessors are non-destructive except [`ResultOp::destroy_raw_result`],
/// which moves the variant out and leaves the operation finished but empty;
/// typed accessors report `InvalidResult` from that state.
pub trait ResultOp<T: Clone + Send + 'static>: Operation {
    /// Fetch a copy of the value. `Unset` reports `InvalidResult`; a stored
    /// error code or captured panic surfaces as the matching [`OpError`].
    fn result(&self) -> Result<T, OpError>;

    /// A clone of the whole result variant.
    fn raw_result(&self) -> OpResult<T>;

    /// Move the whole result variant out, leaving `Unset` behind.
    fn destroy_raw_result(&self) -> OpResult<T>;

    /// The stored error code, or `InvalidResult` if the result is missing
    /// or not an error.
    fn error(&self) -> Result<ErrorCode, OpError>;

    /// The stored captured panic, or `InvalidResult` if the result is
    /// missing or not a panic.
    fn captured_panic(&self) -> Result<Captured, OpError>;

    /// Does this operation hold any result at all?
    fn is_valid(&self) -> bool;

    fn is_error(&self) -> bool;

    fn is_panicked(&self) -> bool;
}

/// Register `op` as a dependent of each of its dependencies.
///
/// This is the second half of constructing an operation, separated from the
/// first because a node cannot hand out a weak reference to itself until its
/// shared identity exists. Factories call it immediately after `Arc::new_cyclic`;
/// hand-rolled operation types must call it themselves before the operation
/// can receive notifications.
///
/// Dependencies that already finished deliver their notification during
/// registration; if one of them finishes this operation (a failing
/// dependency, or the last one needed), the remaining registrations are
/// skipped.
pub fn register_as_dependent(op: &OpRef) -> Result<(), OpError> {
    #[cfg(feature = "tracing")]
    trace!(id = ?op.node().id(), "registering operation with its dependencies");

    for dependency in op.node().dependencies_snapshot() {
        if op.finished() {
            break;
        }
        dependency.node().add_dependent(op)?;
    }
    Ok(())
}

/// The state a concrete typed operation embeds: graph bookkeeping plus the
/// once-write result variant.
///
/// The setters finish the operation as a side effect, which is what drives
/// readiness propagation; they are intended for the type that owns the cell.
/// One deliberate exception to the once-write rule: after
/// [`OpCell::destroy_raw_result`] on a finished operation, further setters
/// are silent no-ops and do not re-run the finish protocol.
pub struct OpCell<T> {
    node: NodeCore,
    result: Mutex<OpResult<T>>,
}

impl<T> OpCell<T> {
    /// Build the cell from the owning operation's weak self reference and
    /// its dependencies. See [`register_as_dependent`] for the second
    /// construction step.
    pub fn new(self_ref: WeakOpRef, dependencies: impl IntoIterator<Item = OpRef>) -> Self {
        Self {
            node: NodeCore::new(self_ref, dependencies),
            result: Mutex::new(OpResult::Unset),
        }
    }

    pub fn node(&self) -> &NodeCore {
        &self.node
    }

    pub fn failure(&self) -> Option<Failure> {
        self.result.lock().failure()
    }

    pub fn is_valid(&self) -> bool {
        self.result.lock().is_set()
    }

    pub fn is_error(&self) -> bool {
        self.result.lock().is_error()
    }

    pub fn is_panicked(&self) -> bool {
        self.result.lock().is_panicked()
    }

    pub fn error(&self) -> Result<ErrorCode, OpError> {
        self.result.lock().error()
    }

    pub fn captured_panic(&self) -> Result<Captured, OpError> {
        self.result.lock().captured()
    }

    /// Move the result variant out. The operation stays finished; typed
    /// accessors report `InvalidResult` afterwards.
    pub fn destroy_raw_result(&self) -> OpResult<T> {
        std::mem::take(&mut *self.result.lock())
    }

    /// Record a success value, then finish.
    pub fn set_result(&self, value: T) -> Result<(), OpError> {
        self.write(OpResult::Value(value))
    }

    /// Record an error code, then finish. The zero code is rejected before
    /// anything else is consulted.
    pub fn set_error(&self, code: ErrorCode) -> Result<(), OpError> {
        if code.is_none() {
            return Err(OpError::InvalidArgument(
                "cannot store a no-error error code",
            ));
        }
        self.write(OpResult::Error(code))
    }

    /// Record a captured panic, then finish.
    pub fn set_panicked(&self, captured: Captured) -> Result<(), OpError> {
        self.write(OpResult::Panicked(captured))
    }

    /// Record either arm of a propagated [`Failure`], then finish.
    pub fn set_failure(&self, failure: Failure) -> Result<(), OpError> {
        match failure {
            Failure::Code(code) => self.set_error(code),
            Failure::Panic(captured) => self.set_panicked(captured),
        }
    }

    /// Record a whole result variant, then finish. An `Unset` input is a
    /// no-op and does not finish the operation.
    pub fn set_raw_result(&self, raw: OpResult<T>) -> Result<(), OpError> {
        if !raw.is_set() {
            return Ok(());
        }
        if let OpResult::Error(code) = &raw {
            if code.is_none() {
                return Err(OpError::InvalidArgument(
                    "cannot store a no-error error code",
                ));
            }
        }
        self.write(raw)
    }

    fn write(&self, incoming: OpResult<T>) -> Result<(), OpError> {
        {
            let mut result = self.result.lock();
            if self.node.finished() && !result.is_set() {
                // The result was destructively moved out of a finished
                // operation; later setters are silent no-ops.
                return Ok(());
            }
            result.assign_from(incoming)?;
        }
        // The lock is released before finishing: the drain may re-enter
        // this operation's queries from its dependents.
        self.node.finish();
        Ok(())
    }
}

impl<T: Clone> OpCell<T> {
    pub fn result(&self) -> Result<T, OpError> {
        self.result.lock().peek()
    }

    pub fn raw_result(&self) -> OpResult<T> {
        self.result.lock().clone()
    }
}

/// Generate the [`ResultOp`] delegation for a concrete operation type that
/// stores its [`OpCell`] in a field named `cell`.
///
/// ```ignore
/// impl_result_op!(<T> MyOp<T>);     // generic over the result type
/// impl_result_op!(MyVoidOp => ());  // fixed result type
/// ```
#[macro_export]
macro_rules! impl_result_op {
    (@methods $T:ty) => {
        fn result(&self) -> Result<$T, $crate::OpError> {
            self.cell.result()
        }
        fn raw_result(&self) -> $crate::OpResult<$T> {
            self.cell.raw_result()
        }
        fn destroy_raw_result(&self) -> $crate::OpResult<$T> {
            self.cell.destroy_raw_result()
        }
        fn error(&self) -> Result<$crate::ErrorCode, $crate::OpError> {
            self.cell.error()
        }
        fn captured_panic(&self) -> Result<$crate::Captured, $crate::OpError> {
            self.cell.captured_panic()
        }
        fn is_valid(&self) -> bool {
            self.cell.is_valid()
        }
        fn is_error(&self) -> bool {
            self.cell.is_error()
        }
        fn is_panicked(&self) -> bool {
            self.cell.is_panicked()
        }
    };
    (<$T:ident> $op:ty) => {
        impl<$T: Clone + Send + 'static> $crate::ResultOp<$T> for $op {
            $crate::impl_result_op!(@methods $T);
        }
    };
    ($op:ty => $T:ty) => {
        impl $crate::ResultOp<$T> for $op {
            $crate::impl_result_op!(@methods $T);
        }
    };
}
