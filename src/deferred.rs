//! The deferred combinator: `defer(f).until(...)`.
//!
//! `defer` wraps an N-ary function; `until` wires it to its argument
//! operations and produces a new operation that becomes ready exactly when
//! every argument is ready, carrying either the function's return value or
//! the first failure observed on any argument.
//!
//! ```no_run
//! # use sparkles::{defer, ResultOp};
//! # fn leaves() -> (sparkles::OpHandle<i32>, sparkles::OpHandle<i32>) { unimplemented!() }
//! let (a, b) = leaves();
//! let sum = defer(|a: i32, b: i32| a + b).until((a, b));
//! // ...once a and b finish with values:
//! assert_eq!(sum.result().unwrap(), 11);
//! ```
//!
//! Arguments are given as a single operand or a tuple of up to eight
//! operands. Each position accepts an operation handle (evaluated by its
//! result, contributing a dependency) or a plain value (lifted into an
//! already-completed operand, contributing none). Rust lacks variadic
//! generics, so the per-arity impls are macro-generated, one per tuple
//! size — the standard approach for heterogeneous argument lists.

use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::{trace, warn};

use crate::error::{Captured, OpError};
use crate::impl_result_op;
use crate::operation::{
    register_as_dependent, OpCell, OpHandle, OpRef, Operation, OperationExt, ResultOp, WeakOpRef,
};
use crate::result::OpResult;

/// One wired argument position: either a literal lifted into a completed
/// value, or an operation together with its typed extraction function.
pub struct Operand<T> {
    inner: OperandInner<T>,
}

enum OperandInner<T> {
    /// Literal argument; already complete, contributes no dependency.
    Ready(T),
    /// Operation argument: the node joins the dependency list, the closure
    /// extracts the typed result at invocation time.
    Pending {
        node: OpRef,
        read: Box<dyn FnOnce() -> Result<T, OpError> + Send>,
    },
}

impl<T> Operand<T> {
    /// Lift a plain value into a completed operand.
    pub fn ready(value: T) -> Self {
        Self {
            inner: OperandInner::Ready(value),
        }
    }

    fn from_op<O>(op: Arc<O>) -> Self
    where
        O: ResultOp<T> + 'static,
        T: Clone + Send + 'static,
    {
        let node: OpRef = op.clone();
        Self {
            inner: OperandInner::Pending {
                node,
                read: Box::new(move || op.result()),
            },
        }
    }

    fn node(&self) -> Option<&OpRef> {
        match &self.inner {
            OperandInner::Ready(_) => None,
            OperandInner::Pending { node, .. } => Some(node),
        }
    }

    /// Extract the positional value. Consumes the operand; the suspended
    /// call is invocable exactly once.
    fn take(self) -> Result<T, OpError> {
        match self.inner {
            OperandInner::Ready(value) => Ok(value),
            OperandInner::Pending { read, .. } => read(),
        }
    }
}

/// Disambiguation marker: the argument is an operation handle. Never named
/// by callers; it exists so the handle and plain-value conversions can both
/// be blanket impls.
pub struct FromOperation;

/// Disambiguation marker: the argument is a plain value.
pub struct FromValue;

/// Conversion of one `until` argument position into an [`Operand`].
///
/// The `Marker` parameter only disambiguates the blanket impls (a value
/// could otherwise collide with a handle); callers never name it.
pub trait IntoOperand<T, Marker> {
    fn into_operand(self) -> Operand<T>;
}

impl<T: Clone + Send + 'static> IntoOperand<T, FromValue> for T {
    fn into_operand(self) -> Operand<T> {
        Operand::ready(self)
    }
}

impl<T, O> IntoOperand<T, FromOperation> for Arc<O>
where
    T: Clone + Send + 'static,
    O: ResultOp<T> + 'static,
{
    fn into_operand(self) -> Operand<T> {
        Operand::from_op(self)
    }
}

impl<'a, T, O> IntoOperand<T, FromOperation> for &'a Arc<O>
where
    T: Clone + Send + 'static,
    O: ResultOp<T> + 'static,
{
    fn into_operand(self) -> Operand<T> {
        Operand::from_op(self.clone())
    }
}

impl<T: Clone + Send + 'static> IntoOperand<T, FromOperation> for OpHandle<T> {
    fn into_operand(self) -> Operand<T> {
        let node: OpRef = self.clone();
        Operand {
            inner: OperandInner::Pending {
                node,
                read: Box::new(move || self.result()),
            },
        }
    }
}

impl<'a, T: Clone + Send + 'static> IntoOperand<T, FromOperation> for &'a OpHandle<T> {
    fn into_operand(self) -> Operand<T> {
        self.clone().into_operand()
    }
}

/// The function and wired argument tuple of a deferred operation, invocable
/// exactly once. Reads the operands in positional order (the first failing
/// read becomes the whole result), then evaluates the function with panics
/// captured.
struct SuspendedCall<R> {
    call: Box<dyn FnOnce() -> OpResult<R> + Send>,
}

impl<R> SuspendedCall<R> {
    fn new(call: impl FnOnce() -> OpResult<R> + Send + 'static) -> Self {
        Self {
            call: Box::new(call),
        }
    }

    fn invoke(self) -> OpResult<R> {
        (self.call)()
    }
}

/// Render an accessor error as the result of the operation that observed
/// it. Propagated failures keep their payload; anything else (an unfinished
/// read, which the readiness protocol rules out) degrades to a captured
/// description.
fn bad_result_from<R>(err: OpError) -> OpResult<R> {
    match err {
        OpError::Failed(code) => OpResult::Error(code),
        OpError::Panicked(captured) => OpResult::Panicked(captured),
        other => OpResult::Panicked(Captured::new(other)),
    }
}

/// An operation representing the lazy application of a function to its
/// argument operations. Produced by [`Deferred::until`].
pub struct DeferredOp<R: Send + 'static> {
    cell: OpCell<R>,
    call: Mutex<Option<SuspendedCall<R>>>,
}

impl<R: Send + 'static> DeferredOp<R> {
    fn create(call: SuspendedCall<R>, dependencies: Vec<OpRef>) -> Arc<Self> {
        let op: Arc<DeferredOp<R>> = Arc::new_cyclic(|weak: &Weak<DeferredOp<R>>| {
            let self_ref: WeakOpRef = weak.clone();
            DeferredOp {
                cell: OpCell::new(self_ref, dependencies),
                call: Mutex::new(Some(call)),
            }
        });

        #[cfg(feature = "tracing")]
        trace!(id = ?op.id(), "created deferred operation");

        let handle: OpRef = op.clone();
        if let Err(_err) = register_as_dependent(&handle) {
            // Registration can only fail if an immediate notification is
            // rejected, which a freshly built node cannot do.
            #[cfg(feature = "tracing")]
            warn!(id = ?op.id(), error = %_err, "deferred registration failed");
        }

        // Every-argument-a-literal wiring leaves nothing to notify this
        // operation, so the call runs right away.
        if !op.finished() && op.cell.node().dependency_count() == 0 {
            let call = op.call.lock().take();
            if let Some(call) = call {
                let _ = op.cell.set_raw_result(call.invoke());
            }
        }
        op
    }
}

impl<R: Send + 'static> Operation for DeferredOp<R> {
    fn node(&self) -> &crate::node::NodeCore {
        self.cell.node()
    }

    fn failure(&self) -> Option<crate::error::Failure> {
        self.cell.failure()
    }

    fn on_dependency_finished(&self, dependency: &OpRef) -> Result<(), OpError> {
        if self.finished() {
            return Ok(());
        }

        // Fail fast: a dependency that finished badly becomes this
        // operation's result and the call is discarded unrun.
        if let Some(failure) = dependency.failure() {
            drop(self.call.lock().take());
            return self.cell.set_failure(failure);
        }

        if !self.cell.node().has_unfinished_dependency() {
            let call = self.call.lock().take();
            if let Some(call) = call {
                return self.cell.set_raw_result(call.invoke());
            }
        }
        Ok(())
    }
}

impl_result_op!(<R> DeferredOp<R>);

/// A function waiting to be wired to its argument operations. See
/// [`defer`].
pub struct Deferred<F> {
    func: F,
}

impl<F> Deferred<F> {
    /// Produce the operation that applies the wrapped function once every
    /// argument operation is ready.
    ///
    /// `args` is one operand or a tuple of 1..=8 operands; zero-argument
    /// deferral is unrepresentable. Supplying the same operation in more
    /// than one position yields a single dependency and one positional read
    /// per occurrence.
    pub fn until<Args, Marker>(self, args: Args) -> Arc<DeferredOp<Args::Output>>
    where
        Args: OperandList<F, Marker>,
    {
        args.wire(self.func)
    }
}

/// Defer execution of `func` until its arguments are available.
///
/// Deferring a function with no arguments until its arguments are ready is
/// meaningless, and no such wiring exists.
pub fn defer<F>(func: F) -> Deferred<F> {
    Deferred { func }
}

/// Argument-tuple wiring for [`Deferred::until`]. Implemented for single
/// operands and for tuples of 1..=8 operands; internal, macro-generated.
pub trait OperandList<F, Marker> {
    type Output: Send + 'static;

    fn wire(self, func: F) -> Arc<DeferredOp<Self::Output>>;
}

/// Marker distinguishing the bare single-operand form from 1-tuples.
pub struct Single<M>(PhantomData<M>);

// The argument types ride along inside the marker (`(A, M)` pairs) so the
// impls stay coherent: a type parameter that only appeared in an `FnOnce`
// bound would otherwise be unconstrained.
impl<F, R, A, P, M> OperandList<F, Single<(A, M)>> for P
where
    F: FnOnce(A) -> R + Send + 'static,
    R: Send + 'static,
    A: Clone + Send + 'static,
    P: IntoOperand<A, M>,
{
    type Output = R;

    fn wire(self, func: F) -> Arc<DeferredOp<R>> {
        (self,).wire(move |a| func(a))
    }
}

macro_rules! impl_operand_list {
    ($(($A:ident, $P:ident, $M:ident, $a:ident)),+) => {
        impl<F, R, $($A, $P, $M),+> OperandList<F, ($(($A, $M),)+)> for ($($P,)+)
        where
            F: FnOnce($($A),+) -> R + Send + 'static,
            R: Send + 'static,
            $($A: Clone + Send + 'static,)+
            $($P: IntoOperand<$A, $M>,)+
        {
            type Output = R;

            fn wire(self, func: F) -> Arc<DeferredOp<R>> {
                let ($($a,)+) = self;
                $(let $a = $a.into_operand();)+

                // Pending operands contribute dependencies; Ready operands
                // do not. Identity dedup happens in NodeCore.
                let dependencies: Vec<OpRef> = [$($a.node().cloned()),+]
                    .into_iter()
                    .flatten()
                    .collect();

                let call = SuspendedCall::new(move || {
                    $(
                        let $a = match $a.take() {
                            Ok(value) => value,
                            Err(err) => return bad_result_from(err),
                        };
                    )+
                    match catch_unwind(AssertUnwindSafe(move || func($($a),+))) {
                        Ok(value) => OpResult::Value(value),
                        Err(payload) => OpResult::Panicked(Captured::from_unwind(payload)),
                    }
                });

                DeferredOp::create(call, dependencies)
            }
        }
    };
}

impl_operand_list!((A1, P1, M1, a1));
impl_operand_list!((A1, P1, M1, a1), (A2, P2, M2, a2));
impl_operand_list!((A1, P1, M1, a1), (A2, P2, M2, a2), (A3, P3, M3, a3));
impl_operand_list!(
    (A1, P1, M1, a1),
    (A2, P2, M2, a2),
    (A3, P3, M3, a3),
    (A4, P4, M4, a4)
);
impl_operand_list!(
    (A1, P1, M1, a1),
    (A2, P2, M2, a2),
    (A3, P3, M3, a3),
    (A4, P4, M4, a4),
    (A5, P5, M5, a5)
);
impl_operand_list!(
    (A1, P1, M1, a1),
    (A2, P2, M2, a2),
    (A3, P3, M3, a3),
    (A4, P4, M4, a4),
    (A5, P5, M5, a5),
    (A6, P6, M6, a6)
);
impl_operand_list!(
    (A1, P1, M1, a1),
    (A2, P2, M2, a2),
    (A3, P3, M3, a3),
    (A4, P4, M4, a4),
    (A5, P5, M5, a5),
    (A6, P6, M6, a6),
    (A7, P7, M7, a7)
);
impl_operand_list!(
    (A1, P1, M1, a1),
    (A2, P2, M2, a2),
    (A3, P3, M3, a3),
    (A4, P4, M4, a4),
    (A5, P5, M5, a5),
    (A6, P6, M6, a6),
    (A7, P7, M7, a7),
    (A8, P8, M8, a8)
);
