//! Event-driven computation DAGs without inverted control flow.
//!
//! Sparkles composes asynchronous computations as a dynamic directed
//! acyclic graph of *operations*. Each operation represents a deferred or
//! in-flight result — a value, an error code, or a captured panic — whose
//! readiness is driven by the readiness of its declared dependencies. A
//! consumer writes `defer(f).until((a, b))` and receives an operation that
//! becomes ready exactly when `a` and `b` are ready, carrying either
//! `f(a.result, b.result)` or the first propagated failure.
//!
//! # Features
//!
//! - **Cycles prevented structurally**: dependencies are fixed when an
//!   operation is created and can only be removed afterwards, so the graph
//!   cannot acquire a cycle — no runtime cycle detection needed.
//! - **Failures as values**: an operation's result is a four-state variant
//!   ([`OpResult`]): unset, value, error code, or captured panic. Accessors
//!   return `Result`; nothing unwinds unless a caller decides to.
//! - **No reference cycles**: forward edges own ([`OpRef`]), back edges are
//!   weak. Finished operations release their dependencies eagerly.
//! - **Cross-thread bridging**: a [`Promise`]/[`RemoteOperation`] pair
//!   joined through a dual-lane MPSC [`WorkQueue`], with cooperative
//!   cancellation and a broken-promise protocol.
//! - **Short-circuiting combinator**: [`defer`] suspends a function until
//!   its argument operations are ready and fails fast on the first bad one.
//!
//! # Quick start
//!
//! Leaf operations are written by embedding an [`OpCell`] and implementing
//! [`Operation`]; everything downstream is usually a [`defer`] chain.
//!
//! ```
//! use std::sync::{Arc, Weak};
//! use sparkles::{
//!     defer, register_as_dependent, impl_result_op, NodeCore, OpCell, OpError, OpRef,
//!     Operation, Failure, ResultOp, WeakOpRef,
//! };
//!
//! /// A leaf: no dependencies, finished by an explicit setter.
//! struct Leaf<T: Clone + Send + 'static> {
//!     cell: OpCell<T>,
//! }
//!
//! impl<T: Clone + Send + 'static> Leaf<T> {
//!     fn create() -> Arc<Self> {
//!         let op: Arc<Leaf<T>> = Arc::new_cyclic(|weak: &Weak<Leaf<T>>| {
//!             let self_ref: WeakOpRef = weak.clone();
//!             Leaf { cell: OpCell::new(self_ref, std::iter::empty()) }
//!         });
//!         let handle: OpRef = op.clone();
//!         let _ = register_as_dependent(&handle);
//!         op
//!     }
//!
//!     fn set(&self, value: T) -> Result<(), OpError> {
//!         self.cell.set_result(value)
//!     }
//! }
//!
//! impl<T: Clone + Send + 'static> Operation for Leaf<T> {
//!     fn node(&self) -> &NodeCore {
//!         self.cell.node()
//!     }
//!     fn failure(&self) -> Option<Failure> {
//!         self.cell.failure()
//!     }
//!     fn on_dependency_finished(&self, _dep: &OpRef) -> Result<(), OpError> {
//!         Err(OpError::BadDependency("leaves have no dependencies"))
//!     }
//! }
//!
//! impl_result_op!(<T> Leaf<T>);
//!
//! let a = Leaf::create();
//! let b = Leaf::create();
//! let sum = defer(|a: i32, b: i32| a + b).until((&a, &b));
//!
//! a.set(5).unwrap();
//! assert!(!sum.is_valid());
//! b.set(6).unwrap();
//! assert_eq!(sum.result().unwrap(), 11);
//! ```
//!
//! # Threading model
//!
//! Every operation belongs to the thread that creates and mutates it. The
//! only legal cross-thread touch point is the [`WorkQueue`]: producers on
//! any thread enqueue, the single consumer thread dequeues and invokes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sparkles::{RemoteOperation, ResultOp, WorkQueue};
//!
//! let queue = Arc::new(WorkQueue::new());
//! let (remote, mut promise) = RemoteOperation::<i32>::create(queue.clone());
//!
//! std::thread::spawn(move || {
//!     // ...do some work...
//!     let _ = promise.set_result(6);
//! });
//!
//! queue.dequeue()(); // applies the delivery closure
//! assert_eq!(remote.result().unwrap(), 6);
//! ```
//!
//! # Optional tracing support
//!
//! The `tracing` cargo feature instruments the finish protocol, the queue,
//! and the promise lifecycle. When disabled (the default) the
//! instrumentation is compiled out entirely and the `tracing` crate is not
//! linked.

mod deferred;
mod error;
mod node;
mod operation;
mod queue;
mod remote;
mod result;
mod sync;


pub use deferred::{
    defer, Deferred, DeferredOp, FromOperation, FromValue, IntoOperand, Operand, OperandList,
    Single,
};
pub use error::{BrokenPromise, Captured, ErrorCategory, ErrorCode, Failure, OpError, OpaquePanic};
pub use node::{NodeCore, NodeId};
pub use operation::{
    register_as_dependent, OpCell, OpHandle, OpRef, Operation, OperationExt, ResultOp, WeakOpRef,
};
pub use queue::{WorkItem, WorkQueue};
pub use remote::{Promise, PromisedOperation, RemoteOperation};
pub use result::OpResult;
pub use sync::Semaphore;
