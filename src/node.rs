//! Node identity and the dependency/dependent bookkeeping every operation
//! shares.
//!
//! A [`NodeCore`] owns its dependencies (strong forward edges) and is known
//! to them only weakly (back edges keyed by [`NodeId`]), so the graph cannot
//! form reference cycles: dependencies are fixed at construction and can
//! only be subtracted from afterwards.
//!
//! The finish protocol lives here. Finishing a node is monotone and
//! idempotent: the node pins itself, flips `finished`, detaches from its
//! dependencies, then drains its dependents one entry at a time — releasing
//! the map lock around every callback so a notified dependent may remove
//! siblings mid-drain.

use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::{debug, trace, warn};

use crate::error::OpError;
use crate::operation::{OpRef, OperationExt, WeakOpRef};

/// Process-unique identifier of an operation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate the next identity. Identities are never reused within a
    /// process, which is what lets the dependents map collapse duplicates.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Fast hasher using node identities as their own hashes.
#[derive(Default, Clone)]
pub(crate) struct PassThroughHasher {
    hash: u64,
}

impl Hasher for PassThroughHasher {
    fn finish(&self) -> u64 {
        self.hash
    }

    fn write_u64(&mut self, i: u64) {
        self.hash = i;
    }

    fn write(&mut self, _bytes: &[u8]) {
        panic!("PassThroughHasher used on invalid type");
    }
}

impl BuildHasher for PassThroughHasher {
    type Hasher = PassThroughHasher;

    fn build_hasher(&self) -> Self::Hasher {
        PassThroughHasher::default()
    }
}

type DependentMap = HashMap<NodeId, WeakOpRef, PassThroughHasher>;

/// The graph state embedded in every operation: identity, the monotone
/// finished flag, owned dependencies, and weak back references to
/// dependents.
pub struct NodeCore {
    id: NodeId,
    finished: AtomicBool,
    /// When set, neither the finish protocol nor the destructor touches the
    /// dependencies: they may live in another thread.
    multithreaded_dependencies: AtomicBool,
    /// This node's own weak identity, captured at construction. A node
    /// cannot hand out a back reference to itself before its shared
    /// identity exists, which is why registration is a separate step.
    self_ref: WeakOpRef,
    dependencies: Mutex<Vec<OpRef>>,
    dependents: Mutex<DependentMap>,
}

impl NodeCore {
    /// Build the core from this node's own weak reference and its full set
    /// of dependencies. Duplicate dependencies collapse by identity.
    pub fn new(self_ref: WeakOpRef, dependencies: impl IntoIterator<Item = OpRef>) -> Self {
        let mut deduped: Vec<OpRef> = Vec::new();
        for dep in dependencies {
            let id = dep.node().id;
            if !deduped.iter().any(|d| d.node().id == id) {
                deduped.push(dep);
            }
        }

        #[cfg(feature = "tracing")]
        trace!(dependency_count = deduped.len(), "creating operation node");

        Self {
            id: NodeId::next(),
            finished: AtomicBool::new(false),
            multithreaded_dependencies: AtomicBool::new(false),
            self_ref,
            dependencies: Mutex::new(deduped),
            dependents: Mutex::new(HashMap::default()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Has this node completed? Monotone: once true, always true.
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Declare that this node's dependencies may live in another thread.
    /// Returns the previous value.
    pub fn set_multithreaded_dependencies(&self, value: bool) -> bool {
        self.multithreaded_dependencies.swap(value, Ordering::Relaxed)
    }

    pub fn multithreaded_dependencies(&self) -> bool {
        self.multithreaded_dependencies.load(Ordering::Relaxed)
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.lock().len()
    }

    /// Is the operation with this identity currently a dependency?
    pub fn has_dependency(&self, id: NodeId) -> bool {
        self.dependencies.lock().iter().any(|d| d.node().id == id)
    }

    /// Is any dependency still unfinished?
    pub fn has_unfinished_dependency(&self) -> bool {
        self.dependencies.lock().iter().any(|d| !d.node().finished())
    }

    pub(crate) fn dependencies_snapshot(&self) -> Vec<OpRef> {
        self.dependencies.lock().clone()
    }

    /// Record `dependent` as waiting on this node. If this node has already
    /// finished, the notification is delivered immediately instead of being
    /// stored.
    pub fn add_dependent(&self, dependent: &OpRef) -> Result<(), OpError> {
        if self.finished() {
            if let Some(me) = self.self_ref.upgrade() {
                return dependent.dependency_finished(&me);
            }
            return Ok(());
        }
        self.dependents
            .lock()
            .insert(dependent.node().id, Arc::downgrade(dependent));
        Ok(())
    }

    /// Erase the dependent with this identity, if present.
    pub fn remove_dependent(&self, id: NodeId) {
        self.dependents.lock().remove(&id);
    }

    /// Stop depending on the operation with this identity.
    ///
    /// Allowed at any time: deleting edges cannot create a cycle. The node
    /// unregisters itself from the dependency's dependent map and releases
    /// the owning reference. Removing the last dependency leaves nothing to
    /// trigger this node; the caller may want to finish it by hand.
    pub fn remove_dependency(&self, id: NodeId) -> Result<(), OpError> {
        let removed = {
            let mut dependencies = self.dependencies.lock();
            let position = dependencies.iter().position(|d| d.node().id == id);
            position.map(|i| dependencies.swap_remove(i))
        };
        match removed {
            Some(dependency) => {
                dependency.node().remove_dependent(self.id);
                Ok(())
            }
            None => Err(OpError::BadDependency(
                "tried to remove a dependency this operation does not have",
            )),
        }
    }

    /// Run the finish protocol. A second call is a no-op.
    ///
    /// The local strong reference taken up front guarantees the node
    /// outlives its own drain even if a notified dependent drops the last
    /// external handle to it.
    pub fn finish(&self) {
        let me = self.self_ref.upgrade();
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        #[cfg(feature = "tracing")]
        debug!(id = ?self.id, "operation finished");

        if !self.multithreaded_dependencies() {
            let dependencies = std::mem::take(&mut *self.dependencies.lock());
            for dependency in &dependencies {
                dependency.node().remove_dependent(self.id);
            }
        }

        let Some(me) = me else {
            // Unregistered node: nothing can have subscribed to it.
            return;
        };

        // One entry per lock acquisition, never a snapshot: a notified
        // dependent may erase siblings from this map while we iterate.
        loop {
            let entry = {
                let mut dependents = self.dependents.lock();
                let key = dependents.keys().next().copied();
                key.and_then(|k| dependents.remove(&k))
            };
            let Some(weak) = entry else { break };
            if let Some(dependent) = weak.upgrade() {
                #[cfg(feature = "tracing")]
                trace!(id = ?self.id, dependent = ?dependent.node().id, "notifying dependent");

                if let Err(_err) = dependent.dependency_finished(&me) {
                    #[cfg(feature = "tracing")]
                    warn!(
                        id = ?self.id,
                        dependent = ?dependent.node().id,
                        error = %_err,
                        "dependent rejected finish notification"
                    );
                }
            }
        }
    }
}

impl Drop for NodeCore {
    fn drop(&mut self) {
        // Tell the dependencies to forget this node. Never touch dependents
        // here, and never touch dependencies that may live in another
        // thread.
        if self.multithreaded_dependencies() {
            return;
        }
        for dependency in self.dependencies.get_mut().drain(..) {
            dependency.node().remove_dependent(self.id);
        }
    }
}

impl std::fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCore")
            .field("id", &self.id)
            .field("finished", &self.finished())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
