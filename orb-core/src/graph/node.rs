//! Graph Nodes
//!
//! A [`Node`] is the bookkeeping record behind every reactive value. It knows
//! which nodes it reads from (sources), which nodes read from it (consumers),
//! whether its value may be stale, and it owns the value's two notifiers.
//!
//! # Ownership
//!
//! - A node holds its sources strongly. A derived value needs its inputs to
//!   recompute, so keeping them alive is correct.
//! - A node holds its consumers weakly. Being depended upon never keeps a
//!   consumer alive; liveness comes from whoever holds the consumer's value
//!   (a UI binding, an effect handle, ...).
//!
//! Dead consumer entries are pruned lazily whenever the consumer list is
//! walked, and eagerly when the consumer node itself is dropped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::scheduler;
use crate::error::{ReactiveError, Result};
use crate::reactive::Notifier;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (atom, trigger). Roots of the graph: no sources, only
    /// consumers. Always holds its current value, so it is never dirty.
    Source,

    /// A derived node. Has sources and may have consumers; caches its value.
    Derived,

    /// An effect node. Has sources but is never read, so it has no consumers.
    Effect,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// A transitive source changed since the node last ran.
    Dirty,
}

pub(crate) struct NodeInner {
    id: NodeId,
    kind: NodeKind,
    state: Cell<DirtyState>,
    /// Bumped whenever the node's value may have changed.
    version: Cell<u64>,
    /// True while the node's computation is running.
    recording: Cell<bool>,
    disposed: Cell<bool>,
    /// Guards against queueing more than one settled notification per window.
    settle_pending: Cell<bool>,
    sources: RefCell<IndexMap<NodeId, Node>>,
    consumers: RefCell<IndexMap<NodeId, WeakNode>>,
    immediate: Notifier,
    settled: Notifier,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        let id = self.id;
        for source in self.sources.get_mut().values() {
            // A source mid-walk is pruned lazily instead.
            if let Ok(mut consumers) = source.inner.consumers.try_borrow_mut() {
                consumers.shift_remove(&id);
            }
        }
    }
}

/// A node in the dependency graph.
///
/// Cloning a `Node` creates a new handle to the **same** node; equality is
/// identity.
#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeInner>,
}

/// A non-owning handle to a [`Node`].
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

impl WeakNode {
    /// Get a strong handle if the node is still alive.
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }

    /// True while any strong handle to the node exists.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                id: NodeId::new(),
                kind,
                state: Cell::new(match kind {
                    NodeKind::Source => DirtyState::Clean,
                    // Start dirty: nothing has been computed yet.
                    NodeKind::Derived | NodeKind::Effect => DirtyState::Dirty,
                }),
                version: Cell::new(0),
                recording: Cell::new(false),
                disposed: Cell::new(false),
                settle_pending: Cell::new(false),
                sources: RefCell::new(IndexMap::new()),
                consumers: RefCell::new(IndexMap::new()),
                immediate: Notifier::new(),
                settled: Notifier::new(),
            }),
        }
    }

    /// Create a new source node.
    pub fn source() -> Self {
        Self::new(NodeKind::Source)
    }

    /// Create a new derived node.
    pub fn derived() -> Self {
        Self::new(NodeKind::Derived)
    }

    /// Create a new effect node.
    pub fn effect() -> Self {
        Self::new(NodeKind::Effect)
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    pub fn state(&self) -> DirtyState {
        self.inner.state.get()
    }

    pub fn is_clean(&self) -> bool {
        self.state() == DirtyState::Clean
    }

    /// Monotonic change counter.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// True while this node's computation is running.
    pub fn is_recording(&self) -> bool {
        self.inner.recording.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Notifier fired synchronously when the node turns dirty.
    pub fn immediate(&self) -> &Notifier {
        &self.inner.immediate
    }

    /// Notifier fired once per batch of changes, when the scheduler flushes.
    pub fn settled(&self) -> &Notifier {
        &self.inner.settled
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// IDs of the current sources, in the order they were first read.
    pub fn source_ids(&self) -> Vec<NodeId> {
        self.inner.sources.borrow().keys().copied().collect()
    }

    /// Number of live consumers.
    pub fn consumer_count(&self) -> usize {
        self.inner
            .consumers
            .borrow()
            .values()
            .filter(|weak| weak.is_alive())
            .count()
    }

    /// Mark the node as clean. Called right before its computation runs.
    pub(crate) fn mark_clean(&self) {
        self.inner.state.set(DirtyState::Clean);
    }

    pub(crate) fn begin_recording(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ReactiveError::Disposed { node: self.id() });
        }
        if self.inner.recording.replace(true) {
            return Err(ReactiveError::Cycle { node: self.id() });
        }
        Ok(())
    }

    pub(crate) fn end_recording(&self) {
        self.inner.recording.set(false);
    }

    /// Signal that this node's value may have changed and invalidate every
    /// transitive consumer.
    ///
    /// For a source node this always counts as a change and fires its
    /// immediate notifier. For a derived or effect node it only does if the
    /// node was clean. Consumers are visited
    /// depth-first in the order they subscribed; a consumer that is already
    /// dirty stops the walk, which keeps diamond-shaped graphs from being
    /// visited twice.
    ///
    /// Settled notifications queued during the walk are released once the
    /// outermost propagation pass has finished.
    pub fn mark_dirty_and_propagate(&self) {
        scheduler::batch(|| {
            let changed = match self.kind() {
                NodeKind::Source => {
                    if self.is_disposed() {
                        false
                    } else {
                        self.bump_version();
                        scheduler::request_settle(self);
                        self.inner.immediate.broadcast(&());
                        true
                    }
                }
                NodeKind::Derived | NodeKind::Effect => self.invalidate(),
            };
            if !changed {
                return;
            }

            let mut stack = self.live_consumers();
            stack.reverse();
            while let Some(node) = stack.pop() {
                if !node.invalidate() {
                    continue;
                }
                let mut next = node.live_consumers();
                next.reverse();
                stack.extend(next);
            }
        });
    }

    /// Record `self` as a source of `consumer`.
    ///
    /// `consumer` must be open for recording. Recording the same source twice
    /// in one run adds a single edge.
    pub fn record_as_source_of(&self, consumer: &Node) -> Result<()> {
        if self == consumer || self.is_recording() {
            return Err(ReactiveError::Cycle { node: self.id() });
        }
        if self.is_disposed() {
            return Err(ReactiveError::Disposed { node: self.id() });
        }
        if !consumer.is_recording() {
            return Err(ReactiveError::NotRecording {
                node: consumer.id(),
            });
        }

        consumer
            .inner
            .sources
            .borrow_mut()
            .entry(self.id())
            .or_insert_with(|| self.clone());
        self.inner
            .consumers
            .borrow_mut()
            .entry(consumer.id())
            .or_insert_with(|| consumer.downgrade());
        Ok(())
    }

    /// Drop every source edge, in both directions.
    ///
    /// Called at the start of a recomputation so that only the sources read
    /// by the new run remain afterwards.
    pub fn reset_sources(&self) {
        let sources = std::mem::take(&mut *self.inner.sources.borrow_mut());
        let id = self.id();
        for source in sources.values() {
            source.inner.consumers.borrow_mut().shift_remove(&id);
        }
    }

    /// Permanently detach the node from the graph.
    ///
    /// Later invalidations are ignored and reads of the owning value report
    /// [`ReactiveError::Disposed`]. Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        tracing::debug!(node = %self.id(), kind = ?self.kind(), "node disposed");
        self.reset_sources();
    }

    /// Dirty the node if it is clean. Returns true on a clean -> dirty
    /// transition.
    fn invalidate(&self) -> bool {
        if self.is_disposed() || self.state() == DirtyState::Dirty {
            return false;
        }
        self.inner.state.set(DirtyState::Dirty);
        self.bump_version();
        tracing::trace!(
            node = %self.id(),
            kind = ?self.kind(),
            version = self.version(),
            "node invalidated"
        );

        // Queued before the handlers run, so writes they make settle later.
        scheduler::request_settle(self);
        self.inner.immediate.broadcast(&());
        true
    }

    fn bump_version(&self) {
        self.inner.version.set(self.inner.version.get() + 1);
    }

    /// Snapshot of the live consumers, pruning dead entries on the way.
    fn live_consumers(&self) -> Vec<Node> {
        let mut consumers = self.inner.consumers.borrow_mut();
        let mut live = Vec::with_capacity(consumers.len());
        consumers.retain(|_, weak| match weak.upgrade() {
            Some(node) => {
                live.push(node);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn take_settle_pending(&self) -> bool {
        self.inner.settle_pending.replace(false)
    }

    pub(crate) fn set_settle_pending(&self) -> bool {
        self.inner.settle_pending.replace(true)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("version", &self.version())
            .field("sources", &self.source_ids())
            .field("consumer_count", &self.consumer_count())
            .finish()
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakNode")
            .field("alive", &self.is_alive())
            .finish()
    }
}
