//! Derived Implementation
//!
//! A Derived is a cached value computed from other reactive values. It
//! recomputes only when read after one of its sources changed.
//!
//! # How Derived Values Work
//!
//! 1. On first access, the derived value opens a recording frame, runs its
//!    function, and caches the result. Every value read through the
//!    [`Orb`] becomes a source.
//!
//! 2. When accessed again, if no source has changed, returns the cached value.
//!
//! 3. When a source changes, the node is marked dirty and the cache is
//!    cleared. Nothing recomputes yet.
//!
//! 4. On next access, the old sources are dropped and the function runs
//!    again, recording a fresh source set.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - An atom is written ten times in a row
//! - Five derived values depend on it
//! - Each one recomputes at most once, and only if somebody reads it

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use super::context::{Orb, ReactiveContext};
use super::runtime::{Reactive, Readable};
use super::subscriber::Subscription;
use crate::error::{ReactiveError, Result};
use crate::graph::Node;

/// State of a derived value's cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing cached: the next read recomputes.
    Empty,

    /// The cached value is current.
    Cached,
}

struct DerivedInner<T> {
    node: Node,

    /// The computation function.
    derive: Box<dyn Fn(&Orb<'_>) -> T>,

    /// The cached value. `None` is the empty slot, distinct from any `T`.
    cache: RefCell<Option<T>>,

    /// Sources were fixed at construction; runs do not record edges.
    fixed_sources: bool,

    /// Number of times the function has run.
    runs: Cell<u64>,

    /// Clears the cache when the node is invalidated.
    _invalidation: Subscription,
}

/// A lazily computed, memoized reactive value.
///
/// Cloning a `Derived` creates a new handle to the **same** value. The value
/// stays in the graph as long as any handle is alive; dropping the last one
/// removes it from all of its sources.
///
/// # Example
///
/// ```rust,ignore
/// let (count, set_count) = atom(2);
/// let doubled = Derived::new(move |orb| orb.read(&count) * 2);
///
/// assert_eq!(doubled.get_untracked(), 4);
/// set_count.set(5);
/// assert_eq!(doubled.get_untracked(), 10);
/// ```
pub struct Derived<T> {
    inner: Rc<DerivedInner<T>>,
}

impl<T> Derived<T>
where
    T: Clone + 'static,
{
    /// Create a derived value whose sources are discovered on every run.
    ///
    /// The function is not run immediately. It runs on first access.
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn(&Orb<'_>) -> T + 'static,
    {
        Self::build(Box::new(derive), false)
    }

    /// Create a derived value with a fixed list of sources.
    ///
    /// The edges are recorded once, here. Reads through the orb inside
    /// `derive` create no further edges.
    ///
    /// # Panics
    ///
    /// Panics if a source is disposed; see
    /// [`try_with_sources`](Derived::try_with_sources).
    pub fn with_sources<F>(sources: &[&dyn Reactive], derive: F) -> Self
    where
        F: Fn(&Orb<'_>) -> T + 'static,
    {
        Self::try_with_sources(sources, derive).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Like [`with_sources`](Derived::with_sources), reporting a disposed
    /// source as an error.
    pub fn try_with_sources<F>(sources: &[&dyn Reactive], derive: F) -> Result<Self>
    where
        F: Fn(&Orb<'_>) -> T + 'static,
    {
        let derived = Self::build(Box::new(derive), true);
        let node = &derived.inner.node;
        node.begin_recording()?;
        let linked = sources
            .iter()
            .try_for_each(|source| source.node().record_as_source_of(node));
        node.end_recording();
        linked.map(|()| derived)
    }

    fn build(derive: Box<dyn Fn(&Orb<'_>) -> T>, fixed_sources: bool) -> Self {
        let inner = Rc::new_cyclic(|weak: &std::rc::Weak<DerivedInner<T>>| {
            let node = Node::derived();
            let weak = weak.clone();
            let invalidation = node.immediate().subscribe(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.cache.borrow_mut().take();
                }
            });
            DerivedInner {
                node,
                derive,
                cache: RefCell::new(None),
                fixed_sources,
                runs: Cell::new(0),
                _invalidation: invalidation,
            }
        });
        Self { inner }
    }

    /// Recompute the value.
    ///
    /// This runs the function within a reactive context to track sources.
    fn recompute(&self) -> Result<T> {
        let inner = &self.inner;
        let node = &inner.node;

        let ctx = if inner.fixed_sources {
            ReactiveContext::enter_untracked(node)?
        } else {
            // Check before dropping edges, so a cycle leaves the graph alone.
            if node.is_recording() {
                return Err(ReactiveError::Cycle { node: node.id() });
            }
            node.reset_sources();
            ReactiveContext::enter(node)?
        };

        // Clean before the run: a source written during the run dirties the
        // node again and the result is not cached.
        node.mark_clean();
        let orb = Orb::new(node, !inner.fixed_sources);
        let value = (inner.derive)(&orb);
        drop(ctx);

        inner.runs.set(inner.runs.get() + 1);
        tracing::trace!(
            node = %node.id(),
            runs = inner.runs.get(),
            sources = node.source_ids().len(),
            "derived recomputed"
        );

        if node.is_clean() {
            *inner.cache.borrow_mut() = Some(value.clone());
        }
        Ok(value)
    }

    /// State of the cache slot.
    pub fn cache_state(&self) -> CacheState {
        if self.inner.cache.borrow().is_some() {
            CacheState::Cached
        } else {
            CacheState::Empty
        }
    }

    /// Number of times the function has run.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }

    /// The node's change counter.
    pub fn version(&self) -> u64 {
        self.inner.node.version()
    }

    /// Remove this value from the graph.
    ///
    /// Its sources forget it, the cache is cleared, and later reads fail with
    /// [`ReactiveError::Disposed`]. Disposing twice is a no-op.
    pub fn dispose(&self) {
        self.inner.node.dispose();
        self.inner.cache.borrow_mut().take();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.node.is_disposed()
    }
}

impl<T> Reactive for Derived<T> {
    fn node(&self) -> &Node {
        &self.inner.node
    }
}

impl<T> Readable for Derived<T>
where
    T: Clone + 'static,
{
    type Value = T;

    /// Get the current value, recomputing if necessary.
    fn try_get_untracked(&self) -> Result<T> {
        let node = &self.inner.node;
        if node.is_disposed() {
            return Err(ReactiveError::Disposed { node: node.id() });
        }

        let cached = self.inner.cache.borrow().clone();
        match cached {
            Some(value) => Ok(value),
            None => self.recompute(),
        }
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Derived<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.inner.node.id())
            .field("state", &self.inner.node.state())
            .field("cached", &*self.inner.cache.borrow())
            .field("runs", &self.inner.runs.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
