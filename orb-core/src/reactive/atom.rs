//! Atom Implementation
//!
//! An Atom is the fundamental reactive primitive: a settable value that
//! tracks which computations read it.
//!
//! # How Atoms Work
//!
//! 1. [`atom`] returns two capabilities: an [`Atom`] for reading and a
//!    [`Setter`] for writing. Code that only holds the `Atom` cannot mutate.
//!
//! 2. When an atom is read through an [`Orb`](super::Orb) or a tracked
//!    `get`, it is linked as a source of the running computation.
//!
//! 3. When a new value is written that differs from the current one, the
//!    atom's node invalidates every transitive consumer, and a settled
//!    notification is scheduled.
//!
//! Writing a value equal to the current one does nothing at all. Derived
//! values rely on this: an unchanged input never dirties them.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::{Reactive, Readable};
use crate::error::Result;
use crate::graph::Node;

struct AtomInner<T> {
    value: RefCell<T>,
    node: Node,
}

/// Read capability of a reactive cell.
///
/// Cloning an `Atom` creates a new handle to the **same** cell.
pub struct Atom<T> {
    inner: Rc<AtomInner<T>>,
}

/// Write capability of a reactive cell.
///
/// Cloning a `Setter` creates a new handle to the **same** cell.
pub struct Setter<T> {
    inner: Rc<AtomInner<T>>,
}

/// Create a reactive cell holding `initial`.
///
/// # Example
///
/// ```rust,ignore
/// let (count, set_count) = atom(0);
///
/// // Read the value
/// let value = count.get_untracked();
///
/// // Update the value (invalidates dependents)
/// set_count.set(5);
/// ```
pub fn atom<T>(initial: T) -> (Atom<T>, Setter<T>)
where
    T: Clone + PartialEq + 'static,
{
    let inner = Rc::new(AtomInner {
        value: RefCell::new(initial),
        node: Node::source(),
    });
    (
        Atom {
            inner: Rc::clone(&inner),
        },
        Setter { inner },
    )
}

impl<T> Atom<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Get the current value without creating an edge. Never fails.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without creating an edge.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same atom while the borrow is held.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Number of computations currently reading this atom.
    pub fn consumer_count(&self) -> usize {
        self.inner.node.consumer_count()
    }
}

impl<T> Setter<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Store `value` and invalidate dependents. Returns `value`.
    ///
    /// If `value` equals the current value nothing happens: no dirty
    /// propagation and no notification.
    pub fn set(&self, value: T) -> T {
        let changed = {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                false
            } else {
                *current = value.clone();
                true
            }
        };

        if changed {
            self.inner.node.mark_dirty_and_propagate();
        }
        value
    }

    /// Compute the next value from the current one, then [`set`](Setter::set)
    /// it.
    ///
    /// `f` works on a snapshot, so it may itself write to this atom; its
    /// result wins.
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.inner.value.borrow().clone();
        self.set(f(&current))
    }

    /// A read handle to the same cell.
    pub fn atom(&self) -> Atom<T> {
        Atom {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Reactive for Atom<T> {
    fn node(&self) -> &Node {
        &self.inner.node
    }
}

impl<T> Readable for Atom<T>
where
    T: Clone + PartialEq + 'static,
{
    type Value = T;

    fn try_get_untracked(&self) -> Result<T> {
        Ok(self.get_untracked())
    }
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Atom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.inner.node.id())
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.node.version())
            .field("consumer_count", &self.inner.node.consumer_count())
            .finish()
    }
}

impl<T> Debug for Setter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setter")
            .field("id", &self.inner.node.id())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
