//! Valueless reactive sources.
//!
//! A [`Trigger`] carries no value. It exists to tell dependents that
//! something outside the graph changed, e.g. a mutable collection edited in
//! place or an external resource that was reloaded.

use std::fmt;

use super::context::ReactiveContext;
use super::runtime::Reactive;
use crate::error::Result;
use crate::graph::Node;

/// A reactive source without a value.
///
/// Cloning a `Trigger` creates a new handle to the **same** source.
///
/// # Example
///
/// ```rust,ignore
/// let items = Rc::new(RefCell::new(Vec::new()));
/// let changed = Trigger::new();
///
/// let len = {
///     let (items, changed) = (items.clone(), changed.clone());
///     Derived::new(move |orb| {
///         orb.connect(&changed);
///         items.borrow().len()
///     })
/// };
///
/// items.borrow_mut().push(1);
/// changed.notify();
/// ```
#[derive(Clone)]
pub struct Trigger {
    node: Node,
}

impl Trigger {
    pub fn new() -> Self {
        Self {
            node: Node::source(),
        }
    }

    /// Invalidate every dependent, exactly like a changed atom.
    pub fn notify(&self) {
        self.node.mark_dirty_and_propagate();
    }

    /// Link this trigger to the innermost running computation.
    pub fn track(&self) -> Result<()> {
        ReactiveContext::track(&self.node)
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactive for Trigger {
    fn node(&self) -> &Node {
        &self.node
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.node.id())
            .field("version", &self.node.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::{CacheState, Derived, Readable};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn notify_invalidates_connected_values() {
        let items = Rc::new(RefCell::new(vec![1, 2]));
        let changed = Trigger::new();

        let len = {
            let (items, changed) = (items.clone(), changed.clone());
            Derived::new(move |orb| {
                orb.connect(&changed);
                items.borrow().len()
            })
        };
        assert_eq!(len.get_untracked(), 2);

        // Mutated behind the graph's back: still cached.
        items.borrow_mut().push(3);
        assert_eq!(len.get_untracked(), 2);

        changed.notify();
        assert_eq!(len.cache_state(), CacheState::Empty);
        assert_eq!(len.get_untracked(), 3);
    }

    #[test]
    fn ambient_track_links_to_running_computation() {
        let changed = Trigger::new();
        let derived = {
            let changed = changed.clone();
            Derived::new(move |_| changed.track().is_ok())
        };

        assert!(derived.get_untracked());
        assert_eq!(derived.node().source_ids(), vec![changed.node().id()]);
        assert_eq!(changed.node().consumer_count(), 1);
    }

    #[test]
    fn track_outside_computation_fails() {
        let changed = Trigger::default();
        assert_eq!(
            changed.track(),
            Err(ReactiveError::NoActiveContext {
                node: changed.node().id()
            })
        );
    }

    #[test]
    fn every_notify_counts_as_a_change() {
        let changed = Trigger::new();
        changed.notify();
        changed.notify();
        assert_eq!(changed.node().version(), 2);
    }
}
