//! Reactive Context
//!
//! The reactive context tracks which computation is currently running, so
//! that reading a reactive value can link it as a source of that computation.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running a derived value or an
//! effect pushes a frame for its node; the returned guard pops it when
//! dropped, even if the computation panics. Reading a derived value from
//! inside another computation pushes a second frame on top, so reads are
//! always attributed to the innermost computation.
//!
//! Computations also receive an explicit [`Orb`], which is bound to their
//! own node and needs no stack lookup. The stack serves the ambient reads
//! (`Readable::get`) and marks untracked scopes.

use std::cell::RefCell;

use super::runtime::{Reactive, Readable};
use crate::error::{ReactiveError, Result};
use crate::graph::{Node, NodeId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct Frame {
    /// The node being computed; `None` for an untracked scope.
    node: Option<Node>,
    /// Whether reads in this frame create edges.
    tracking: bool,
}

/// Guard that pops the frame when dropped.
pub struct ReactiveContext {
    node: Option<NodeId>,
}

impl ReactiveContext {
    /// Open `node` for recording and make it the target of ambient reads.
    ///
    /// Fails with [`ReactiveError::Cycle`] if the node is already running.
    pub fn enter(node: &Node) -> Result<Self> {
        Self::push(node, true)
    }

    /// Open `node` without tracking: reads inside create no edges, but
    /// re-entering the node is still reported as a cycle.
    pub fn enter_untracked(node: &Node) -> Result<Self> {
        Self::push(node, false)
    }

    fn push(node: &Node, tracking: bool) -> Result<Self> {
        node.begin_recording()?;
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                node: Some(node.clone()),
                tracking,
            });
        });
        Ok(Self {
            node: Some(node.id()),
        })
    }

    /// Run `f` in a scope where ambient reads do not create edges.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                node: None,
                tracking: false,
            });
        });
        let _guard = Self { node: None };
        f()
    }

    /// Check if reads on this thread are currently being tracked.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().last().is_some_and(|frame| frame.tracking))
    }

    /// The node currently being tracked, if any.
    pub fn current_node() -> Option<Node> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .filter(|frame| frame.tracking)
                .and_then(|frame| frame.node.clone())
        })
    }

    /// Link `source` to the innermost open computation.
    ///
    /// Inside an untracked scope this is a no-op. With no frame at all it
    /// fails with [`ReactiveError::NoActiveContext`].
    pub fn track(source: &Node) -> Result<()> {
        let target = CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|frame| frame.node.clone().filter(|_| frame.tracking))
        });
        match target {
            None => Err(ReactiveError::NoActiveContext { node: source.id() }),
            Some(None) => Ok(()),
            Some(Some(consumer)) => source.record_as_source_of(&consumer),
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right frame.
        if let Some(frame) = popped {
            let popped_id = frame.node.as_ref().map(Node::id);
            debug_assert_eq!(
                popped_id, self.node,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.node, popped_id
            );
            if let Some(node) = frame.node {
                node.end_recording();
            }
        }
    }
}

/// Reader handed to a running computation.
///
/// Every read through the orb links the value as a source of the
/// computation's node, then returns the value.
///
/// # Example
///
/// ```rust,ignore
/// let (count, set_count) = atom(2);
/// let squared = Derived::new(move |orb| {
///     let n = orb.read(&count);
///     n * n
/// });
/// ```
pub struct Orb<'a> {
    node: &'a Node,
    tracking: bool,
}

impl<'a> Orb<'a> {
    pub(crate) fn new(node: &'a Node, tracking: bool) -> Self {
        Self { node, tracking }
    }

    /// The node this orb records into.
    pub fn node(&self) -> &Node {
        self.node
    }

    /// Link `value` as a source, then return its current value.
    ///
    /// # Panics
    ///
    /// Panics on a dependency cycle or a disposed value; see
    /// [`try_read`](Orb::try_read).
    pub fn read<R>(&self, value: &R) -> R::Value
    where
        R: Readable + ?Sized,
    {
        self.try_read(value).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Link `value` as a source, then return its current value.
    pub fn try_read<R>(&self, value: &R) -> Result<R::Value>
    where
        R: Readable + ?Sized,
    {
        self.try_connect(value)?;
        value.try_get_untracked()
    }

    /// Link `value` as a source without reading it.
    ///
    /// # Panics
    ///
    /// Panics on a dependency cycle or a disposed value.
    pub fn connect<R>(&self, value: &R)
    where
        R: Reactive + ?Sized,
    {
        if let Err(err) = self.try_connect(value) {
            panic!("{err}");
        }
    }

    /// Link `value` as a source without reading it.
    pub fn try_connect<R>(&self, value: &R) -> Result<()>
    where
        R: Reactive + ?Sized,
    {
        if !self.tracking {
            return Ok(());
        }
        value.node().record_as_source_of(self.node)
    }

    /// Run `f` without linking anything it reads through ambient reads.
    pub fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        ReactiveContext::untracked(f)
    }
}
