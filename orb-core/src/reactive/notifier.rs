//! Notifier Implementation
//!
//! A Notifier is a minimal multi-subscriber broadcast channel. Every reactive
//! value owns two of them: an *immediate* notifier fired synchronously when
//! the value is invalidated, and a *settled* notifier fired once per batch of
//! changes by the scheduler.
//!
//! # How Notifiers Work
//!
//! 1. `subscribe` appends a handler and returns a [`Subscription`]. Handlers
//!    are delivered in subscription order.
//!
//! 2. `broadcast` snapshots the live handlers, releases every internal borrow,
//!    then calls them one by one. Handlers are free to subscribe, dispose, or
//!    broadcast again while a broadcast is in flight.
//!
//! 3. A handler that panics is caught and reported; the remaining handlers
//!    still run.
//!
//! # Removal
//!
//! Disposing a handler leaves a tombstone in place, which keeps removal O(1)
//! and keeps insertion order intact. Tombstones are compacted once they
//! outnumber live entries and no broadcast is running.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::subscriber::{Detach, SubscriberId, Subscription};
use crate::error::ReactiveError;

type Handler<A> = Rc<dyn Fn(&A)>;

/// Outcome of a single broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Handlers that returned normally.
    pub delivered: usize,
    /// One entry per handler that panicked.
    pub faults: Vec<ReactiveError>,
}

impl BroadcastReport {
    /// True when every handler ran without panicking.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

struct NotifierInner<A: ?Sized> {
    /// `None` marks a disposed handler awaiting compaction.
    handlers: RefCell<IndexMap<SubscriberId, Option<Handler<A>>>>,
    tombstones: Cell<usize>,
    /// Number of broadcasts currently on the stack.
    broadcasting: Cell<usize>,
}

impl<A: ?Sized> NotifierInner<A> {
    fn is_live(&self, id: SubscriberId) -> bool {
        matches!(self.handlers.borrow().get(&id), Some(Some(_)))
    }

    fn compact(&self) {
        if self.broadcasting.get() > 0 {
            return;
        }
        let mut handlers = self.handlers.borrow_mut();
        let dead = self.tombstones.get();
        if dead == 0 || dead * 2 <= handlers.len() {
            return;
        }
        handlers.retain(|_, handler| handler.is_some());
        self.tombstones.set(0);
    }
}

impl<A: ?Sized> Detach for NotifierInner<A> {
    fn detach(&self, id: SubscriberId) {
        // A handler dropped here could own other subscriptions; drop it only
        // after the borrow is released.
        let removed = {
            let mut handlers = self.handlers.borrow_mut();
            handlers.get_mut(&id).and_then(Option::take)
        };
        if removed.is_some() {
            self.tombstones.set(self.tombstones.get() + 1);
            self.compact();
        }
        drop(removed);
    }
}

/// A broadcast channel with ordered, individually disposable subscribers.
///
/// Cloning a `Notifier` creates a new handle to the **same** subscriber list.
///
/// # Example
///
/// ```rust,ignore
/// let notifier: Notifier<u32> = Notifier::new();
/// let sub = notifier.subscribe(|n| println!("got {n}"));
///
/// notifier.broadcast(&1); // prints "got 1"
/// sub.dispose();
/// notifier.broadcast(&2); // prints nothing
/// ```
pub struct Notifier<A: ?Sized + 'static = ()> {
    inner: Rc<NotifierInner<A>>,
}

impl<A: ?Sized + 'static> Notifier<A> {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(NotifierInner {
                handlers: RefCell::new(IndexMap::new()),
                tombstones: Cell::new(0),
                broadcasting: Cell::new(0),
            }),
        }
    }

    /// Register `handler` for every future broadcast.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&A) + 'static,
    {
        let id = SubscriberId::new();
        self.inner
            .handlers
            .borrow_mut()
            .insert(id, Some(Rc::new(handler) as Handler<A>));

        let weak: Weak<NotifierInner<A>> = Rc::downgrade(&self.inner);
        Subscription::new(id, weak)
    }

    /// Deliver `payload` to every subscribed handler, in subscription order.
    ///
    /// Panicking handlers are logged and reported in the returned
    /// [`BroadcastReport`]; they never abort the broadcast.
    pub fn broadcast(&self, payload: &A) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let snapshot: SmallVec<[(SubscriberId, Handler<A>); 4]> = {
            let handlers = self.inner.handlers.borrow();
            handlers
                .iter()
                .filter_map(|(id, handler)| handler.as_ref().map(|h| (*id, Rc::clone(h))))
                .collect()
        };
        if snapshot.is_empty() {
            return report;
        }

        self.inner.broadcasting.set(self.inner.broadcasting.get() + 1);
        for (id, handler) in snapshot {
            // Disposed by an earlier handler in this same broadcast.
            if !self.inner.is_live(id) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => report.delivered += 1,
                Err(cause) => {
                    let message = panic_message(cause.as_ref());
                    tracing::error!(subscriber = %id, %message, "notifier subscriber panicked");
                    report.faults.push(ReactiveError::SubscriberPanicked {
                        subscriber: id,
                        message,
                    });
                }
            }
        }
        self.inner.broadcasting.set(self.inner.broadcasting.get() - 1);
        self.inner.compact();

        report
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.borrow().len() - self.inner.tombstones.get()
    }

    /// True when no handler is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscriber_count() == 0
    }
}

impl<A: ?Sized + 'static> Default for Notifier<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized + 'static> Clone for Notifier<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: ?Sized + 'static> fmt::Debug for Notifier<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
