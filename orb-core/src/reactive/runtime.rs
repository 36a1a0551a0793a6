//! Reactive Runtime
//!
//! The runtime is the per-thread coordinator behind atoms, derived values,
//! and effects. It owns no values itself; it is the entry point for the
//! thread-local machinery they share: the context stack and the settle
//! scheduler.
//!
//! # How It Works
//!
//! 1. When a derived value or effect runs, it opens a frame on the context
//!    stack. Reads inside link their nodes as sources.
//!
//! 2. When an atom's value changes, its node walks all transitive consumers:
//!    a. Each consumer is marked dirty
//!    b. Its immediate notifier fires
//!    c. It is queued for a settled notification
//!    d. Derived values are lazy - they recompute on next access
//!
//! 3. Once the write is complete, the scheduler delivers the queued settled
//!    notifications according to the configured [`SettleMode`].
//!
//! # Threading
//!
//! Everything is `!Send` and every thread has its own runtime. Configure each
//! thread that uses reactive values.

use super::context::ReactiveContext;
use super::notifier::Notifier;
use super::subscriber::Subscription;
use crate::config::{RuntimeConfig, SettleMode};
use crate::error::Result;
use crate::graph::{scheduler, Node, Scheduler};

/// Anything that can take part in the graph as a source.
pub trait Reactive {
    /// The dependency node behind this value.
    fn node(&self) -> &Node;

    /// Fired synchronously whenever the value is invalidated.
    fn immediate(&self) -> &Notifier {
        self.node().immediate()
    }

    /// Fired once per batch of changes, when the scheduler flushes.
    fn settled(&self) -> &Notifier {
        self.node().settled()
    }

    /// Subscribe to settled notifications.
    fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + 'static,
        Self: Sized,
    {
        self.settled().subscribe(move |_| handler())
    }
}

/// A reactive value with a readable current value.
pub trait Readable: Reactive {
    type Value;

    /// Current value, without creating an edge.
    fn try_get_untracked(&self) -> Result<Self::Value>;

    /// Current value, without creating an edge.
    ///
    /// # Panics
    ///
    /// Panics where [`try_get_untracked`](Readable::try_get_untracked) fails.
    fn get_untracked(&self) -> Self::Value {
        self.try_get_untracked().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Link this value to the innermost running computation, then read it.
    fn try_get(&self) -> Result<Self::Value> {
        ReactiveContext::track(self.node())?;
        self.try_get_untracked()
    }

    /// Link this value to the innermost running computation, then read it.
    ///
    /// # Panics
    ///
    /// Panics outside any reactive context; use
    /// [`get_untracked`](Readable::get_untracked) there.
    fn get(&self) -> Self::Value {
        self.try_get().unwrap_or_else(|err| panic!("{err}"))
    }
}

impl<R: Reactive + ?Sized> Reactive for &R {
    fn node(&self) -> &Node {
        (**self).node()
    }
}

impl<R: Readable + ?Sized> Readable for &R {
    type Value = R::Value;

    fn try_get_untracked(&self) -> Result<Self::Value> {
        (**self).try_get_untracked()
    }
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Apply `config` to the current thread.
    pub fn configure(config: &RuntimeConfig) {
        Self::set_mode(config.settle);
    }

    /// Deliver settled notifications according to `mode`.
    ///
    /// Pending notifications are handed to the new scheduler right away, so
    /// [`SettleMode::TokioLocal`] must be selected inside a `LocalSet` when
    /// work is pending.
    pub fn set_mode(mode: SettleMode) {
        scheduler::set_scheduler(Scheduler::from(mode));
    }

    /// Install any scheduler, including custom scheduling functions.
    ///
    /// A flush already scheduled on the previous scheduler becomes a no-op.
    pub fn set_scheduler(scheduler: Scheduler) {
        scheduler::set_scheduler(scheduler);
    }

    /// The scheduler installed on this thread.
    pub fn scheduler() -> Scheduler {
        scheduler::current_scheduler()
    }

    /// Deliver every pending settled notification now.
    pub fn flush() -> usize {
        scheduler::flush()
    }

    /// Drain this thread's microtask queue. An embedding event loop calls
    /// this once per tick when using [`SettleMode::Microtask`].
    pub fn run_microtasks() -> usize {
        scheduler::run_microtasks()
    }

    /// Run `f`, holding settled notifications until it returns.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        scheduler::batch(f)
    }

    /// Run `f` without tracking ambient reads.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        ReactiveContext::untracked(f)
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Number of settled notifications waiting for a flush.
    pub fn pending_settles() -> usize {
        scheduler::pending_settles()
    }
}
