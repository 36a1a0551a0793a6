//! Settle Scheduler
//!
//! The scheduler decides when *settled* notifications are delivered.
//! Invalidation itself is always synchronous; only the settled broadcast is
//! deferred.
//!
//! # Algorithm
//!
//! 1. During a propagation pass, every node whose value may have changed asks
//!    for a settled notification. The node's `settle_pending` flag absorbs
//!    repeat requests, so each node is queued at most once per window.
//!
//! 2. When the outermost pass (or [`batch`]) ends, the queue is committed:
//!    if it is non-empty and no flush is already scheduled, the current
//!    [`Scheduler`] receives a single flush task. A task that is dropped
//!    without running releases its slot, so the next commit schedules again.
//!
//! 3. The flush drains the queue front to back, clearing each node's flag
//!    just before broadcasting, so a change made by a handler re-queues the
//!    node and is delivered by the same flush.
//!
//! All state is thread-local. The graph is single-threaded by construction
//! (`Rc` everywhere), so each thread gets an independent runtime.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use super::node::{Node, WeakNode};
use crate::config::SettleMode;

/// A zero-argument callback handed to a scheduling function.
pub type Task = Box<dyn FnOnce()>;

/// Decides when a flush of settled notifications runs.
#[derive(Clone)]
pub struct Scheduler {
    strategy: Strategy,
}

#[derive(Clone)]
enum Strategy {
    Sync,
    Microtask,
    TokioLocal,
    Custom(Rc<dyn Fn(Task)>),
}

impl Scheduler {
    /// Flush as soon as the outermost propagation pass or batch ends.
    pub fn sync() -> Self {
        Self {
            strategy: Strategy::Sync,
        }
    }

    /// Flush on the thread's microtask queue, drained by
    /// [`run_microtasks`]. This is the default.
    pub fn microtask() -> Self {
        Self {
            strategy: Strategy::Microtask,
        }
    }

    /// Flush from a task spawned with `tokio::task::spawn_local`.
    ///
    /// Writes must then happen inside a `tokio::task::LocalSet`; spawning
    /// outside one panics.
    pub fn tokio_local() -> Self {
        Self {
            strategy: Strategy::TokioLocal,
        }
    }

    /// Hand the flush task to `schedule`, e.g. to run it on the next
    /// animation frame. `schedule` must eventually call the task exactly once.
    pub fn custom<F>(schedule: F) -> Self
    where
        F: Fn(Task) + 'static,
    {
        Self {
            strategy: Strategy::Custom(Rc::new(schedule)),
        }
    }

    fn schedule(&self, task: Task) {
        match &self.strategy {
            Strategy::Sync => task(),
            Strategy::Microtask => queue_microtask(task),
            Strategy::TokioLocal => {
                // Detached: the flush reports through the settled notifiers.
                drop(tokio::task::spawn_local(async move { task() }));
            }
            Strategy::Custom(schedule) => schedule(task),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::microtask()
    }
}

impl From<SettleMode> for Scheduler {
    fn from(mode: SettleMode) -> Self {
        match mode {
            SettleMode::Sync => Self::sync(),
            SettleMode::Microtask => Self::microtask(),
            SettleMode::TokioLocal => Self::tokio_local(),
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.strategy {
            Strategy::Sync => "sync",
            Strategy::Microtask => "microtask",
            Strategy::TokioLocal => "tokio_local",
            Strategy::Custom(_) => "custom",
        };
        f.debug_tuple("Scheduler").field(&name).finish()
    }
}

struct SettleQueue {
    scheduler: RefCell<Scheduler>,
    pending: RefCell<VecDeque<WeakNode>>,
    /// Ticket of the flush task handed to the scheduler that has not run
    /// yet.
    scheduled: Cell<Option<u64>>,
    next_ticket: Cell<u64>,
    flushing: Cell<bool>,
    batch_depth: Cell<usize>,
}

thread_local! {
    static SETTLE: SettleQueue = SettleQueue {
        scheduler: RefCell::new(Scheduler::default()),
        pending: RefCell::new(VecDeque::new()),
        scheduled: Cell::new(None),
        next_ticket: Cell::new(0),
        flushing: Cell::new(false),
        batch_depth: Cell::new(0),
    };

    static MICROTASKS: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
}

/// Replace the current thread's scheduler.
///
/// Pending settled notifications are handed to the new scheduler right away;
/// a flush task still held by the old one becomes a no-op.
pub fn set_scheduler(scheduler: Scheduler) {
    tracing::debug!(?scheduler, "settle scheduler replaced");
    SETTLE.with(|q| {
        *q.scheduler.borrow_mut() = scheduler;
        q.scheduled.set(None);
    });
    commit();
}

/// The current thread's scheduler.
pub fn current_scheduler() -> Scheduler {
    SETTLE.with(|q| q.scheduler.borrow().clone())
}

/// Queue a settled notification for `node` unless one is already pending.
pub(crate) fn request_settle(node: &Node) {
    if node.set_settle_pending() {
        return;
    }
    SETTLE.with(|q| q.pending.borrow_mut().push_back(node.downgrade()));
}

/// Number of settled notifications waiting for a flush.
pub fn pending_settles() -> usize {
    SETTLE.with(|q| q.pending.borrow().len())
}

/// Run `f`, holding back settled notifications until the outermost batch
/// returns. Batches nest.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let outermost = SETTLE.with(|q| {
                let depth = q.batch_depth.get() - 1;
                q.batch_depth.set(depth);
                depth == 0
            });
            if outermost {
                commit();
            }
        }
    }

    SETTLE.with(|q| q.batch_depth.set(q.batch_depth.get() + 1));
    let _guard = BatchGuard;
    f()
}

/// A scheduled flush. Dropping it unrun frees the slot for the next commit.
struct FlushTask {
    ticket: u64,
    ran: bool,
}

impl FlushTask {
    fn run(mut self) {
        self.ran = true;
        // Superseded by an explicit flush or a scheduler change.
        let current = SETTLE.with(|q| q.scheduled.get() == Some(self.ticket));
        if current {
            flush();
        }
    }
}

impl Drop for FlushTask {
    fn drop(&mut self) {
        if self.ran {
            return;
        }
        tracing::debug!(ticket = self.ticket, "flush task dropped before running");
        // The thread-local may already be gone during thread teardown.
        let _ = SETTLE.try_with(|q| {
            if q.scheduled.get() == Some(self.ticket) {
                q.scheduled.set(None);
            }
        });
    }
}

/// Hand a flush to the scheduler if there is anything to deliver.
fn commit() {
    let scheduled = SETTLE.with(|q| {
        let idle = q.batch_depth.get() == 0 && !q.flushing.get() && q.scheduled.get().is_none();
        if !idle || q.pending.borrow().is_empty() {
            return None;
        }
        let ticket = q.next_ticket.get();
        q.next_ticket.set(ticket + 1);
        q.scheduled.set(Some(ticket));
        Some((q.scheduler.borrow().clone(), ticket))
    });

    if let Some((scheduler, ticket)) = scheduled {
        let task = FlushTask { ticket, ran: false };
        scheduler.schedule(Box::new(move || task.run()));
    }
}

/// Deliver every pending settled notification now.
///
/// Returns the number of notifications broadcast. A flush requested while
/// one is already running returns 0; the running flush picks up the work.
pub fn flush() -> usize {
    struct FlushGuard;

    impl Drop for FlushGuard {
        fn drop(&mut self) {
            SETTLE.with(|q| q.flushing.set(false));
        }
    }

    let already_flushing = SETTLE.with(|q| {
        q.scheduled.set(None);
        q.flushing.replace(true)
    });
    if already_flushing {
        return 0;
    }
    let _guard = FlushGuard;

    let mut delivered = 0;
    loop {
        let Some(weak) = SETTLE.with(|q| q.pending.borrow_mut().pop_front()) else {
            break;
        };
        // Dropped before the flush: nobody left to tell.
        let Some(node) = weak.upgrade() else {
            continue;
        };
        node.take_settle_pending();
        node.settled().broadcast(&());
        delivered += 1;
    }

    if delivered > 0 {
        tracing::debug!(delivered, "settled notifications flushed");
    }
    delivered
}

/// Push `task` onto the current thread's microtask queue.
pub fn queue_microtask(task: Task) {
    MICROTASKS.with(|tasks| tasks.borrow_mut().push_back(task));
}

/// Run queued microtasks until the queue is empty, including any queued by
/// the tasks themselves. Returns the number of tasks run.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    while let Some(task) = MICROTASKS.with(|tasks| tasks.borrow_mut().pop_front()) {
        task();
        ran += 1;
    }
    ran
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn settled_counter(node: &Node) -> (Rc<Cell<usize>>, crate::reactive::Subscription) {
        let count = Rc::new(Cell::new(0));
        let handle = count.clone();
        let sub = node
            .settled()
            .subscribe(move |_| handle.set(handle.get() + 1));
        (count, sub)
    }

    #[test]
    fn requests_coalesce_per_node() {
        set_scheduler(Scheduler::microtask());
        let node = Node::new(NodeKind::Source);
        let (count, _sub) = settled_counter(&node);

        node.mark_dirty_and_propagate();
        node.mark_dirty_and_propagate();
        node.mark_dirty_and_propagate();
        assert_eq!(pending_settles(), 1);
        assert_eq!(count.get(), 0);

        assert_eq!(run_microtasks(), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(pending_settles(), 0);
    }

    #[test]
    fn sync_scheduler_flushes_after_the_pass() {
        set_scheduler(Scheduler::sync());
        let node = Node::source();
        let (count, _sub) = settled_counter(&node);

        node.mark_dirty_and_propagate();
        assert_eq!(count.get(), 1);
        node.mark_dirty_and_propagate();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn batch_defers_until_outermost_exit() {
        set_scheduler(Scheduler::sync());
        let node = Node::source();
        let (count, _sub) = settled_counter(&node);

        batch(|| {
            node.mark_dirty_and_propagate();
            batch(|| node.mark_dirty_and_propagate());
            assert_eq!(count.get(), 0);
        });
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn flush_order_follows_first_request() {
        set_scheduler(Scheduler::microtask());
        let a = Node::source();
        let b = Node::source();
        let order = Rc::new(RefCell::new(Vec::new()));
        let subs: Vec<_> = [&a, &b]
            .into_iter()
            .map(|node| {
                let order = order.clone();
                let id = node.id();
                node.settled().subscribe(move |_| order.borrow_mut().push(id))
            })
            .collect();

        b.mark_dirty_and_propagate();
        a.mark_dirty_and_propagate();
        b.mark_dirty_and_propagate();
        run_microtasks();

        assert_eq!(*order.borrow(), vec![b.id(), a.id()]);
        drop(subs);
    }

    #[test]
    fn custom_scheduler_receives_one_task_per_window() {
        let tasks: Rc<RefCell<Vec<Task>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = tasks.clone();
        set_scheduler(Scheduler::custom(move |task| sink.borrow_mut().push(task)));

        let node = Node::source();
        let (count, _sub) = settled_counter(&node);
        node.mark_dirty_and_propagate();
        node.mark_dirty_and_propagate();
        assert_eq!(tasks.borrow().len(), 1);

        let task = tasks.borrow_mut().pop().unwrap();
        task();
        assert_eq!(count.get(), 1);

        // A new window opens after the flush.
        node.mark_dirty_and_propagate();
        assert_eq!(tasks.borrow().len(), 1);
    }

    #[test]
    fn dropped_task_frees_the_slot() {
        let tasks: Rc<RefCell<Vec<Task>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = tasks.clone();
        set_scheduler(Scheduler::custom(move |task| sink.borrow_mut().push(task)));

        let node = Node::source();
        let (count, _sub) = settled_counter(&node);
        node.mark_dirty_and_propagate();
        assert_eq!(tasks.borrow().len(), 1);

        // The host discards the task without running it.
        tasks.borrow_mut().clear();
        assert_eq!(pending_settles(), 1);

        node.mark_dirty_and_propagate();
        assert_eq!(tasks.borrow().len(), 1);
        let task = tasks.borrow_mut().pop().unwrap();
        task();
        assert_eq!(count.get(), 1);
        assert_eq!(pending_settles(), 0);
    }

    #[test]
    fn stale_task_does_not_release_a_newer_one() {
        let tasks: Rc<RefCell<Vec<Task>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = tasks.clone();
        set_scheduler(Scheduler::custom(move |task| sink.borrow_mut().push(task)));

        let node = Node::source();
        node.mark_dirty_and_propagate();
        let stale = tasks.borrow_mut().pop().unwrap();

        // Re-installing hands the pending work out again.
        let sink = tasks.clone();
        set_scheduler(Scheduler::custom(move |task| sink.borrow_mut().push(task)));
        assert_eq!(tasks.borrow().len(), 1);

        drop(stale);
        node.mark_dirty_and_propagate();
        assert_eq!(tasks.borrow().len(), 1);
    }

    #[test]
    fn switching_scheduler_hands_over_pending_work() {
        set_scheduler(Scheduler::microtask());
        let node = Node::source();
        let (count, _sub) = settled_counter(&node);

        node.mark_dirty_and_propagate();
        assert_eq!(count.get(), 0);

        set_scheduler(Scheduler::sync());
        assert_eq!(count.get(), 1);
        assert_eq!(pending_settles(), 0);

        node.mark_dirty_and_propagate();
        assert_eq!(count.get(), 2);

        // The old microtask is now a no-op.
        run_microtasks();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn task_after_explicit_flush_is_a_no_op() {
        let tasks: Rc<RefCell<Vec<Task>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = tasks.clone();
        set_scheduler(Scheduler::custom(move |task| sink.borrow_mut().push(task)));

        let node = Node::source();
        let (count, _sub) = settled_counter(&node);
        node.mark_dirty_and_propagate();
        let early = tasks.borrow_mut().pop().unwrap();
        assert_eq!(flush(), 1);

        node.mark_dirty_and_propagate();
        let current = tasks.borrow_mut().pop().unwrap();

        early();
        assert_eq!(count.get(), 1);
        assert_eq!(pending_settles(), 1);

        current();
        assert_eq!(count.get(), 2);
        assert_eq!(pending_settles(), 0);
    }

    #[test]
    fn dropped_nodes_are_skipped() {
        set_scheduler(Scheduler::microtask());
        let node = Node::source();
        node.mark_dirty_and_propagate();
        drop(node);

        assert_eq!(pending_settles(), 1);
        assert_eq!(flush(), 0);
        assert_eq!(pending_settles(), 0);
    }

    #[test]
    fn writes_from_settled_handlers_drain_in_the_same_flush() {
        set_scheduler(Scheduler::microtask());
        let first = Node::source();
        let second = Node::source();
        let (count, _count_sub) = settled_counter(&second);

        let second_handle = second.clone();
        let _chain = first
            .settled()
            .subscribe(move |_| second_handle.mark_dirty_and_propagate());

        first.mark_dirty_and_propagate();
        assert_eq!(flush(), 2);
        assert_eq!(count.get(), 1);
    }
}
