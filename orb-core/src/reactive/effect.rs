//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect's node is marked dirty and a
//!    settled notification is queued for it.
//!
//! 3. When the scheduler flushes, the effect hears its own settled
//!    notification and re-runs. Before re-running, it clears its old
//!    dependencies and records new ones through the [`Orb`].
//!
//! Several writes inside one scheduling window therefore cause a single
//! re-run.
//!
//! # Differences from Derived
//!
//! - Derived values return a value; effects do not.
//! - Derived values are lazy (compute on access); effects are eager (run when
//!   deps change).
//! - Derived values cache results; effects just run their side effect.
//!
//! # Lifetime
//!
//! An effect lives as long as a handle to it does. Dropping the last
//! [`Effect`] detaches it from its sources and it never runs again.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::context::{Orb, ReactiveContext};
use super::runtime::Reactive;
use super::subscriber::Subscription;
use crate::error::{ReactiveError, Result};
use crate::graph::{scheduler, Node};

struct EffectInner {
    node: Node,

    /// The effect function.
    run: RefCell<Box<dyn FnMut(&Orb<'_>)>>,

    /// Number of times the effect has run.
    runs: Cell<u64>,

    /// Re-runs the effect from its own settled notification.
    _rerun: Subscription,
}

impl EffectInner {
    fn execute(&self) -> Result<()> {
        let node = &self.node;
        if node.is_disposed() {
            return Err(ReactiveError::Disposed { node: node.id() });
        }
        if node.is_recording() {
            return Err(ReactiveError::Cycle { node: node.id() });
        }

        // Writes made by the effect are delivered after it returns.
        scheduler::batch(|| {
            node.reset_sources();
            let ctx = ReactiveContext::enter(node)?;
            node.mark_clean();
            {
                let mut run = self.run.borrow_mut();
                run(&Orb::new(node, true));
            }
            drop(ctx);

            self.runs.set(self.runs.get() + 1);
            tracing::trace!(
                node = %node.id(),
                runs = self.runs.get(),
                sources = node.source_ids().len(),
                "effect ran"
            );
            Ok(())
        })
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Cloning an `Effect` creates a new handle to the **same** effect.
///
/// # Example
///
/// ```rust,ignore
/// let (count, set_count) = atom(0);
///
/// let effect = Effect::new(move |orb| {
///     println!("Count is: {}", orb.read(&count));
/// });
///
/// set_count.set(5);
/// Runtime::run_microtasks(); // Prints: "Count is: 5"
/// ```
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: FnMut(&Orb<'_>) + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies, and so never re-runs, until the first
    /// [`execute`](Effect::execute).
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: FnMut(&Orb<'_>) + 'static,
    {
        let inner = Rc::new_cyclic(|weak: &Weak<EffectInner>| {
            let node = Node::effect();
            let weak = weak.clone();
            let rerun = node.settled().subscribe(move |_| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.node.is_clean() {
                    return;
                }
                if let Err(err) = inner.execute() {
                    tracing::debug!(node = %inner.node.id(), %err, "effect re-run skipped");
                }
            });
            EffectInner {
                node,
                run: RefCell::new(Box::new(run)),
                runs: Cell::new(0),
                _rerun: rerun,
            }
        });
        Self { inner }
    }

    /// Run the effect function now, re-recording its dependencies.
    ///
    /// Does nothing once the effect is disposed.
    pub fn execute(&self) {
        match self.inner.execute() {
            Ok(()) | Err(ReactiveError::Disposed { .. }) => {}
            Err(err) => tracing::warn!(node = %self.inner.node.id(), %err, "effect not run"),
        }
    }

    /// Run the effect function now, reporting why it could not run.
    pub fn try_execute(&self) -> Result<()> {
        self.inner.execute()
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again and its sources forget
    /// it. Disposing twice is a no-op.
    pub fn dispose(&self) {
        self.inner.node.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.node.is_disposed()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.node.source_ids().len()
    }
}

impl Reactive for Effect {
    fn node(&self) -> &Node {
        &self.inner.node
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.node.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Scheduler;
    use crate::reactive::{atom, Runtime};

    fn counter() -> (Rc<Cell<u32>>, impl FnMut(&Orb<'_>) + 'static) {
        let count = Rc::new(Cell::new(0));
        let handle = count.clone();
        (count, move |_: &Orb<'_>| handle.set(handle.get() + 1))
    }

    #[test]
    fn effect_runs_on_creation() {
        let (count, run) = counter();
        let _effect = Effect::new(run);

        // Effect should have run once on creation
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let (count, run) = counter();
        let effect = Effect::new_lazy(run);

        // Effect should not have run
        assert_eq!(count.get(), 0);
        assert_eq!(effect.run_count(), 0);

        // Manually execute
        effect.execute();
        assert_eq!(count.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_a_dependency_changes() {
        Runtime::set_scheduler(Scheduler::sync());
        let (value, set_value) = atom(1);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_handle = seen.clone();
        let effect = Effect::new(move |orb| seen_handle.borrow_mut().push(orb.read(&value)));
        assert_eq!(effect.dependency_count(), 1);

        set_value.set(2);
        set_value.set(3);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn writes_in_one_window_rerun_once() {
        Runtime::set_scheduler(Scheduler::microtask());
        let (value, set_value) = atom(0);
        let effect = Effect::new(move |orb| {
            orb.read(&value);
        });

        set_value.set(1);
        set_value.set(2);
        set_value.set(3);
        assert_eq!(effect.run_count(), 1);

        Runtime::run_microtasks();
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        Runtime::set_scheduler(Scheduler::sync());
        let (value, set_value) = atom(0);
        let effect = {
            let value = value.clone();
            Effect::new(move |orb| {
                orb.read(&value);
            })
        };

        // Ran once on creation
        assert_eq!(effect.run_count(), 1);

        // Dispose
        effect.dispose();
        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(value.consumer_count(), 0);

        // A change should not run it
        set_value.set(1);
        assert_eq!(effect.run_count(), 1);

        // Execute should not run
        effect.execute();
        assert_eq!(effect.run_count(), 1);
        assert!(matches!(
            effect.try_execute(),
            Err(ReactiveError::Disposed { .. })
        ));
    }

    #[test]
    fn dropping_the_last_handle_stops_the_effect() {
        Runtime::set_scheduler(Scheduler::sync());
        let (value, set_value) = atom(0);
        let (count, mut run) = counter();

        let effect = {
            let value = value.clone();
            Effect::new(move |orb| {
                orb.read(&value);
                run(orb);
            })
        };
        assert_eq!(count.get(), 1);
        assert_eq!(value.consumer_count(), 1);

        drop(effect);
        assert_eq!(value.consumer_count(), 0);
        set_value.set(1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn dependencies_follow_the_last_run() {
        Runtime::set_scheduler(Scheduler::sync());
        let (enabled, set_enabled) = atom(false);
        let (detail, set_detail) = atom(0);

        let effect = {
            let detail = detail.clone();
            Effect::new(move |orb| {
                if orb.read(&enabled) {
                    orb.read(&detail);
                }
            })
        };
        assert_eq!(effect.dependency_count(), 1);

        set_detail.set(1);
        assert_eq!(effect.run_count(), 1);

        set_enabled.set(true);
        assert_eq!(effect.dependency_count(), 2);
        set_detail.set(2);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_writes_are_delivered_after_it_returns() {
        Runtime::set_scheduler(Scheduler::sync());
        let (input, set_input) = atom(1);
        let (output, set_output) = atom(0);
        let observed = Rc::new(Cell::new(0));

        let observed_handle = observed.clone();
        let output_handle = output.clone();
        let _watch = output.subscribe(move || observed_handle.set(output_handle.get_untracked()));

        let _effect = Effect::new(move |orb| {
            set_output.set(orb.read(&input) * 10);
        });
        assert_eq!(observed.get(), 10);

        set_input.set(2);
        assert_eq!(output.get_untracked(), 20);
        assert_eq!(observed.get(), 20);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|_| {});
        let effect2 = effect1.clone();

        // Same node
        assert_eq!(effect1.node(), effect2.node());

        // Shared run count
        assert_eq!(effect1.run_count(), 1);
        assert_eq!(effect2.run_count(), 1);

        effect1.execute();
        assert_eq!(effect1.run_count(), 2);
        assert_eq!(effect2.run_count(), 2);

        // Shared disposal state
        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
