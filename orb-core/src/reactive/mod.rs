//! Reactive Primitives
//!
//! This module implements the core reactive system: atoms, derived values,
//! and effects. These primitives sit on top of the dependency graph in
//! [`crate::graph`].
//!
//! # Concepts
//!
//! ## Atoms
//!
//! An Atom is a container for mutable state, split into a read handle
//! ([`Atom`]) and a write handle ([`Setter`]). When an atom is read by a
//! running computation (a derived value or an effect), the computation is
//! recorded as a consumer. When the atom's value changes, every transitive
//! consumer is invalidated.
//!
//! ## Derived values
//!
//! A [`Derived`] caches the result of a function of other reactive values. It
//! re-evaluates only when read after one of its sources changed.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs whenever its
//! dependencies change, once per scheduling window.
//!
//! ## Notifications
//!
//! Every reactive value owns two [`Notifier`]s. The *immediate* one fires
//! synchronously while a change propagates; the *settled* one fires once the
//! change is complete, as decided by the [`Scheduler`](crate::graph::Scheduler).
//!
//! # Implementation Notes
//!
//! Computations receive an explicit [`Orb`] that records what they read.
//! Ambient reads (`Readable::get`) go through a thread-local context stack
//! instead, so helper code that has no orb at hand is still tracked.

mod atom;
mod context;
mod derived;
mod effect;
mod notifier;
mod runtime;
mod subscriber;
mod trigger;

pub use atom::{atom, Atom, Setter};
pub use context::{Orb, ReactiveContext};
pub use derived::{CacheState, Derived};
pub use effect::Effect;
pub use notifier::{BroadcastReport, Notifier};
pub use runtime::{Reactive, Readable, Runtime};
pub use subscriber::{SubscriberId, Subscription};
pub use trigger::Trigger;
