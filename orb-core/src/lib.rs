//! Orb Core
//!
//! This crate provides the core runtime for Orb, a fine-grained reactive
//! state library. It implements:
//!
//! - Reactive primitives (atoms, derived values, effects, triggers)
//! - A dependency graph with weakly held consumers and lazy invalidation
//! - Two notification channels per value: immediate and settled
//! - Pluggable scheduling of settled notifications
//!
//! Everything is single-threaded: values are `!Send` and each thread has its
//! own runtime.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, notifiers and dependency tracking
//! - `graph`: Dependency nodes and the settle scheduler
//! - `config`: Serializable runtime configuration
//! - `error`: The crate-wide error type
//!
//! # Example
//!
//! ```rust,ignore
//! use orb_core::reactive::{atom, Derived, Effect, Readable, Runtime};
//!
//! // Create an atom
//! let (count, set_count) = atom(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Derived::new(move |orb| orb.read(&count) * 2)
//! };
//!
//! // Create an effect
//! let _effect = Effect::new(move |orb| {
//!     println!("Count: {}, Doubled: {}", orb.read(&count), orb.read(&doubled));
//! });
//!
//! // Update the atom
//! set_count.set(5);
//! Runtime::run_microtasks();
//! // Effect runs again, prints: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{RuntimeConfig, SettleMode};
pub use error::{ReactiveError, Result};
pub use graph::{Node, NodeId, Scheduler};
pub use reactive::{
    atom, Atom, Derived, Effect, Orb, Reactive, Readable, Runtime, Setter, Subscription, Trigger,
};
