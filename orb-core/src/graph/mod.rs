//! Dependency Graph
//!
//! This module implements the dependency graph that links reactive values to
//! the computations reading them, and the scheduler that delivers their
//! change notifications.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent reactive values (atoms, triggers) or computations
//!   (derived values, effects)
//! - Edges represent dependencies: if A reads B, B is a source of A and A is a
//!   consumer of B
//!
//! When a source changes, we walk its consumers depth-first and mark them
//! dirty. Nothing recomputes during the walk: derived values recompute when
//! they are next read, effects when their settled notification is delivered.
//!
//! # Design Decisions
//!
//! 1. The graph is distributed: each node owns its own edge lists. There is
//!    no central registry, so a node that is no longer referenced simply
//!    disappears along with its edges.
//!
//! 2. Edges are only ever added to the node whose computation is currently
//!    running, which is how cycles are prevented.
//!
//! 3. Each node keeps both directions: sources (strong) to rebuild edges on
//!    recomputation, consumers (weak) to propagate invalidation.

mod node;
pub mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind, WeakNode};
pub use scheduler::{Scheduler, Task};
