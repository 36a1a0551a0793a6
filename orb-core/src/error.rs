//! Error types for the reactive graph.
//!
//! Most of these are programmer errors (reading outside a tracking context,
//! building a cycle). The fallible entry points (`try_get`, `Orb::try_read`)
//! return them; the ergonomic ones (`get`, `Orb::read`) panic with the same
//! message.

use crate::graph::NodeId;
use crate::reactive::SubscriberId;

/// Errors reported by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// A tracked read happened with no recording frame open.
    #[error("tracked read of node {node} outside any reactive context; use an untracked read instead")]
    NoActiveContext { node: NodeId },

    /// A node was read while its own computation is still running.
    #[error("dependency cycle: node {node} was read while it is being recomputed")]
    Cycle { node: NodeId },

    /// An edge was recorded into a node that is not open for recording.
    #[error("node {node} is not open for recording")]
    NotRecording { node: NodeId },

    /// The value behind this node was explicitly disposed.
    #[error("node {node} was used after it was disposed")]
    Disposed { node: NodeId },

    /// A notifier subscriber panicked during a broadcast.
    #[error("subscriber {subscriber} panicked: {message}")]
    SubscriberPanicked {
        subscriber: SubscriberId,
        message: String,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
