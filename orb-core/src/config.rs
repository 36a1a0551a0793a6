//! Runtime configuration.
//!
//! The only knob is when settled notifications are delivered. Everything that
//! cannot be expressed as data (custom scheduling functions) goes through
//! [`Runtime::set_scheduler`](crate::reactive::Runtime::set_scheduler)
//! instead.

use serde::{Deserialize, Serialize};

/// When settled notifications are flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleMode {
    /// Right after the outermost write or batch completes.
    Sync,
    /// On the thread's microtask queue.
    #[default]
    Microtask,
    /// On a task spawned onto the current tokio `LocalSet`.
    TokioLocal,
}

/// Configuration for the reactive runtime of one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub settle: SettleMode,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
