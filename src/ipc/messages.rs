//! Control socket message types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Requests sent by a controlling client to the daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ControlRequest {
    /// Run one dispatcher call
    Call {
        event: String,
        #[serde(default)]
        arg: Option<Value>,
    },

    /// Turn this connection into an event stream
    Listen { event: String },

    /// Move the resource root
    Relocate { path: PathBuf },

    /// Another application gained or lost the foreground
    Session { busy: bool },

    /// Screen locked or unlocked
    ScreenLock { locked: bool },

    /// Health check
    Ping,

    /// Request graceful shutdown
    Shutdown,
}

/// Responses sent from the daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ControlResponse {
    /// Result of a `Call`
    Reply(Value),

    /// One payload on a `Listen` stream
    Event { event: String, payload: Value },

    /// Health check response
    Pong,

    /// Acknowledgment that request was processed
    Ready,

    /// Error occurred
    Error(String),
}
