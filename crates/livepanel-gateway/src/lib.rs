//! Transport worker for Live Panel.
//!
//! The worker is a dedicated thread running its own tokio runtime with an
//! axum WebSocket server. It owns every open connection. Host threads hand
//! it messages through an unbounded channel and never touch connections
//! directly.

pub mod connection;
pub mod events;
pub mod server;
pub mod worker;

use livepanel_core::{ClientMessage, ServerMessage};

pub use worker::{TransportWorker, WorkerCommand};

/// Sink for messages that should reach every open connection.
///
/// Implementations must not block and must tolerate having nowhere to
/// deliver: a broadcast with no worker running is silently dropped.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, msg: ServerMessage);
}

/// The session side of the worker.
///
/// Both methods are called on the worker thread.
pub trait SessionBridge: Send + Sync + 'static {
    /// The `full_state` message sent to a freshly opened connection.
    fn full_state(&self) -> ServerMessage;

    /// Handle one parsed inbound message.
    fn handle_client_message(&self, msg: ClientMessage);

    /// Number of live items, reported by `/health`.
    fn item_count(&self) -> usize {
        0
    }
}
