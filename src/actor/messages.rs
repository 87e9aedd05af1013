//! Actor Message Definitions
//!
//! Message types for inter-actor communication.
//!
//! ```text
//! FsActor --Run--> PipelineActor --Event--> WsActor --> viewers
//!                        ^                     |
//!                        +-- RequestActor <----+ (viewer requests)
//! ```
//!
//! Events themselves travel on the unbounded [`EventTx`](crate::pipeline::EventTx)
//! channel so producers never wait on slow viewers.

use crate::pipeline::RunRequest;
use crate::reload::message::ViewerRequest;

// =============================================================================
// PipelineActor Messages
// =============================================================================

/// Messages to Pipeline Actor
#[derive(Debug)]
pub enum PipelineMsg {
    /// Start a run (dropped if one is already active)
    Run(RunRequest),
    /// Shutdown
    Shutdown,
}

// =============================================================================
// RequestActor Messages
// =============================================================================

/// Messages to Request Actor
#[derive(Debug)]
pub enum RequestMsg {
    /// A parsed request from a viewer
    Viewer(ViewerRequest),
    /// Shutdown
    Shutdown,
}

// =============================================================================
// WsActor Messages
// =============================================================================

/// Messages to WebSocket Actor
#[derive(Debug)]
pub enum WsMsg {
    /// Add client (raw socket, handshake pending)
    AddClient(std::net::TcpStream),
    /// Close every viewer and stop
    Shutdown,
}
