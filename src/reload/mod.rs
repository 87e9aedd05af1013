//! Live update protocol and WebSocket listener.
//!
//! ```text
//! Orchestrator / ExportGenerator ──Event──► WsActor ──JSON──► viewers
//!                                               ▲
//! viewers ──ViewerRequest──► RequestActor ──────┘
//! ```
//!
//! - `message` - Event and request types (JSON, tagged by `type`)
//! - `server` - WebSocket listener with port retry

pub mod message;
pub mod server;
