//! Actor System for serve mode
//!
//! Message-passing concurrency between the watcher, the pipeline and viewers:
//!
//! ```text
//! FsActor ──[Run]──► PipelineActor ──[Event]──► WsActor ──► viewers
//! (watch)            (build/render)             (broadcast)     │
//!                         ▲                                     │
//!                         └──[Run]── RequestActor ◄──[request]──┘
//!                                    (exports)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with debouncing
//! - `pipeline` - Drives one orchestrator run at a time
//! - `request` - Viewer requests: rebuilds, renders, exports
//! - `ws` - WebSocket broadcast and late-join snapshots
//! - `coordinator` - Wires up and runs actors

pub mod coordinator;
pub mod fs;
pub mod messages;
pub mod pipeline;
pub mod request;
pub mod ws;

pub use coordinator::Coordinator;
