//! WebSocket Actor - Bidirectional Communication
//!
//! This actor is responsible for:
//! - Managing viewer connections
//! - Broadcasting every pipeline/export event to all viewers
//! - Sending a state snapshot to viewers that join late
//! - Forwarding viewer requests to the RequestActor
//!
//! # Architecture
//!
//! ```text
//! Orchestrator/Exports --[Event]--> WsActor --[broadcast]--> Viewers
//!                                      |                        |
//!                 RequestActor <--[ViewerRequest]---------------+
//! ```

mod client_io;
mod delivery;

use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::messages::{RequestMsg, WsMsg};
use crate::config::ProjectConfig;
use crate::pipeline::ValidationResult;
use crate::reload::message::Event;

/// A connected viewer
struct Viewer {
    id: u64,
    ws: WebSocket<TcpStream>,
}

/// WebSocket Actor - manages viewers and broadcasts
pub struct WsActor {
    rx: mpsc::Receiver<WsMsg>,
    events: mpsc::UnboundedReceiver<Event>,
    request_tx: mpsc::Sender<RequestMsg>,
    config: Arc<ProjectConfig>,
    /// HTTP artifact server port, announced in `connected`
    http_port: u16,
    /// Connected viewers (shared for broadcast + read thread)
    viewers: Arc<Mutex<Vec<Viewer>>>,
    next_id: u64,
    /// Last validation result, replayed to new viewers
    last_validation: Arc<Mutex<Option<ValidationResult>>>,
}

impl WsActor {
    pub fn new(
        rx: mpsc::Receiver<WsMsg>,
        events: mpsc::UnboundedReceiver<Event>,
        request_tx: mpsc::Sender<RequestMsg>,
        config: Arc<ProjectConfig>,
        http_port: u16,
    ) -> Self {
        Self {
            rx,
            events,
            request_tx,
            config,
            http_port,
            viewers: Arc::new(Mutex::new(Vec::new())),
            next_id: 0,
            last_validation: Arc::new(Mutex::new(None)),
        }
    }

    /// Seed the snapshot with a validation restored from the cache record.
    pub fn with_validation(mut self, validation: Option<ValidationResult>) -> Self {
        *self.last_validation.lock() = validation;
        self
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let viewers = Arc::clone(&self.viewers);
        let request_tx = self.request_tx.clone();
        std::thread::spawn(move || Self::viewer_reader_loop(viewers, request_tx));

        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(WsMsg::AddClient(stream)) => self.add_viewer(stream),
                    Some(WsMsg::Shutdown) | None => {
                        crate::debug!("ws"; "shutting down");
                        for mut viewer in self.viewers.lock().drain(..) {
                            let _ = viewer.ws.close(None);
                        }
                        break;
                    }
                },
                Some(event) = self.events.recv() => {
                    if let Event::Validation(validation) = &event {
                        *self.last_validation.lock() = Some(validation.clone());
                    }
                    self.broadcast(Message::Text(event.to_json().into()));
                }
            }
        }
    }
}
