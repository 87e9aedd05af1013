use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tungstenite::protocol::Message;

use crate::actor::messages::RequestMsg;
use crate::artifact;
use crate::reload::message::{Event, ViewerRequest};

use super::{Viewer, WsActor};
use crate::config::ProjectConfig;
use crate::pipeline::ValidationResult;

const READ_POLL: Duration = Duration::from_millis(100);

/// Upper bound on a single handshake read or snapshot write.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a blocking task needs to admit one viewer.
struct Admission {
    id: u64,
    config: Arc<ProjectConfig>,
    http_port: u16,
    viewers: Arc<Mutex<Vec<Viewer>>>,
    last_validation: Arc<Mutex<Option<ValidationResult>>>,
}

impl Admission {
    /// Handshake, send the current state, then register for broadcasts.
    ///
    /// Snapshot order: `connected`, last `validation`, then every artifact
    /// on disk. The viewer list stays locked from the snapshot until the
    /// viewer is registered, so no broadcast falls in between.
    fn admit(self, stream: TcpStream) {
        let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));
        let _ = stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT));
        let mut ws = match tungstenite::accept(stream) {
            Ok(ws) => ws,
            Err(e) => {
                crate::log!("ws"; "handshake failed: {}", e);
                return;
            }
        };

        let mut viewers = self.viewers.lock();
        let mut snapshot = vec![Event::connected(&self.config, self.http_port)];
        if let Some(validation) = self.last_validation.lock().clone() {
            snapshot.push(Event::Validation(validation));
        }
        snapshot.extend(artifact::snapshot(&self.config));

        for event in &snapshot {
            if let Err(e) = ws.send(Message::Text(event.to_json().into())) {
                crate::debug!("ws"; "viewer dropped during snapshot: {}", e);
                return;
            }
        }
        // Non-blocking from here on: the reader thread polls, and a viewer
        // that stops reading fails its next broadcast instead of stalling it
        let _ = ws.get_ref().set_nonblocking(true);

        viewers.push(Viewer { id: self.id, ws });
        crate::debug!("ws"; "viewer {} connected ({} total, {} snapshot events)", self.id, viewers.len(), snapshot.len());
    }
}

impl WsActor {
    /// Hand a new socket to a blocking task for handshake and snapshot.
    ///
    /// A client that stalls the handshake only holds its own task, and is
    /// dropped once [`HANDSHAKE_TIMEOUT`] expires.
    pub(super) fn add_viewer(&mut self, stream: TcpStream) {
        let id = self.next_id;
        self.next_id += 1;
        let admission = Admission {
            id,
            config: Arc::clone(&self.config),
            http_port: self.http_port,
            viewers: Arc::clone(&self.viewers),
            last_validation: Arc::clone(&self.last_validation),
        };
        tokio::task::spawn_blocking(move || admission.admit(stream));
    }

    /// Background thread polling viewers for requests (non-blocking reads).
    pub(super) fn viewer_reader_loop(
        viewers: Arc<Mutex<Vec<Viewer>>>,
        request_tx: mpsc::Sender<RequestMsg>,
    ) {
        while !request_tx.is_closed() {
            std::thread::sleep(READ_POLL);

            let mut requests = Vec::new();
            viewers.lock().retain_mut(|viewer| match viewer.ws.read() {
                Ok(Message::Text(text)) => {
                    match ViewerRequest::from_json(&text) {
                        Some(request) => requests.push(request),
                        None => crate::debug!("ws"; "viewer {}: ignoring {}", viewer.id, text.as_str()),
                    }
                    true
                }
                Ok(Message::Close(_)) => {
                    crate::debug!("ws"; "viewer {} closed", viewer.id);
                    false
                }
                Ok(_) => true,
                Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    true
                }
                Err(e) => {
                    crate::debug!("ws"; "viewer {} disconnected: {}", viewer.id, e);
                    false
                }
            });

            // Forward outside the lock
            for request in requests {
                if request_tx.blocking_send(RequestMsg::Viewer(request)).is_err() {
                    return;
                }
            }
        }
    }
}

