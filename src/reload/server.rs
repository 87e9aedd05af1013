//! WebSocket listener for live updates.
//!
//! Accepted sockets are handed to the WsActor, which owns the handshake and
//! every connected viewer.

use std::net::{IpAddr, SocketAddr, TcpListener};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::actor::messages::WsMsg;
use crate::core::is_shutdown;
use crate::{debug, log};

/// Maximum port retry attempts
pub const MAX_PORT_RETRIES: u16 = 10;

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Bind the WebSocket port and start the acceptor thread.
///
/// Returns the port actually bound.
pub fn start_ws_server(interface: IpAddr, base_port: u16, ws_tx: mpsc::Sender<WsMsg>) -> Result<u16> {
    let (listener, actual_port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;

    std::thread::spawn(move || {
        while !is_shutdown() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    debug!("ws"; "viewer connected: {}", addr);

                    // The handshake and reader thread use blocking IO
                    let _ = stream.set_nonblocking(false);

                    if ws_tx.blocking_send(WsMsg::AddClient(stream)).is_err() {
                        debug!("ws"; "actor gone, acceptor stopping");
                        break;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    log!("ws"; "accept error: {}", e);
                    std::thread::sleep(ACCEPT_POLL);
                }
            }
        }
    });

    Ok(actual_port)
}

/// Try binding to port, retry with incremented port if in use
pub fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind {} after {} attempts starting at port {}: {}",
        interface,
        max_retries,
        base_port,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
