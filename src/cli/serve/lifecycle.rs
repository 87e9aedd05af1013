//! Server lifecycle management.

use crate::{actor::Coordinator, config::ProjectConfig, log};
use anyhow::Result;
use crossbeam::channel::Receiver;
use std::{
    net::SocketAddr,
    sync::Arc,
    thread::{self, JoinHandle},
};
use tiny_http::Server;

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Bind to the specified interface and port, with automatic port retry.
pub fn bind_with_retry(
    interface: std::net::IpAddr,
    base_port: u16,
) -> Result<(Server, SocketAddr)> {
    let mut last_error = String::new();
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                // Port 0 asks the OS for one; report what was actually bound
                let addr = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, addr));
            }
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(anyhow::anyhow!(
        "failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_error
    ))
}

/// Spawn the actor system on its own thread with a tokio runtime.
///
/// When the actors stop, for any reason, the HTTP server is unblocked too.
pub fn spawn_actors(
    config: Arc<ProjectConfig>,
    server: Arc<Server>,
    shutdown_rx: Receiver<()>,
) -> Result<JoinHandle<Result<()>>> {
    let http_port = server
        .server_addr()
        .to_ip()
        .map_or(config.serve.port, |addr| addr.port());
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("failed to create tokio runtime: {}", e))?;

    Ok(thread::spawn(move || {
        let result = rt.block_on(
            Coordinator::with_config(config, http_port)
                .with_shutdown_signal(shutdown_rx)
                .run(),
        );
        crate::core::request_shutdown();
        server.unblock();
        result
    }))
}

/// Wait for actor system to shutdown gracefully (max 3 seconds).
///
/// Returns the actor system's error, if it failed.
pub fn wait_for_shutdown(handle: JoinHandle<Result<()>>) -> Result<()> {
    for _ in 0..60 {
        if handle.is_finished() {
            return handle
                .join()
                .map_err(|_| anyhow::anyhow!("actor thread panicked"))?;
        }
        thread::sleep(std::time::Duration::from_millis(50));
    }
    log!("actor"; "did not stop in time, exiting anyway");
    Ok(())
}
