//! Live preview server: artifact HTTP server plus the actor system.
//!
//! The HTTP side only serves files from the build directory. Everything
//! live (builds, renders, exports) goes through the WebSocket actors.

mod lifecycle;
mod response;

use crate::{config::ProjectConfig, log};
use anyhow::Result;
use crossbeam::channel;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_http::{Request, Server};

/// Bound server ready to accept requests
pub struct BoundServer {
    server: Arc<Server>,
    shutdown_rx: channel::Receiver<()>,
}

/// Bind the HTTP server without starting the request loop.
pub fn bind_server(config: &ProjectConfig) -> Result<BoundServer> {
    let (server, addr) = lifecycle::bind_with_retry(config.serve.interface, config.serve.port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    crate::core::register_server(Arc::clone(&server), shutdown_tx);

    log!("serve"; "http://{}", addr);

    Ok(BoundServer {
        server,
        shutdown_rx,
    })
}

impl BoundServer {
    /// Start the actors and the request loop (blocking).
    pub fn run(self, config: Arc<ProjectConfig>) -> Result<()> {
        let actor_handle =
            lifecycle::spawn_actors(Arc::clone(&config), Arc::clone(&self.server), self.shutdown_rx)?;
        run_request_loop(&self.server, config.build_dir());
        lifecycle::wait_for_shutdown(actor_handle)
    }
}

/// Run `scadview serve` until Ctrl+C unblocks the server.
pub fn serve(config: Arc<ProjectConfig>) -> Result<()> {
    bind_server(&config)?.run(config)
}

fn run_request_loop(server: &Server, build_dir: &Path) {
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, build_dir) {
            log!("serve"; "request error: {e}");
        }
    }
}

/// Handle a single HTTP request
fn handle_request(request: Request, build_dir: &Path) -> Result<()> {
    if crate::core::is_shutdown() {
        return response::respond_unavailable(request);
    }

    match resolve_artifact(request.url(), build_dir) {
        Some(path) => response::respond_file(request, &path),
        None => response::respond_not_found(request),
    }
}

/// Map a request URL to a file under the build directory.
///
/// The URL is percent-decoded and stripped of its query string; any `..`
/// segment is rejected.
fn resolve_artifact(url: &str, build_dir: &Path) -> Option<PathBuf> {
    use percent_encoding::percent_decode_str;

    let path = url.split(['?', '#']).next().unwrap_or_default();
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let local = crate::utils::path::relative_within(build_dir, &decoded)?;
    local.is_file().then_some(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn build_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("screenshots")).unwrap();
        fs::write(dir.path().join("screenshots/part-bracket-iso.png"), b"png").unwrap();
        fs::write(dir.path().join("screenshots/with space.png"), b"png").unwrap();
        dir
    }

    #[test]
    fn test_resolve_artifact() {
        let dir = build_dir();
        let root = dir.path();
        assert_eq!(
            resolve_artifact("/screenshots/part-bracket-iso.png?t=123", root),
            Some(root.join("screenshots/part-bracket-iso.png"))
        );
        assert_eq!(
            resolve_artifact("/screenshots/with%20space.png", root),
            Some(root.join("screenshots/with space.png"))
        );
    }

    #[test]
    fn test_resolve_artifact_rejects() {
        let dir = build_dir();
        let root = dir.path().join("screenshots");
        // directories, missing files and traversal are all 404
        assert_eq!(resolve_artifact("/", dir.path()), None);
        assert_eq!(resolve_artifact("/screenshots/missing.png", dir.path()), None);
        assert_eq!(resolve_artifact("/../screenshots/part-bracket-iso.png", &root), None);
        assert_eq!(resolve_artifact("/%2e%2e/secret", &root), None);
    }
}
