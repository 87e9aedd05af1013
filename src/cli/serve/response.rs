//! HTTP response handlers for the artifact server.

use anyhow::{Context, Result};
use std::{fs, path::Path};
use tiny_http::{Header, Method, Request, Response, StatusCode};

/// Respond with an artifact file.
///
/// Artifacts are rewritten in place on every render, so nothing is cached.
pub fn respond_file(request: Request, path: &Path) -> Result<()> {
    let content_type = crate::utils::mime::from_path(path);

    if is_head_request(&request) {
        return send_head(request, 200, content_type);
    }

    // Large meshes are fetched in chunks by some viewers
    if let Some(range) = get_range_header(&request) {
        return respond_range(request, path, content_type, &range);
    }

    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    send_body(request, 200, content_type, body)
}

/// Handle a Range request with a streamed 206 response.
fn respond_range(
    request: Request,
    path: &Path,
    content_type: &'static str,
    range: &str,
) -> Result<()> {
    use std::io::{Read, Seek, SeekFrom};

    let file_size = fs::metadata(path)?.len();
    let range = range.strip_prefix("bytes=").unwrap_or(range);
    let Some((start, end)) = parse_range(range, file_size) else {
        let response = Response::empty(StatusCode(416))
            .with_header(header("Content-Range", &format!("bytes */{file_size}"))?);
        request.respond(response)?;
        return Ok(());
    };

    let length = end - start + 1;
    let mut file = fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let reader = file.take(length);

    let response = Response::new(
        StatusCode(206),
        vec![
            header("Content-Type", content_type)?,
            header("Content-Range", &format!("bytes {start}-{end}/{file_size}"))?,
            header("Accept-Ranges", "bytes")?,
            header("Cache-Control", "no-store")?,
        ],
        reader,
        usize::try_from(length).ok(),
        None,
    );

    request.respond(response)?;
    Ok(())
}

/// Parse a Range value `start-end` into inclusive byte offsets.
///
/// Returns `None` when the range cannot be satisfied.
fn parse_range(range: &str, file_size: u64) -> Option<(u64, u64)> {
    let last = file_size.checked_sub(1)?;
    let (s, e) = range.trim().split_once('-')?;
    let (s, e) = (s.trim(), e.trim());

    let (start, end) = match (s.is_empty(), e.is_empty()) {
        // "0-499"
        (false, false) => (s.parse().ok()?, e.parse::<u64>().ok()?.min(last)),
        // "500-"
        (false, true) => (s.parse().ok()?, last),
        // "-500": last 500 bytes
        (true, false) => (file_size.saturating_sub(e.parse().ok()?), last),
        (true, true) => return None,
    };

    (start <= end).then_some((start, end))
}

/// Extract Range header from request.
fn get_range_header(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case("range"))
        .map(|h| h.value.to_string())
}

/// Respond with 404.
pub fn respond_not_found(request: Request) -> Result<()> {
    use crate::utils::mime::types::PLAIN;

    if is_head_request(&request) {
        return send_head(request, 404, PLAIN);
    }
    send_body(request, 404, PLAIN, b"404 Not Found".to_vec())
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    use crate::utils::mime::types::PLAIN;
    send_body(request, 503, PLAIN, b"503 Service Unavailable".to_vec())
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send_head(request: Request, status: u16, content_type: &'static str) -> Result<()> {
    let response = Response::empty(StatusCode(status))
        .with_header(header("Content-Type", content_type)?)
        .with_header(header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

fn send_body(
    request: Request,
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", content_type)?)
        .with_header(header("Cache-Control", "no-store")?)
        // Viewers may be served from another origin
        .with_header(header("Access-Control-Allow-Origin", "*")?);
    request.respond(response)?;
    Ok(())
}

fn header(key: &str, value: &str) -> Result<Header> {
    Header::from_bytes(key, value).map_err(|()| anyhow::anyhow!("invalid header {key}: {value}"))
}
