//! MIME type detection for served artifacts.

use std::path::Path;

/// Common MIME type constants.
pub mod types {
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const PNG: &str = "image/png";
    pub const SVG: &str = "image/svg+xml";
    pub const STL: &str = "model/stl";
    pub const THREE_MF: &str = "model/3mf";
    pub const OBJ: &str = "model/obj";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Guess MIME type from file extension.
///
/// Returns a full MIME type string suitable for HTTP Content-Type header.
pub fn from_path(path: &Path) -> &'static str {
    from_extension(path.extension().and_then(|e| e.to_str()))
}

/// Guess MIME type from file extension string.
pub fn from_extension(ext: Option<&str>) -> &'static str {
    match ext {
        Some("png") => types::PNG,
        Some("svg") => types::SVG,
        Some("json") => types::JSON,
        Some("txt" | "scad") => types::PLAIN,
        Some("stl") => types::STL,
        Some("3mf") => types::THREE_MF,
        Some("obj") => types::OBJ,
        _ => types::OCTET_STREAM,
    }
}
