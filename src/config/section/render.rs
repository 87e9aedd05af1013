//! `[render]`, `[cameras]` and `[camera_sets]` configuration.
//!
//! # Example
//!
//! ```toml
//! [render]
//! command = ["openscad"]      # Screenshot renderer
//! image_size = [800, 600]     # --imgsize=W,H
//! color_scheme = "Tomorrow"   # --colorscheme
//! facets = 64                 # -D $fn=N
//! autocenter = true           # --autocenter
//! viewall = true              # --viewall
//! camera_set = "standard"     # Default camera set for models without one
//!
//! [cameras]
//! iso = "0,0,0,55,0,25,140"   # tx,ty,tz,rx,ry,rz,dist
//! front = "0,0,0,90,0,0,140"
//!
//! [camera_sets]
//! standard = ["iso", "front"]
//! ```
//!
//! Every value in this file section feeds the render config hash, so
//! changing any of them re-renders every model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Camera name → camera string.
pub type Cameras = BTreeMap<String, String>;

/// Camera set name → ordered angle names.
pub type CameraSets = BTreeMap<String, Vec<String>>;

/// Number of comma-separated fields in a camera string.
pub const CAMERA_FIELDS: usize = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Renderer command (program followed by fixed arguments).
    pub command: Vec<String>,
    pub image_size: [u32; 2],
    pub color_scheme: String,
    pub facets: u32,
    pub autocenter: bool,
    pub viewall: bool,
    /// Config-level default camera set.
    pub camera_set: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: vec!["openscad".to_string()],
            image_size: [800, 600],
            color_scheme: "Tomorrow".to_string(),
            facets: 64,
            autocenter: true,
            viewall: true,
            camera_set: "standard".to_string(),
        }
    }
}

impl RenderConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.command.first().is_none_or(|p| p.trim().is_empty()) {
            diag.error(FieldPath::new("render.command"), "renderer command is empty");
        }
        if self.image_size.contains(&0) {
            diag.error_with_hint(
                FieldPath::new("render.image_size"),
                "image size must be non-zero",
                "image_size = [800, 600]",
            );
        }
        if self.facets == 0 {
            diag.error(FieldPath::new("render.facets"), "facet count must be positive");
        }
    }
}

/// Cameras used when `[cameras]` is absent.
pub fn default_cameras() -> Cameras {
    [
        ("iso", "0,0,0,55,0,25,140"),
        ("front", "0,0,0,90,0,0,140"),
        ("top", "0,0,0,0,0,0,140"),
        ("right", "0,0,0,90,0,90,140"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Camera sets used when `[camera_sets]` is absent.
pub fn default_camera_sets() -> CameraSets {
    let standard = ["iso", "front", "top", "right"]
        .into_iter()
        .map(String::from)
        .collect();
    BTreeMap::from([("standard".to_string(), standard)])
}

/// Check that a camera string has seven numeric fields.
pub fn is_valid_camera(camera: &str) -> bool {
    let fields: Vec<_> = camera.split(',').collect();
    fields.len() == CAMERA_FIELDS && fields.iter().all(|f| f.trim().parse::<f64>().is_ok())
}

/// Validate `[cameras]` and `[camera_sets]`.
///
/// Malformed camera strings are fatal; dangling angle references only warn,
/// since the render phase degrades per job.
pub fn validate_cameras(cameras: &Cameras, sets: &CameraSets, diag: &mut ConfigDiagnostics) {
    for (name, camera) in cameras {
        if !is_valid_camera(camera) {
            diag.error_with_hint(
                FieldPath::new(format!("cameras.{name}")),
                format!("invalid camera `{camera}`"),
                "expected seven numbers: tx,ty,tz,rx,ry,rz,dist",
            );
        }
    }
    for (set, angles) in sets {
        if angles.is_empty() {
            diag.warn(FieldPath::new(format!("camera_sets.{set}")), "camera set is empty");
        }
        for angle in angles {
            if !cameras.contains_key(angle) {
                diag.warn(
                    FieldPath::new(format!("camera_sets.{set}")),
                    format!("angle `{angle}` has no camera, it will be skipped"),
                );
            }
        }
    }
}
