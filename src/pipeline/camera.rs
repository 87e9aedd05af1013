//! Camera set and camera string resolution.
//!
//! Set name: own reference → `[render] camera_set` → `"standard"`. An
//! unknown set degrades to the single angle `"iso"`; a missing camera only
//! drops the job that needed it.

use crate::config::{CAMERA_FIELDS, ProjectConfig};

/// Set name used when neither the model nor the config names one.
pub const FALLBACK_SET: &str = "standard";

/// Angle used when the resolved set does not exist.
pub const FALLBACK_ANGLE: &str = "iso";

/// Pick the camera set name for a model or variant.
///
/// `refs` are the candidates in priority order (variant, then model).
pub fn resolve_set_name<'a>(config: &'a ProjectConfig, refs: &[Option<&'a str>]) -> &'a str {
    refs.iter()
        .flatten()
        .copied()
        .chain(std::iter::once(config.render.camera_set.as_str()))
        .find(|name| !name.is_empty())
        .unwrap_or(FALLBACK_SET)
}

/// Angle names of a camera set.
///
/// Returns `Err` with the fallback angles when the set is unknown, so
/// callers can warn and carry on.
pub fn resolve_angles(config: &ProjectConfig, set: &str) -> Result<Vec<String>, Vec<String>> {
    config
        .camera_sets
        .get(set)
        .cloned()
        .ok_or_else(|| vec![FALLBACK_ANGLE.to_string()])
}

/// Camera string for `angle`, with the distance override applied.
pub fn camera_for(config: &ProjectConfig, angle: &str, distance: Option<f64>) -> Option<String> {
    let camera = config.cameras.get(angle)?;
    Some(match distance {
        Some(d) => apply_distance(camera, d),
        None => camera.clone(),
    })
}

/// Replace exactly the 7th comma-separated field of a camera string.
///
/// Strings without seven fields are returned unchanged.
pub fn apply_distance(camera: &str, distance: f64) -> String {
    let fields: Vec<&str> = camera.split(',').collect();
    if fields.len() != CAMERA_FIELDS {
        return camera.to_string();
    }
    let head = &fields[..CAMERA_FIELDS - 1];
    format!("{},{distance}", head.join(","))
}
