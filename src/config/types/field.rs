//! Config field path used in diagnostics.

use owo_colors::OwoColorize;
use std::fmt;

/// Dot-separated path to a config field, e.g. `render.image_size` or
/// `models[2].camera_set`.
///
/// Model and variant entries are array elements, so paths are built at
/// runtime rather than being `&'static str`.
///
/// # Example
///
/// ```ignore
/// diag.error(FieldPath::model(3, "name"), "duplicate model name");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    #[inline]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Path to a field of the `index`-th `[[models]]` entry.
    pub fn model(index: usize, field: &str) -> Self {
        Self(format!("models[{index}].{field}"))
    }

    /// Path to a field of a variant inside a `[[models]]` entry.
    pub fn variant(model: usize, variant: usize, field: &str) -> Self {
        Self(format!("models[{model}].variants[{variant}].{field}"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_args!("`{}`", self.0).bright_blue())
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
