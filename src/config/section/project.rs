//! `[project]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [project]
//! name = "phone-stand"    # Display name sent to viewers (default: root dir name)
//! build_dir = "build"     # Build output, screenshots, exports and cache record
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSectionConfig {
    pub name: Option<String>,

    /// Build directory (relative to project root, absolute after load).
    pub build_dir: PathBuf,
}

impl Default for ProjectSectionConfig {
    fn default() -> Self {
        Self {
            name: None,
            build_dir: PathBuf::from("build"),
        }
    }
}
