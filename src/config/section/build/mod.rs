//! `[build]` section configuration.
//!
//! External commands that produce the renderable sources.
//!
//! # Example
//!
//! ```toml
//! [build]
//! command = ["python", "-m", "src", "--render"]   # Writes build/*.scad
//! registry = ["python", "-m", "src", "--list"]    # Prints [{name, type, stl}] as JSON
//! ```
//!
//! Both commands run from the project root. They are required: a config
//! without them fails to load.

use crate::config::{ConfigDiagnostics, FieldPath};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSectionConfig {
    /// Build command (program followed by arguments).
    pub command: Vec<String>,

    /// Registry listing command; stdout must be a JSON array.
    pub registry: Vec<String>,
}

impl BuildSectionConfig {
    /// Human-readable command line for `build_start` events.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.command.first().is_none_or(|p| p.trim().is_empty()) {
            diag.error_with_hint(
                FieldPath::new("build.command"),
                "build command is required",
                "command = [\"python\", \"-m\", \"src\", \"--render\"]",
            );
        }
        if self.registry.first().is_none_or(|p| p.trim().is_empty()) {
            diag.error_with_hint(
                FieldPath::new("build.registry"),
                "registry command is required",
                "registry = [\"python\", \"-m\", \"src\", \"--list\"]",
            );
        }
    }
}
