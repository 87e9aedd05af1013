//! `[watch]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [watch]
//! paths = ["src"]                # Directories watched recursively (relative to root)
//! extensions = ["py", "scad"]    # Only these extensions trigger a run
//! debounce_ms = 500              # Quiet period before a run is triggered
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub paths: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("src")],
            extensions: vec!["py".to_string(), "scad".to_string()],
            debounce_ms: 500,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Check whether a path carries an allow-listed extension.
    pub fn is_watched_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }

    /// Strip leading dots so `".py"` and `"py"` are equivalent.
    pub(in crate::config) fn apply_defaults(&mut self) {
        for ext in &mut self.extensions {
            *ext = ext.trim_start_matches('.').to_string();
        }
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.extensions.is_empty() {
            diag.warn(
                FieldPath::new("watch.extensions"),
                "no extensions listed, file changes will never trigger a run",
            );
        }
        for path in &self.paths {
            if !path.exists() {
                diag.warn(
                    FieldPath::new("watch.paths"),
                    format!("`{}` does not exist", path.display()),
                );
            }
        }
    }
}
