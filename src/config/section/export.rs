//! `[export]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [export]
//! command = ["openscad"]    # Export tool
//! format = "stl"            # Output extension
//! facets = 128              # -D $fn=N
//! scales = [100, 50, 25]    # Percent scales viewers may request
//! ```

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Scale (in percent) that exports the source unchanged.
pub const DEFAULT_SCALE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub command: Vec<String>,
    pub format: String,
    pub facets: u32,
    pub scales: Vec<u32>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            command: vec!["openscad".to_string()],
            format: "stl".to_string(),
            facets: 128,
            scales: vec![DEFAULT_SCALE, 50, 25],
        }
    }
}

impl ExportConfig {
    /// Ensure the unscaled export is always allowed, drop duplicates.
    pub(in crate::config) fn apply_defaults(&mut self) {
        if !self.scales.contains(&DEFAULT_SCALE) {
            self.scales.insert(0, DEFAULT_SCALE);
        }
        let mut seen = Vec::with_capacity(self.scales.len());
        self.scales.retain(|s| {
            let fresh = !seen.contains(s);
            seen.push(*s);
            fresh
        });
    }

    pub fn allows_scale(&self, scale: u32) -> bool {
        self.scales.contains(&scale)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.command.first().is_none_or(|p| p.trim().is_empty()) {
            diag.error(FieldPath::new("export.command"), "export command is empty");
        }
        if self.format.is_empty() || self.format.contains(['/', '\\', '.']) {
            diag.error_with_hint(
                FieldPath::new("export.format"),
                format!("invalid export format `{}`", self.format),
                "use a bare extension such as \"stl\" or \"3mf\"",
            );
        }
        if self.scales.contains(&0) {
            diag.error(FieldPath::new("export.scales"), "scales must be positive percentages");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_default_scale_always_allowed() {
        let config = test_parse_config("[export]\nscales = [50, 50, 200]");
        assert_eq!(config.export.scales, vec![100, 50, 200]);
        assert!(config.export.allows_scale(100));
        assert!(!config.export.allows_scale(25));
    }

    #[test]
    fn test_invalid_format() {
        let export = ExportConfig {
            format: "../stl".into(),
            ..Default::default()
        };
        let mut diag = ConfigDiagnostics::new();
        export.validate(&mut diag);
        assert!(diag.has_errors());
    }
}
