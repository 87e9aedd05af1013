//! `[[models]]` and `[[groups]]` configuration.
//!
//! # Example
//!
//! ```toml
//! [[models]]
//! name = "phone-stand"
//! type = "assembly"                   # vitamin | vitamin_assembly | component | assembly
//! source = "build/phone-stand.scad"
//! camera_set = "standard"             # Optional, falls back to [render] camera_set
//! stl = true                          # Allow on-demand exports (default: true)
//! camera_distance = 220               # Optional, replaces the camera distance field
//!
//! [[models.variants]]
//! name = "folded"
//! source = "build/phone-stand_folded.scad"
//! camera_set = "closeup"
//!
//! [[groups]]
//! name = "Stand"
//! models = ["phone-stand", "stand-base"]
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Model category, used as the screenshot file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Vitamin,
    VitaminAssembly,
    Component,
    Assembly,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vitamin => "vitamin",
            Self::VitaminAssembly => "vitamin_assembly",
            Self::Component => "component",
            Self::Assembly => "assembly",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn default_stl() -> bool {
    true
}

/// A declared, renderable model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(rename = "type")]
    pub category: Category,
    /// Source file (relative to root in TOML, absolute after load).
    pub source: PathBuf,
    #[serde(default)]
    pub camera_set: Option<String>,
    #[serde(default = "default_stl")]
    pub stl: bool,
    #[serde(default)]
    pub camera_distance: Option<f64>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// Alternate renderable form of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub source: PathBuf,
    #[serde(default)]
    pub camera_set: Option<String>,
}

impl Variant {
    /// Registry name a build emits for this variant: its source file stem.
    pub fn stem(&self) -> Option<&str> {
        self.source.file_stem().and_then(|s| s.to_str())
    }
}

/// Named subset of models for UI grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGroup {
    pub name: String,
    #[serde(default)]
    pub models: Vec<String>,
}

impl Model {
    /// Resolve source paths against the project root.
    pub(in crate::config) fn normalize(&mut self, root: &Path) {
        self.source = root.join(&self.source);
        for variant in &mut self.variants {
            variant.source = root.join(&variant.source);
        }
    }
}

/// Validate model and group declarations.
pub fn validate_models(
    models: &[Model],
    groups: &[ProjectGroup],
    diag: &mut ConfigDiagnostics,
) {
    let mut names = FxHashSet::default();

    for (i, model) in models.iter().enumerate() {
        if model.name.trim().is_empty() {
            diag.error(FieldPath::model(i, "name"), "model name is empty");
        } else if model.name.contains(['/', '\\']) {
            diag.error(
                FieldPath::model(i, "name"),
                format!("model name `{}` must not contain path separators", model.name),
            );
        } else if !names.insert(model.name.as_str()) {
            diag.error(
                FieldPath::model(i, "name"),
                format!("duplicate model name `{}`", model.name),
            );
        }

        if let Some(distance) = model.camera_distance
            && !(distance.is_finite() && distance > 0.0)
        {
            diag.error(
                FieldPath::model(i, "camera_distance"),
                format!("camera distance must be a positive number, got {distance}"),
            );
        }

        let mut variant_names = FxHashSet::default();
        for (j, variant) in model.variants.iter().enumerate() {
            if variant.name.trim().is_empty() {
                diag.error(FieldPath::variant(i, j, "name"), "variant name is empty");
            } else if !variant_names.insert(variant.name.as_str()) {
                diag.error(
                    FieldPath::variant(i, j, "name"),
                    format!("duplicate variant `{}` in model `{}`", variant.name, model.name),
                );
            }
            if variant.stem().is_none() {
                diag.error(
                    FieldPath::variant(i, j, "source"),
                    "variant source must name a file",
                );
            }
        }
    }

    for (i, group) in groups.iter().enumerate() {
        for member in &group.models {
            if !names.contains(member.as_str()) {
                diag.error(
                    FieldPath::new(format!("groups[{i}].models")),
                    format!("group `{}` references unknown model `{member}`", group.name),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    const BRACKET: &str = r#"
[[models]]
name = "bracket"
type = "component"
source = "build/bracket.scad"
camera_distance = 200

[[models.variants]]
name = "open"
source = "build/bracket_open.scad"
"#;

    #[test]
    fn test_parse_model() {
        let config = test_parse_config(BRACKET);
        let model = &config.models[0];
        assert_eq!(model.category, Category::Component);
        assert!(model.stl);
        assert_eq!(model.camera_distance, Some(200.0));
        assert_eq!(model.variants[0].stem(), Some("bracket_open"));
    }

    #[test]
    fn test_category_names() {
        let config = test_parse_config(
            "[[models]]\nname = \"m3\"\ntype = \"vitamin_assembly\"\nsource = \"m3.scad\"",
        );
        assert_eq!(config.models[0].category.as_str(), "vitamin_assembly");
    }

    #[test]
    fn test_duplicate_names_and_unknown_group_member() {
        let mut config = test_parse_config(BRACKET);
        config.models.push(config.models[0].clone());
        let groups = vec![ProjectGroup {
            name: "Parts".into(),
            models: vec!["bracket".into(), "hinge".into()],
        }];

        let mut diag = ConfigDiagnostics::new();
        validate_models(&config.models, &groups, &mut diag);
        let messages: Vec<_> = diag.errors().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("duplicate model name"));
        assert!(messages[1].contains("unknown model `hinge`"));
    }

    #[test]
    fn test_non_positive_distance() {
        let mut config = test_parse_config(BRACKET);
        config.models[0].camera_distance = Some(-1.0);
        let mut diag = ConfigDiagnostics::new();
        validate_models(&config.models, &[], &mut diag);
        assert!(diag.has_errors());
    }
}
