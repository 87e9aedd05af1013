//! Registry listing and config/registry cross-validation.
//!
//! The registry command prints the models the build actually produced:
//!
//! ```json
//! [{"name": "bracket", "type": "component", "stl": true}]
//! ```
//!
//! Validation is symmetric. A declared model the registry does not list is
//! `not_in_registry` and will not be rendered. A registry entry that is
//! neither a declared model nor a declared variant's file stem is
//! `not_in_config`.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProjectConfig;
use crate::debug;
use crate::utils::exec::Cmd;

/// Registry listing errors. Never fatal: the run continues with an empty registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry command failed: {0}")]
    Command(String),

    #[error("registry output is not a JSON array of {{name, type, stl}}: {0}")]
    Parse(#[from] serde_json::Error),
}

const fn default_stl() -> bool {
    true
}

/// One model as reported by the registry command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default = "default_stl")]
    pub stl: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationIssue {
    NotInRegistry,
    NotInConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub model: String,
    pub issue: ValidationIssue,
}

/// Outcome of one validation pass.
///
/// `valid_models` is a subset of the declared model names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub warnings: Vec<ValidationWarning>,
    pub valid_models: BTreeSet<String>,
}

impl ValidationResult {
    pub fn is_valid(&self, model: &str) -> bool {
        self.valid_models.contains(model)
    }
}

/// Run the registry command and parse its stdout.
pub async fn list_registry(config: &ProjectConfig) -> Result<Vec<RegistryEntry>, RegistryError> {
    let output = Cmd::from_slice(&config.build.registry)
        .cwd(&config.root)
        .run()
        .await
        .map_err(|e| RegistryError::Command(format!("{e:#}")))?;

    if !output.success() {
        return Err(RegistryError::Command(output.error_message()));
    }
    parse_registry(&output.stdout)
}

pub fn parse_registry(stdout: &str) -> Result<Vec<RegistryEntry>, RegistryError> {
    Ok(serde_json::from_str(stdout.trim())?)
}

/// Cross-check declared models against the registry.
///
/// Warnings are ordered: `not_in_registry` in config order, then
/// `not_in_config` in registry order (one per distinct name).
pub fn validate(config: &ProjectConfig, registry: &[RegistryEntry]) -> ValidationResult {
    let listed: FxHashSet<&str> = registry.iter().map(|e| e.name.as_str()).collect();
    let mut result = ValidationResult::default();

    for model in &config.models {
        if listed.contains(model.name.as_str()) {
            result.valid_models.insert(model.name.clone());
        } else {
            result.warnings.push(ValidationWarning {
                model: model.name.clone(),
                issue: ValidationIssue::NotInRegistry,
            });
        }
    }

    let known: FxHashSet<&str> = config
        .models
        .iter()
        .flat_map(|m| {
            std::iter::once(m.name.as_str()).chain(m.variants.iter().filter_map(|v| v.stem()))
        })
        .collect();

    let mut reported = FxHashSet::default();
    for entry in registry {
        if !known.contains(entry.name.as_str()) && reported.insert(entry.name.as_str()) {
            result.warnings.push(ValidationWarning {
                model: entry.name.clone(),
                issue: ValidationIssue::NotInConfig,
            });
        }
    }

    for entry in registry.iter().filter(|e| !e.stl) {
        if config.model(&entry.name).is_some_and(|m| m.stl) {
            debug!("validate"; "{} has stl = false in the registry but exports are enabled", entry.name);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    fn entry(name: &str) -> RegistryEntry {
        RegistryEntry {
            name: name.into(),
            kind: "component".into(),
            stl: true,
        }
    }

    const MODELS: &str = r#"
[[models]]
name = "bracket"
type = "component"
source = "build/bracket.scad"

[[models.variants]]
name = "open"
source = "build/bracket_open.scad"

[[models]]
name = "hinge"
type = "vitamin"
source = "build/hinge.scad"

[[models]]
name = "base"
type = "assembly"
source = "build/base.scad"
"#;

    #[test]
    fn test_parse_registry() {
        let parsed =
            parse_registry(r#"[{"name":"bracket","type":"component","stl":true}]"#).unwrap();
        assert_eq!(parsed, vec![entry("bracket")]);

        let lenient = parse_registry(r#"[{"name":"x"}]"#).unwrap();
        assert!(lenient[0].stl);

        assert!(matches!(
            parse_registry("Traceback (most recent call last)"),
            Err(RegistryError::Parse(_))
        ));
        assert!(parse_registry(r#"{"name":"x"}"#).is_err());
    }

    #[test]
    fn test_all_present() {
        let config = test_parse_config(MODELS);
        let result = validate(&config, &[entry("bracket"), entry("hinge"), entry("base")]);
        assert!(result.warnings.is_empty());
        assert_eq!(result.valid_models.len(), 3);
    }

    #[test]
    fn test_symmetric_checks() {
        let config = test_parse_config(MODELS);
        let registry = [
            entry("stray"),
            entry("bracket"),
            entry("bracket_open"),
            entry("stray"),
            entry("other"),
        ];
        let result = validate(&config, &registry);

        assert_eq!(
            result.valid_models.iter().collect::<Vec<_>>(),
            vec!["bracket"]
        );
        let warnings: Vec<_> = result
            .warnings
            .iter()
            .map(|w| (w.model.as_str(), w.issue))
            .collect();
        assert_eq!(
            warnings,
            vec![
                ("hinge", ValidationIssue::NotInRegistry),
                ("base", ValidationIssue::NotInRegistry),
                ("stray", ValidationIssue::NotInConfig),
                ("other", ValidationIssue::NotInConfig),
            ]
        );
    }

    #[test]
    fn test_empty_registry() {
        let config = test_parse_config(MODELS);
        let result = validate(&config, &[]);
        assert!(result.valid_models.is_empty());
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn test_result_json_shape() {
        let config = test_parse_config(MODELS);
        let result = validate(&config, &[entry("hinge"), entry("bracket")]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["valid_models"], serde_json::json!(["bracket", "hinge"]));
        assert_eq!(json["warnings"][0]["model"], "base");
        assert_eq!(json["warnings"][0]["issue"], "not_in_registry");
    }

    #[tokio::test]
    async fn test_list_registry_command() {
        let mut config = test_parse_config("");
        config.root = std::env::temp_dir();
        config.build.registry = vec![
            "sh".into(),
            "-c".into(),
            r#"echo '[{"name":"bracket","type":"component","stl":false}]'"#.into(),
        ];
        let registry = list_registry(&config).await.unwrap();
        assert_eq!(registry.len(), 1);
        assert!(!registry[0].stl);

        config.build.registry = vec!["sh".into(), "-c".into(), "echo oops >&2; exit 2".into()];
        let err = list_registry(&config).await.unwrap_err();
        assert!(matches!(err, RegistryError::Command(ref m) if m.contains("oops")));
    }
}
