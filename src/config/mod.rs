//! Project configuration management for `scadview.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── build/     # [build]
//! │   ├── export     # [export]
//! │   ├── model      # [[models]], [[groups]]
//! │   ├── project    # [project]
//! │   ├── render     # [render], [cameras], [camera_sets]
//! │   ├── serve      # [serve]
//! │   └── watch      # [watch]
//! ├── types/         # Utility types
//! │   ├── error      # ConfigError, ConfigDiagnostics
//! │   └── field      # FieldPath
//! └── mod.rs         # ProjectConfig (this file)
//! ```
//!
//! The config is loaded once, defaults are applied and paths are made
//! absolute before validation. After that it is shared read-only behind an
//! `Arc` and never mutated.

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

pub use section::{
    BuildSectionConfig, CAMERA_FIELDS, CameraSets, Cameras, Category, DEFAULT_SCALE,
    ExportConfig, Model, ProjectGroup, ProjectSectionConfig, RenderConfig, ServeConfig,
    WatchConfig,
};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use crate::cli::{Cli, Commands};
use crate::log;
use crate::utils::path::normalize_path;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the persisted pipeline cache record inside the build dir.
pub const CACHE_FILE: &str = ".scadview-cache.json";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing scadview.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub project: ProjectSectionConfig,

    #[serde(default)]
    pub build: BuildSectionConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    #[serde(default)]
    pub cameras: Cameras,

    #[serde(default)]
    pub camera_sets: CameraSets,

    #[serde(default)]
    pub models: Vec<Model>,

    #[serde(default)]
    pub groups: Vec<ProjectGroup>,
}

impl ProjectConfig {
    /// Load configuration for a CLI invocation.
    ///
    /// Searches upward from cwd for the config file; the project root is the
    /// directory containing it.
    pub fn load(cli: &Cli) -> Result<Self> {
        let Some(path) = find_config_file(&cli.config) else {
            return Err(ConfigError::Validation(format!(
                "config file '{}' not found in this directory or any parent",
                cli.config.display()
            ))
            .into());
        };

        let mut config = Self::from_path(&path)?;
        config.apply_command_options(cli);
        Ok(config)
    }

    /// Read, default, normalize and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (mut config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        config.config_path = normalize_path(path);
        let root = config
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        config.apply_defaults();
        config.normalize_paths(&root);
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {field}");
        }
    }

    /// Fill in values that depend on other sections being absent.
    fn apply_defaults(&mut self) {
        if self.cameras.is_empty() {
            self.cameras = section::default_cameras();
        }
        if self.camera_sets.is_empty() {
            self.camera_sets = section::default_camera_sets();
        }
        self.export.apply_defaults();
        self.watch.apply_defaults();
    }

    /// Make every configured path absolute.
    fn normalize_paths(&mut self, root: &Path) {
        let root = normalize_path(root);
        self.project.build_dir = normalize_path(&root.join(&self.project.build_dir));
        self.watch.paths = self
            .watch
            .paths
            .iter()
            .map(|p| normalize_path(&root.join(p)))
            .collect();
        for model in &mut self.models {
            model.normalize(&root);
        }
        self.root = root;
    }

    /// Apply command-specific configuration options.
    fn apply_command_options(&mut self, cli: &Cli) {
        if let Commands::Serve {
            interface,
            port,
            ws_port,
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.ws_port, ws_port.as_ref());
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // accessors
    // ========================================================================

    /// Display name: `[project] name`, or the root directory name.
    pub fn name(&self) -> String {
        self.project.name.clone().unwrap_or_else(|| {
            self.root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    /// Get path relative to the project root
    pub fn root_relative(&self, path: impl AsRef<Path>) -> PathBuf {
        path.as_ref()
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.as_ref().to_path_buf())
    }

    pub fn build_dir(&self) -> &Path {
        &self.project.build_dir
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.project.build_dir.join("screenshots")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.project.build_dir.join("exports")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.project.build_dir.join(CACHE_FILE)
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate the whole configuration.
    ///
    /// Collects all errors and returns them at once; warnings are printed.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        self.build.validate(&mut diag);
        self.render.validate(&mut diag);
        self.export.validate(&mut diag);
        self.watch.validate(&mut diag);
        section::validate_cameras(&self.cameras, &self.camera_sets, &mut diag);
        section::validate_models(&self.models, &self.groups, &mut diag);
        self.validate_camera_set_refs(&mut diag);

        diag.print_warnings();
        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }

    /// Unknown camera set references degrade to a single `iso` angle at render time.
    fn validate_camera_set_refs(&self, diag: &mut ConfigDiagnostics) {
        if !self.camera_sets.contains_key(&self.render.camera_set) {
            diag.warn(
                FieldPath::new("render.camera_set"),
                format!("unknown camera set `{}`", self.render.camera_set),
            );
        }
        for (i, model) in self.models.iter().enumerate() {
            if let Some(set) = &model.camera_set
                && !self.camera_sets.contains_key(set)
            {
                diag.warn(
                    FieldPath::model(i, "camera_set"),
                    format!("unknown camera set `{set}`"),
                );
            }
            for (j, variant) in model.variants.iter().enumerate() {
                if let Some(set) = &variant.camera_set
                    && !self.camera_sets.contains_key(set)
                {
                    diag.warn(
                        FieldPath::variant(i, j, "camera_set"),
                        format!("unknown camera set `{set}`"),
                    );
                }
            }
        }
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config with a minimal `[build]` section prepended.
/// Panics if there are unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(extra: &str) -> ProjectConfig {
    let config =
        format!("[build]\ncommand = [\"true\"]\nregistry = [\"echo\", \"[]\"]\n{extra}");
    let (mut parsed, ignored) = ProjectConfig::parse_with_ignored(&config).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed.apply_defaults();
    parsed
}

/// Write `content` as `scadview.toml` into a fresh project dir and load it.
#[cfg(test)]
pub fn test_project(content: &str) -> (tempfile::TempDir, ProjectConfig) {
    let dir = tempfile::TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    let path = dir.path().join("scadview.toml");
    fs::write(&path, content).unwrap();
    let config = ProjectConfig::from_path(&path).unwrap();
    (dir, config)
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_invalid_toml() {
        let result: Result<ProjectConfig, _> = toml::from_str("[build\ncommand = [\"x\"]");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[build]\ncommand = [\"true\"]\nregistry = [\"true\"]\n[unknown_section]\nfield = 1";
        let (config, ignored) = ProjectConfig::parse_with_ignored(content).unwrap();
        assert_eq!(config.build.command, vec!["true".to_string()]);
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }

    #[test]
    fn test_load_normalizes_paths() {
        let (dir, config) = test_project(
            r#"
[build]
command = ["true"]
registry = ["echo", "[]"]

[[models]]
name = "bracket"
type = "component"
source = "build/bracket.scad"
"#,
        );
        let root = normalize_path(dir.path());
        assert_eq!(config.root, root);
        assert_eq!(config.build_dir(), root.join("build"));
        assert_eq!(config.models[0].source, root.join("build/bracket.scad"));
        assert_eq!(config.watch.paths, vec![root.join("src")]);
        assert_eq!(config.cache_path(), root.join("build").join(CACHE_FILE));
        assert_eq!(config.root_relative(root.join("src/a.py")), Path::new("src/a.py"));
    }

    #[test]
    fn test_missing_build_section_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scadview.toml");
        fs::write(&path, "[render]\nfacets = 32\n").unwrap();

        let err = ProjectConfig::from_path(&path).unwrap_err();
        let diag = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(diag, ConfigError::Diagnostics(d) if d.errors().len() == 2));
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ProjectConfig::from_path(&dir.path().join("scadview.toml")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Io(..))
        ));
    }

    #[test]
    fn test_name_falls_back_to_root_dir() {
        let mut config = test_parse_config("");
        config.root = PathBuf::from("/projects/phone-stand");
        assert_eq!(config.name(), "phone-stand");
        config.project.name = Some("Stand".into());
        assert_eq!(config.name(), "Stand");
    }
}
