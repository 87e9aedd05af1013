//! Artifact naming and on-disk discovery.
//!
//! ```text
//! {build_dir}/
//! ├── screenshots/
//! │   ├── component-bracket-iso.png         # {category}-{model}-{angle}.png
//! │   └── component-bracket-open_iso.png    # variant angle: {variant}_{camera}
//! └── exports/
//!     ├── bracket.stl                       # scale 100
//!     └── bracket-50pct.stl                 # {model}-{scale}pct.{ext}
//! ```
//!
//! Paths in events are relative to the build dir and `/`-separated.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Category, DEFAULT_SCALE, Model, ProjectConfig};
use crate::freshness::mtime_ms;
use crate::reload::message::Event;
use crate::utils::path::to_slash;

pub fn screenshot_name(category: Category, model: &str, angle: &str) -> String {
    format!("{category}-{model}-{angle}.png")
}

pub fn screenshot_path(config: &ProjectConfig, category: Category, model: &str, angle: &str) -> PathBuf {
    config
        .screenshots_dir()
        .join(screenshot_name(category, model, angle))
}

pub fn export_name(model: &str, scale: u32, ext: &str) -> String {
    if scale == DEFAULT_SCALE {
        format!("{model}.{ext}")
    } else {
        format!("{model}-{scale}pct.{ext}")
    }
}

pub fn export_path(config: &ProjectConfig, model: &str, scale: u32) -> PathBuf {
    config
        .exports_dir()
        .join(export_name(model, scale, &config.export.format))
}

/// Path relative to the build dir, as sent to viewers.
pub fn build_relative(config: &ProjectConfig, path: &Path) -> String {
    let rel = path.strip_prefix(config.build_dir()).unwrap_or(path);
    to_slash(rel)
}

/// Events describing every artifact currently on disk.
///
/// Screenshots first (`artifact_updated`), then exports (`export_ready`),
/// each sorted by file name.
pub fn snapshot(config: &ProjectConfig) -> Vec<Event> {
    let mut events = scan_screenshots(config);
    events.extend(scan_exports(config));
    events
}

fn sorted_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<_> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| Some((e.file_name().into_string().ok()?, e.path())))
        .collect();
    files.sort();
    files
}

fn scan_screenshots(config: &ProjectConfig) -> Vec<Event> {
    sorted_files(&config.screenshots_dir())
        .into_iter()
        .filter_map(|(name, path)| {
            let stem = name.strip_suffix(".png")?;
            let (model, angle) = parse_screenshot(&config.models, stem)?;
            Some(Event::ArtifactUpdated {
                model: model.to_string(),
                angle: angle.to_string(),
                path: build_relative(config, &path),
                mtime: mtime_ms(&path)?,
            })
        })
        .collect()
}

/// Split `{category}-{model}-{angle}`, preferring the longest model name.
fn parse_screenshot<'a>(models: &'a [Model], stem: &'a str) -> Option<(&'a str, &'a str)> {
    models
        .iter()
        .filter_map(|m| {
            let rest = stem
                .strip_prefix(m.category.as_str())?
                .strip_prefix('-')?
                .strip_prefix(m.name.as_str())?
                .strip_prefix('-')?;
            (!rest.is_empty()).then_some((m.name.as_str(), rest))
        })
        .max_by_key(|(name, _)| name.len())
}

fn scan_exports(config: &ProjectConfig) -> Vec<Event> {
    let suffix = format!(".{}", config.export.format);
    sorted_files(&config.exports_dir())
        .into_iter()
        .filter_map(|(name, path)| {
            let stem = name.strip_suffix(&suffix)?;
            let (model, scale) = parse_export(config, stem)?;
            Some(Event::ExportReady {
                model,
                scale,
                path: build_relative(config, &path),
            })
        })
        .collect()
}

fn parse_export(config: &ProjectConfig, stem: &str) -> Option<(String, u32)> {
    if let Some((model, tail)) = stem.rsplit_once('-')
        && let Some(Ok(scale)) = tail.strip_suffix("pct").map(str::parse::<u32>)
        && config.model(model).is_some()
    {
        return Some((model.to_string(), scale));
    }
    config
        .model(stem)
        .map(|m| (m.name.clone(), DEFAULT_SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_project;

    const PROJECT: &str = r#"
[build]
command = ["true"]
registry = ["echo", "[]"]

[[models]]
name = "phone"
type = "component"
source = "build/phone.scad"

[[models]]
name = "phone-stand"
type = "component"
source = "build/phone-stand.scad"
"#;

    #[test]
    fn test_names() {
        assert_eq!(
            screenshot_name(Category::VitaminAssembly, "m3", "open_iso"),
            "vitamin_assembly-m3-open_iso.png"
        );
        assert_eq!(export_name("bracket", 100, "stl"), "bracket.stl");
        assert_eq!(export_name("bracket", 50, "stl"), "bracket-50pct.stl");
    }

    #[test]
    fn test_build_relative() {
        let (_dir, config) = test_project(PROJECT);
        let path = screenshot_path(&config, Category::Component, "phone", "iso");
        assert_eq!(build_relative(&config, &path), "screenshots/component-phone-iso.png");
        assert_eq!(
            build_relative(&config, &export_path(&config, "phone", 25)),
            "exports/phone-25pct.stl"
        );
    }

    #[test]
    fn test_snapshot_scans_disk() {
        let (_dir, config) = test_project(PROJECT);
        fs::create_dir_all(config.screenshots_dir()).unwrap();
        fs::create_dir_all(config.exports_dir()).unwrap();
        for name in [
            "component-phone-stand-iso.png",
            "component-phone-front.png",
            "assembly-unknown-iso.png",
            "notes.txt",
        ] {
            fs::write(config.screenshots_dir().join(name), b"png").unwrap();
        }
        for name in ["phone.stl", "phone-stand-50pct.stl", "wrapper.scad"] {
            fs::write(config.exports_dir().join(name), b"solid").unwrap();
        }

        let events = snapshot(&config);
        let summary: Vec<_> = events
            .iter()
            .map(|e| match e {
                Event::ArtifactUpdated { model, angle, .. } => format!("shot {model} {angle}"),
                Event::ExportReady { model, scale, .. } => format!("export {model} {scale}"),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                "shot phone front",
                "shot phone-stand iso",
                "export phone-stand 50",
                "export phone 100",
            ]
        );
    }

    #[test]
    fn test_snapshot_without_build_dir() {
        let (_dir, config) = test_project(PROJECT);
        assert!(snapshot(&config).is_empty());
    }
}
