//! Print the resolved project (`scadview check`).

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::config::{DEFAULT_SCALE, ProjectConfig};
use crate::log;

use super::build::warn_missing_programs;

/// Print models, groups and camera sets after defaults and validation.
///
/// Loading the config already failed on errors, so reaching this point
/// means the config is valid.
pub fn check(config: &ProjectConfig) -> Result<()> {
    log!("check"; "{} ({})", config.name().bold(), config.config_path.display());
    print!("{}", describe(config));
    warn_missing_programs(config);
    Ok(())
}

fn describe(config: &ProjectConfig) -> String {
    let mut out = String::new();
    let default_set = &config.render.camera_set;

    out.push_str("models:\n");
    for model in &config.models {
        let set = model.camera_set.as_deref().unwrap_or(default_set);
        let export = if model.stl { "" } else { ", no export" };
        out.push_str(&format!(
            "  {} [{}] {} (cameras: {set}{export})\n",
            model.name,
            model.category,
            config.root_relative(&model.source).display()
        ));
        for variant in &model.variants {
            let set = variant.camera_set.as_deref().unwrap_or(set);
            out.push_str(&format!(
                "    {} {} (cameras: {set})\n",
                variant.name,
                config.root_relative(&variant.source).display()
            ));
        }
    }

    if !config.groups.is_empty() {
        out.push_str("groups:\n");
        for group in &config.groups {
            out.push_str(&format!("  {}: {}\n", group.name, group.models.join(", ")));
        }
    }

    out.push_str("camera sets:\n");
    for (name, angles) in &config.camera_sets {
        let marker = if name == default_set { " (default)" } else { "" };
        out.push_str(&format!("  {name}{marker}: {}\n", angles.join(", ")));
    }

    let scales: Vec<_> = config.export.scales.iter().map(|s| format!("{s}%")).collect();
    out.push_str(&format!(
        "exports: {} at {} (default {DEFAULT_SCALE}%)\n",
        config.export.format,
        scales.join(", ")
    ));
    out
}
