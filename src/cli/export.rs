//! One-shot export (`scadview export MODEL --scale N`).

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::ProjectConfig;
use crate::export::ExportGenerator;
use crate::log;

/// Export one model and print the artifact path.
///
/// Uses the sources as they are on disk; run `scadview build` first when
/// they are generated.
pub fn export(config: Arc<ProjectConfig>, model: &str, scale: u32) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    // Nobody listens for export_ready here; the path is printed instead
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let exports = ExportGenerator::new(Arc::clone(&config), events_tx);

    let path = rt.block_on(exports.request(model, Some(scale)))?;
    log!("export"; "{}", config.root_relative(&path).display());
    Ok(())
}
