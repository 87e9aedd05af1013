//! Pipeline cache record persistence.
//!
//! ```json
//! {
//!   "sourceHash": "…",
//!   "renderConfigHash": "…",
//!   "validation": { "warnings": [], "valid_models": ["bracket"] },
//!   "models": { "bracket": { "hash": "…", "variants": { "open": "…" } } }
//! }
//! ```
//!
//! Persistence is best-effort. A missing or corrupt record restores as
//! `None` (full build and render). Writes go through a temp file in the
//! same directory and a rename, so a failed write leaves the previous
//! record intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::freshness::{ContentHash, ModelHashes};
use crate::pipeline::ValidationResult;
use crate::{debug, log};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCache {
    pub source_hash: ContentHash,
    pub render_config_hash: ContentHash,
    #[serde(default)]
    pub validation: ValidationResult,
    #[serde(default)]
    pub models: BTreeMap<String, ModelHashes>,
}

impl PipelineCache {
    /// Read the cache record; any failure is treated as "no prior cache".
    pub fn restore(path: &Path) -> Option<Self> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("cache"; "no cache record at {}", path.display());
                return None;
            }
            Err(e) => {
                log!("cache"; "failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&json) {
            Ok(cache) => Some(cache),
            Err(e) => {
                log!("cache"; "ignoring corrupt cache record: {}", e);
                None
            }
        }
    }

    /// Atomically replace the cache record.
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!("cache"; "saved {} model hashes", self.models.len());
        Ok(())
    }

    pub fn model(&self, name: &str) -> Option<&ModelHashes> {
        self.models.get(name)
    }
}
