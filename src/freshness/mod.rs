//! Freshness detection: content-hash (blake3) for sources, mtime for artifacts.

mod hash;
pub mod mtime;

pub use hash::{ContentHash, ModelHashes, model_hash, render_config_hash, source_hash};
pub use mtime::{get_mtime, mtime_ms};
