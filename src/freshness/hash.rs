//! Content hashing using blake3.
//!
//! Three fingerprints decide how much of the pipeline has to run:
//!
//! | Hash                  | Inputs                                          | On change            |
//! |-----------------------|-------------------------------------------------|----------------------|
//! | `source_hash`         | config file + allow-listed files in watch dirs  | build + validate     |
//! | `render_config_hash`  | `[render]`, `[cameras]`, `[camera_sets]`        | re-render everything |
//! | `model_hash`          | model source + each variant source              | re-render that model |

use jwalk::WalkDir;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::config::{CameraSets, Cameras, Model, ProjectConfig, RenderConfig};
use crate::utils::path::to_slash;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    #[cfg(test)]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create a hash representing "no content" (all zeros).
    #[inline]
    pub const fn empty() -> Self {
        Self([0; 32])
    }

    /// Check if this is the empty/zero hash.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 32]
    }

    /// Convert to hex string.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    fn from_hasher(hasher: &blake3::Hasher) -> Self {
        Self(*hasher.finalize().as_bytes())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 16 hex chars are enough for logs
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("expected 64 hex characters"))
    }
}

/// Per-model fingerprint: own source plus one hash per variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHashes {
    pub hash: ContentHash,
    #[serde(default)]
    pub variants: BTreeMap<String, ContentHash>,
}

/// Compute blake3 hash of file contents.
///
/// Missing or unreadable files hash to [`ContentHash::empty`].
pub fn compute_file_hash(path: &Path) -> ContentHash {
    let Ok(file) = File::open(path) else {
        return ContentHash::empty();
    };

    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return ContentHash::empty(),
        }
    }

    ContentHash::from_hasher(&hasher)
}

/// Fingerprint of everything a build reads.
///
/// Config file bytes, then for each watch directory (in configured order)
/// every allow-listed file in sorted path order, each contributing its
/// root-relative path and its content.
pub fn source_hash(config: &ProjectConfig) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(compute_file_hash(&config.config_path).as_bytes());

    for dir in &config.watch.paths {
        for path in watched_files(config, dir) {
            let rel = to_slash(&config.root_relative(&path));
            hasher.update(rel.as_bytes());
            hasher.update(&[0]);
            hasher.update(compute_file_hash(&path).as_bytes());
        }
    }

    ContentHash::from_hasher(&hasher)
}

/// Allow-listed files under `dir`, sorted.
fn watched_files(config: &ProjectConfig, dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<_> = WalkDir::new(dir)
        .skip_hidden(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .filter(|p| config.watch.is_watched_file(p))
        .collect();
    files.sort();
    files
}

#[derive(Serialize)]
struct RenderInputs<'a> {
    render: &'a RenderConfig,
    cameras: &'a Cameras,
    camera_sets: &'a CameraSets,
}

/// Fingerprint of every setting that changes how a screenshot looks.
pub fn render_config_hash(config: &ProjectConfig) -> ContentHash {
    let inputs = RenderInputs {
        render: &config.render,
        cameras: &config.cameras,
        camera_sets: &config.camera_sets,
    };
    let mut hasher = blake3::Hasher::new();
    match serde_json::to_writer(&mut hasher, &inputs) {
        Ok(()) => ContentHash::from_hasher(&hasher),
        Err(_) => ContentHash::empty(),
    }
}

/// Fingerprint of one model's sources.
pub fn model_hash(model: &Model) -> ModelHashes {
    ModelHashes {
        hash: compute_file_hash(&model.source),
        variants: model
            .variants
            .iter()
            .map(|v| (v.name.clone(), compute_file_hash(&v.source)))
            .collect(),
    }
}
