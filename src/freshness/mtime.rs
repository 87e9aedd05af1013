//! Mtime helpers for generated artifacts.
//!
//! Sources are compared by content hash; artifacts and export inputs by
//! modification time, since only their recency matters to viewers.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the modification time of a file
///
/// Returns `None` if the file doesn't exist or mtime cannot be read
pub fn get_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// Milliseconds since the Unix epoch, as sent in `artifact_updated` events.
pub fn mtime_ms(path: &Path) -> Option<u64> {
    let modified = get_mtime(path)?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(since_epoch.as_millis()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        assert!(get_mtime(Path::new("/nonexistent/file.png")).is_none());
        assert!(mtime_ms(Path::new("/nonexistent/file.png")).is_none());
    }

    #[test]
    fn test_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"png").unwrap();
        assert!(mtime_ms(&path).unwrap() > 0);
    }
}
