//! Path normalization utilities.
//!
//! - `normalize_path` - file system paths (canonicalize + fallback)
//! - `to_slash` - `/`-separated rendering for wire formats
//! - `relative_within` - strip a base dir, refusing paths that escape it

use std::path::{Component, Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Return as-is if already absolute
/// - Join with current directory if relative
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Render a relative path with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a `/`-separated relative path under `base`.
///
/// Returns `None` for absolute paths and for any `..` component, so the
/// result can never point outside `base`.
pub fn relative_within(base: &Path, rel: &str) -> Option<PathBuf> {
    let mut out = base.to_path_buf();
    for part in rel.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            part if part.contains('\\') || Path::new(part).is_absolute() => return None,
            part => out.push(part),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_absolute() {
        let path = Path::new("/absolute/path/file.txt");
        assert!(normalize_path(path).is_absolute());
    }

    #[test]
    fn test_normalize_path_relative() {
        let path = Path::new("relative/path/file.txt");
        assert!(normalize_path(path).is_absolute());
    }

    #[test]
    fn test_to_slash() {
        let path: PathBuf = ["screenshots", "component-bracket-iso.png"].iter().collect();
        assert_eq!(to_slash(&path), "screenshots/component-bracket-iso.png");
    }

    #[test]
    fn test_relative_within() {
        let base = Path::new("/proj/build");
        assert_eq!(
            relative_within(base, "/exports/bracket.stl"),
            Some(PathBuf::from("/proj/build/exports/bracket.stl"))
        );
        assert_eq!(relative_within(base, "exports/../../secret"), None);
        assert_eq!(relative_within(base, ".."), None);
        assert_eq!(relative_within(base, ""), Some(base.to_path_buf()));
    }
}
