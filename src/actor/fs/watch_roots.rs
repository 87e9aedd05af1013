use std::path::PathBuf;

use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

/// Configured watch directories and which of them are attached.
///
/// A directory that is missing at startup, or deleted and recreated while
/// serving, is attached as soon as it exists.
pub(super) struct WatchRoots {
    desired: Vec<PathBuf>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            desired: paths,
            attached: FxHashSet::default(),
        }
    }

    pub(super) fn attach_existing(&mut self, watcher: &mut impl Watcher) -> notify::Result<()> {
        for path in &self.desired {
            if !path.exists() {
                crate::log!("watch"; "{} does not exist yet", path.display());
                continue;
            }
            watcher.watch(path, RecursiveMode::Recursive)?;
            self.attached.insert(path.clone());
        }
        Ok(())
    }

    pub(super) fn maintain(&mut self, watcher: &mut impl Watcher) {
        self.attached.retain(|path| path.exists());

        for path in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }
            if watcher.watch(path, RecursiveMode::Recursive).is_ok() {
                self.attached.insert(path.clone());
                crate::debug!("watch"; "attached {}", path.display());
            }
        }
    }

    #[cfg(test)]
    pub(super) fn is_attached(&self, path: &std::path::Path) -> bool {
        self.attached.contains(path)
    }
}
