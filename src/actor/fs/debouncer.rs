use std::path::{Path, PathBuf};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;

use super::types::ChangeKind;
use crate::utils::path::normalize_path;

/// Trailing-edge debouncer: one timer, restarted by every qualifying event.
///
/// An unbroken stream of events keeps postponing the trigger.
pub(super) struct Debouncer {
    interval: Duration,
    /// Path → ChangeKind (dedup is free via HashMap key uniqueness)
    pub(super) changes: FxHashMap<PathBuf, ChangeKind>,
    pub(super) last_event: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(interval: Duration) -> Self {
        Self {
            interval,
            changes: FxHashMap::default(),
            last_event: None,
        }
    }

    /// Record a notify event, keeping only paths `accept` allows.
    ///
    /// Dedup rules per path:
    /// - Removed → Created/Modified: restored, use the new kind
    /// - Modified → Removed: deleted, upgrade to Removed
    /// - otherwise the first kind wins
    ///
    /// Every accepted path restarts the timer, duplicates included.
    pub(super) fn add_event(&mut self, event: &notify::Event, accept: impl Fn(&Path) -> bool) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            EventKind::Modify(modify) => {
                // Metadata-only changes (mtime/atime/chmod) are noise
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
                ChangeKind::Modified
            }
            _ => return,
        };

        for path in &event.paths {
            if is_temp_file(path) || !accept(path) {
                continue;
            }

            let path = normalize_path(path);
            crate::debug!("watch"; "{} {}", kind.label(), path.display());

            match self.changes.get(&path).copied() {
                None => {
                    self.changes.insert(path, kind);
                }
                Some(ChangeKind::Removed) if kind != ChangeKind::Removed => {
                    self.changes.insert(path, kind);
                }
                Some(ChangeKind::Modified) if kind == ChangeKind::Removed => {
                    self.changes.insert(path, kind);
                }
                Some(_) => {}
            }
            self.last_event = Some(Instant::now());
        }
    }

    /// Take the pending changes once the quiet period has elapsed.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<(PathBuf, ChangeKind)>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;

        let mut changes: Vec<_> = std::mem::take(&mut self.changes).into_iter().collect();
        changes.sort();
        Some(changes)
    }

    pub(super) fn is_ready(&self) -> bool {
        self.last_event
            .is_some_and(|last| last.elapsed() >= self.interval && !self.changes.is_empty())
    }

    /// Sleep duration until the timer could fire.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };
        self.interval
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
}
