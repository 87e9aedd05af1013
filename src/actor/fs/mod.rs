//! FileSystem Actor
//!
//! Watches the configured source directories and asks the PipelineActor for
//! a run once changes to allow-listed files have settled.
//!
//! ```text
//! notify → Debouncer (extension filter + trailing-edge timer) → PipelineMsg::Run
//! ```

use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use super::messages::PipelineMsg;
use crate::config::ProjectConfig;
use crate::pipeline::RunRequest;

// Trailing-edge timing and per-path dedup.
mod debouncer;
// Shared fs event types.
mod types;
// Watch root attach/re-attach lifecycle.
mod watch_roots;


use debouncer::Debouncer;
use types::ChangeKind;
use watch_roots::WatchRoots;

/// How often missing or deleted watch roots are looked for again.
const ROOT_CHECK: Duration = Duration::from_secs(1);

/// FileSystem Actor - watches for source changes
pub struct FsActor {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    watch_roots: WatchRoots,
    pipeline_tx: mpsc::Sender<PipelineMsg>,
    debouncer: Debouncer,
    config: Arc<ProjectConfig>,
}

impl FsActor {
    /// Start watching immediately.
    ///
    /// Events buffer in the notify channel while the initial run is in
    /// progress, so nothing between startup and `run()` is lost.
    pub fn new(
        pipeline_tx: mpsc::Sender<PipelineMsg>,
        config: Arc<ProjectConfig>,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut watch_roots = WatchRoots::new(config.watch.paths.clone());
        watch_roots.attach_existing(&mut watcher)?;

        Ok(Self {
            notify_rx,
            watcher,
            watch_roots,
            pipeline_tx,
            debouncer: Debouncer::new(config.watch.debounce()),
            config,
        })
    }

    /// Run the actor event loop
    pub async fn run(self) {
        let Self {
            notify_rx,
            mut watcher,
            mut watch_roots,
            pipeline_tx,
            mut debouncer,
            config,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        // notify is sync; bridge its channel into the runtime
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        let mut root_check = tokio::time::interval(ROOT_CHECK);
        root_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                event = async_rx.recv() => match event {
                    Some(event) => debouncer.add_event(&event, |p| config.watch.is_watched_file(p)),
                    None => break,
                },
                _ = root_check.tick() => watch_roots.maintain(&mut watcher),
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    let Some(changes) = debouncer.take_if_ready() else {
                        continue;
                    };
                    log_changes(&config, &changes);
                    if pipeline_tx.send(PipelineMsg::Run(RunRequest::changed())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

fn log_changes(config: &ProjectConfig, changes: &[(std::path::PathBuf, ChangeKind)]) {
    match changes {
        [(path, kind)] => {
            crate::log!("watch"; "{} {}", kind.label(), config.root_relative(path).display());
        }
        _ => crate::log!("watch"; "{} files changed", changes.len()),
    }
}
