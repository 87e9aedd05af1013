//! On-demand model exports with request coalescing.
//!
//! Exports are keyed by `(model, scale)`:
//!
//! - **Cached**: the last export of the key is reused while its source mtime
//!   is unchanged and the file still exists.
//! - **In flight**: later requests for the key wait on the running export.
//! - **Fresh**: otherwise the export tool runs once; every waiter receives
//!   the same result.
//!
//! A failed export is not cached. The next request for the key starts a new
//! attempt.
//!
//! Scaled exports render a transient wrapper source next to the outputs:
//!
//! ```text
//! scale([0.5, 0.5, 0.5]) { include </abs/path/model.scad> }
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::artifact;
use crate::config::{DEFAULT_SCALE, Model, ProjectConfig};
use crate::freshness::get_mtime;
use crate::pipeline::EventTx;
use crate::reload::message::Event;
use crate::utils::exec::Cmd;
use crate::{debug, log};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("unknown model `{0}`")]
    UnknownModel(String),

    #[error("exports are disabled for `{0}` (stl = false)")]
    ExportDisabled(String),

    #[error("scale {scale}% is not one of {allowed:?}")]
    UnsupportedScale { scale: u32, allowed: Vec<u32> },

    #[error("export failed: {0}")]
    Generation(String),
}

type ExportKey = (String, u32);
type ExportResult = Result<PathBuf, ExportError>;
type Waiter = oneshot::Sender<ExportResult>;

#[derive(Debug, Clone)]
struct CachedExport {
    path: PathBuf,
    source_mtime: Option<SystemTime>,
}

/// Coalescing export front-end shared by every request source.
pub struct ExportGenerator {
    config: Arc<ProjectConfig>,
    events: EventTx,
    /// Keys being generated → requests waiting on them
    in_flight: DashMap<ExportKey, Vec<Waiter>>,
    /// Last successful export per key
    cache: DashMap<ExportKey, CachedExport>,
}

/// Releases the in-flight slot; waiters left in it see the owner vanish.
///
/// After [`finish`](Self::finish) the key may already belong to a new owner,
/// so `Drop` only clears the slot of a cancelled export.
struct SlotGuard<'a> {
    in_flight: &'a DashMap<ExportKey, Vec<Waiter>>,
    key: &'a ExportKey,
    finished: bool,
}

impl<'a> SlotGuard<'a> {
    fn new(in_flight: &'a DashMap<ExportKey, Vec<Waiter>>, key: &'a ExportKey) -> Self {
        Self {
            in_flight,
            key,
            finished: false,
        }
    }

    fn finish(&mut self, result: &ExportResult) {
        self.finished = true;
        if let Some((_, waiters)) = self.in_flight.remove(self.key) {
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.in_flight.remove(self.key);
        }
    }
}

enum Slot {
    Cached(PathBuf),
    Wait(oneshot::Receiver<ExportResult>),
    Owner,
}

impl ExportGenerator {
    pub fn new(config: Arc<ProjectConfig>, events: EventTx) -> Self {
        Self {
            config,
            events,
            in_flight: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Export `model` at `scale` percent (default 100).
    ///
    /// Rejections (unknown model, `stl = false`, disallowed scale) happen
    /// before any process is spawned.
    pub async fn request(&self, model: &str, scale: Option<u32>) -> ExportResult {
        let scale = scale.unwrap_or(DEFAULT_SCALE);
        let model = self.check(model, scale)?;
        let key = (model.name.clone(), scale);
        let source_mtime = get_mtime(&model.source);

        match self.claim(&key, source_mtime) {
            Slot::Cached(path) => {
                debug!("export"; "{} at {}% is up to date", model.name, scale);
                self.announce(model, scale, &path);
                Ok(path)
            }
            Slot::Wait(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ExportError::Generation("export was abandoned".into()))),
            Slot::Owner => {
                let mut guard = SlotGuard::new(&self.in_flight, &key);
                let result = self.generate(model, scale).await;
                match &result {
                    Ok(path) => {
                        self.cache.insert(
                            key.clone(),
                            CachedExport {
                                path: path.clone(),
                                source_mtime,
                            },
                        );
                        self.announce(model, scale, path);
                    }
                    Err(e) => log!("export"; "{}: {}", model.name, e),
                }
                guard.finish(&result);
                result
            }
        }
    }

    fn announce(&self, model: &Model, scale: u32, path: &Path) {
        let _ = self.events.send(Event::ExportReady {
            model: model.name.clone(),
            scale,
            path: artifact::build_relative(&self.config, path),
        });
    }

    fn check(&self, name: &str, scale: u32) -> Result<&Model, ExportError> {
        let model = self
            .config
            .model(name)
            .ok_or_else(|| ExportError::UnknownModel(name.to_string()))?;
        if !model.stl {
            return Err(ExportError::ExportDisabled(name.to_string()));
        }
        if !self.config.export.allows_scale(scale) {
            return Err(ExportError::UnsupportedScale {
                scale,
                allowed: self.config.export.scales.clone(),
            });
        }
        Ok(model)
    }

    /// Atomically decide whether to reuse, wait, or generate.
    fn claim(&self, key: &ExportKey, source_mtime: Option<SystemTime>) -> Slot {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.get_mut().push(tx);
                Slot::Wait(rx)
            }
            Entry::Vacant(slot) => {
                if let Some(hit) = self.cache.get(key)
                    && hit.source_mtime.is_some()
                    && hit.source_mtime == source_mtime
                    && hit.path.exists()
                {
                    return Slot::Cached(hit.path.clone());
                }
                slot.insert(Vec::new());
                Slot::Owner
            }
        }
    }

    async fn generate(&self, model: &Model, scale: u32) -> ExportResult {
        let config = &*self.config;
        let output = artifact::export_path(config, &model.name, scale);
        let exports_dir = config.exports_dir();
        tokio::fs::create_dir_all(&exports_dir)
            .await
            .map_err(|e| generation(format!("cannot create {}: {e}", exports_dir.display())))?;

        // Dropping the wrapper deletes it, on success and failure alike
        let wrapper = if scale == DEFAULT_SCALE {
            None
        } else {
            Some(write_wrapper(&exports_dir, &model.source, scale).map_err(generation)?)
        };
        let source = wrapper.as_ref().map_or(model.source.as_path(), |w| w.path());

        let result = Cmd::from_slice(&config.export.command)
            .arg("-o")
            .arg(&output)
            .args(["-D".to_string(), format!("$fn={}", config.export.facets)])
            .arg(source)
            .cwd(&config.root)
            .run()
            .await
            .map_err(|e| generation(format!("{e:#}")))?;

        if !result.success() {
            return Err(generation(result.error_message()));
        }
        if !output.exists() {
            return Err(generation("export tool exited successfully but wrote no file"));
        }
        Ok(output)
    }
}

fn generation(message: impl ToString) -> ExportError {
    ExportError::Generation(message.to_string())
}

/// Write `scale([f, f, f]) { include <source> }` to a temp file in `dir`.
fn write_wrapper(
    dir: &Path,
    source: &Path,
    scale: u32,
) -> std::io::Result<tempfile::NamedTempFile> {
    let factor = f64::from(scale) / 100.0;
    let mut file = tempfile::Builder::new()
        .prefix(".scale-")
        .suffix(".scad")
        .tempfile_in(dir)?;
    writeln!(
        file,
        "scale([{factor}, {factor}, {factor}]) {{ include <{}> }}",
        source.to_string_lossy().replace('\\', "/")
    )?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_project;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    /// Export stub: logs each call, then copies the last argument to `-o`.
    const PROJECT: &str = r#"
[build]
command = ["true"]
registry = ["echo", "[]"]

[export]
command = ["sh", "-c", 'echo call >> export.log; sleep 0.2; for a in "$@"; do [ "$prev" = "-o" ] && out=$a; prev=$a; done; cat "$prev" > "$out"', "export"]
scales = [100, 50]

[[models]]
name = "bracket"
type = "component"
source = "src/bracket.scad"

[[models]]
name = "phone"
type = "vitamin"
source = "src/phone.scad"
stl = false
"#;

    struct Fixture {
        dir: TempDir,
        generator: Arc<ExportGenerator>,
        rx: mpsc::UnboundedReceiver<Event>,
    }

    fn fixture(content: &str) -> Fixture {
        let (dir, config) = test_project(content);
        fs::write(dir.path().join("src/bracket.scad"), "cube(10);").unwrap();
        fs::write(dir.path().join("src/phone.scad"), "cube(3);").unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        Fixture {
            generator: Arc::new(ExportGenerator::new(Arc::new(config), tx)),
            dir,
            rx,
        }
    }

    impl Fixture {
        fn calls(&self) -> usize {
            fs::read_to_string(self.dir.path().join("export.log"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }
    }

    #[tokio::test]
    async fn test_disabled_model_rejected_without_spawning() {
        let fx = fixture(PROJECT);
        let err = fx.generator.request("phone", Some(50)).await.unwrap_err();
        assert_eq!(err, ExportError::ExportDisabled("phone".into()));
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_rejections() {
        let fx = fixture(PROJECT);
        assert_eq!(
            fx.generator.request("nope", None).await,
            Err(ExportError::UnknownModel("nope".into()))
        );
        assert!(matches!(
            fx.generator.request("bracket", Some(25)).await,
            Err(ExportError::UnsupportedScale { scale: 25, .. })
        ));
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_export() {
        let mut fx = fixture(PROJECT);

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let generator = Arc::clone(&fx.generator);
                tokio::spawn(async move { generator.request("bracket", Some(50)).await })
            })
            .collect();

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(fx.calls(), 1);
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert!(paths[0].ends_with("exports/bracket-50pct.stl"));

        // Output is the wrapper the tool was given
        let exported = fs::read_to_string(&paths[0]).unwrap();
        assert!(exported.starts_with("scale([0.5, 0.5, 0.5]) { include <"));
        assert!(exported.contains("src/bracket.scad"));

        // Wrapper removed
        let leftovers: Vec<_> = fs::read_dir(paths[0].parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == "scad"))
            .collect();
        assert!(leftovers.is_empty());

        assert_eq!(
            fx.rx.try_recv().unwrap(),
            Event::ExportReady {
                model: "bracket".into(),
                scale: 50,
                path: "exports/bracket-50pct.stl".into(),
            }
        );
        assert!(fx.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cached_export_is_announced_again() {
        let mut fx = fixture(PROJECT);
        let first = fx.generator.request("bracket", Some(50)).await.unwrap();
        let second = fx.generator.request("bracket", Some(50)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fx.calls(), 1);

        let ready = Event::ExportReady {
            model: "bracket".into(),
            scale: 50,
            path: "exports/bracket-50pct.stl".into(),
        };
        assert_eq!(fx.rx.try_recv().unwrap(), ready);
        assert_eq!(fx.rx.try_recv().unwrap(), ready);
    }

    #[test]
    fn test_finished_slot_is_not_cleared_twice() {
        let in_flight = DashMap::new();
        let key: ExportKey = ("bracket".into(), 100);
        in_flight.insert(key.clone(), Vec::new());

        let mut guard = SlotGuard::new(&in_flight, &key);
        guard.finish(&Err(generation("boom")));
        assert!(in_flight.is_empty());

        // A new owner claims the key before the old guard goes away
        let (tx, mut rx) = oneshot::channel();
        in_flight.insert(key.clone(), vec![tx]);
        drop(guard);
        assert!(in_flight.contains_key(&key));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancelled_owner_releases_slot() {
        let in_flight = DashMap::new();
        let key: ExportKey = ("bracket".into(), 100);
        let (tx, mut rx) = oneshot::channel();
        in_flight.insert(key.clone(), vec![tx]);

        drop(SlotGuard::new(&in_flight, &key));
        assert!(in_flight.is_empty());
        assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed)));
    }

    #[tokio::test]
    async fn test_cache_follows_source_mtime() {
        let fx = fixture(PROJECT);
        let first = fx.generator.request("bracket", None).await.unwrap();
        assert!(first.ends_with("exports/bracket.stl"));
        assert_eq!(fs::read_to_string(&first).unwrap(), "cube(10);");

        fx.generator.request("bracket", Some(100)).await.unwrap();
        assert_eq!(fx.calls(), 1);

        let source = fx.dir.path().join("src/bracket.scad");
        let file = fs::File::options().write(true).open(&source).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        fx.generator.request("bracket", None).await.unwrap();
        assert_eq!(fx.calls(), 2);

        fs::remove_file(&first).unwrap();
        fx.generator.request("bracket", None).await.unwrap();
        assert_eq!(fx.calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let content = PROJECT.replace(
            "echo call >> export.log;",
            "echo call >> export.log; [ -f ok ] || { touch ok; echo no manifold >&2; exit 1; };",
        );
        let fx = fixture(&content);

        let err = fx.generator.request("bracket", None).await.unwrap_err();
        assert!(matches!(&err, ExportError::Generation(m) if m.contains("no manifold")));
        assert!(fx.generator.in_flight.is_empty());

        assert!(fx.generator.request("bracket", None).await.is_ok());
        assert_eq!(fx.calls(), 2);
    }
}
