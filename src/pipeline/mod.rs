//! Build → validate → render pipeline.
//!
//! # Run phases
//!
//! ```text
//! Idle ─► Checking ─► Building ─► Validating ─► Rendering ─► Idle
//!            │            │
//!            │            └─ build failed ──────────────────► Idle
//!            └─ source unchanged (cached validation) ───────► Idle
//! ```
//!
//! - Checking: hash the config and watched sources, stop early on a cache hit
//! - Building: run `[build] command`, a failure ends the run
//! - Validating: cross-check the registry against declared models
//! - Rendering: re-render models whose fingerprint changed, one job at a time
//!
//! Every phase reports through [`Event`]s on the channel given to
//! [`Orchestrator::new`]. The cache record is written once, after the render
//! phase, and never on the early exits. A run that leaves some valid model
//! stale (a failed job, or a subset run) records an empty source hash so
//! the next run cannot stop at Checking.
//!
//! Only one run is active at a time. [`Orchestrator::run_gated`] drops a
//! trigger that arrives while a run is in progress.

mod camera;
mod render;
mod validate;

pub use validate::{ValidationIssue, ValidationResult, ValidationWarning};

use render::{plan_jobs, run_job};
use validate::{list_registry, validate};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use crate::artifact::build_relative;
use crate::cache::PipelineCache;
use crate::config::{Model, ProjectConfig};
use crate::freshness::{ContentHash, ModelHashes, model_hash, mtime_ms, render_config_hash, source_hash};
use crate::reload::message::Event;
use crate::utils::exec::Cmd;
use crate::{debug, log};

/// Sender side of the event stream consumed by viewers and the terminal.
pub type EventTx = mpsc::UnboundedSender<Event>;

// =============================================================================
// Requests and results
// =============================================================================

/// What a pipeline run should do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Ignore every fingerprint and re-render all selected models.
    pub force: bool,
    /// Restrict rendering to these models (`None` = all valid models).
    pub models: Option<Vec<String>>,
}

impl RunRequest {
    /// Triggered by a file change.
    pub fn changed() -> Self {
        Self::default()
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            models: None,
        }
    }

    pub fn only(models: Vec<String>, force: bool) -> Self {
        Self {
            force,
            models: Some(models),
        }
    }

    fn selects(&self, name: &str) -> bool {
        self.models
            .as_ref()
            .is_none_or(|models| models.iter().any(|m| m == name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Sources unchanged since the cached run; nothing executed.
    Unchanged,
    /// The build command failed; validation and rendering were skipped.
    BuildFailed,
    /// The render phase ran (possibly with zero jobs).
    Rendered,
}

/// Counters for the end-of-run status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Render jobs planned
    pub planned: usize,
    /// Render jobs that produced an image
    pub rendered: usize,
    /// Render jobs that failed
    pub failed: usize,
    /// Valid models skipped because their fingerprint was unchanged
    pub skipped: usize,
    pub duration: Duration,
}

impl RunSummary {
    fn new(outcome: RunOutcome, started: Instant) -> Self {
        Self {
            outcome,
            planned: 0,
            rendered: 0,
            failed: 0,
            skipped: 0,
            duration: started.elapsed(),
        }
    }

    /// One-line description for status output.
    pub fn describe(&self) -> String {
        let ms = self.duration.as_millis();
        match self.outcome {
            RunOutcome::Unchanged => "sources unchanged".to_string(),
            RunOutcome::BuildFailed => format!("build failed after {ms}ms"),
            RunOutcome::Rendered => {
                let mut parts = vec![format!("rendered {}", self.rendered)];
                if self.skipped > 0 {
                    parts.push(format!("{} unchanged", self.skipped));
                }
                if self.failed > 0 {
                    parts.push(format!("{} failed", self.failed));
                }
                format!("{} in {ms}ms", parts.join(", "))
            }
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Owns the single-flight gate and drives pipeline runs.
pub struct Orchestrator {
    config: Arc<ProjectConfig>,
    events: EventTx,
    busy: AtomicBool,
}

/// Clears the busy flag when a run ends, including by panic or cancellation.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Orchestrator {
    pub fn new(config: Arc<ProjectConfig>, events: EventTx) -> Self {
        Self {
            config,
            events,
            busy: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Arc<ProjectConfig> {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run the pipeline unless a run is already active.
    ///
    /// A dropped trigger is not queued; `None` means it was dropped.
    pub async fn run_gated(&self, request: RunRequest) -> Option<RunSummary> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("pipeline"; "run in progress, dropping trigger {:?}", request);
            return None;
        }
        let _guard = BusyGuard(&self.busy);
        Some(self.run(request).await)
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine (one-shot commands may not subscribe)
        let _ = self.events.send(event);
    }

    async fn run(&self, request: RunRequest) -> RunSummary {
        let started = Instant::now();
        let config = &*self.config;
        let cache_path = config.cache_path();
        let cache = PipelineCache::restore(&cache_path);

        // Checking
        let source_hash = source_hash(config);
        if !request.force
            && request.models.is_none()
            && let Some(cache) = &cache
            && cache.source_hash == source_hash
        {
            debug!("pipeline"; "source hash {} unchanged", source_hash);
            self.emit(Event::Validation(cache.validation.clone()));
            return RunSummary::new(RunOutcome::Unchanged, started);
        }

        // Building
        if !self.build().await {
            return RunSummary::new(RunOutcome::BuildFailed, started);
        }

        // Validating
        let registry = list_registry(config).await.unwrap_or_else(|e| {
            log!("registry"; "{}", e);
            self.emit(Event::error(e.to_string(), "registry"));
            Vec::new()
        });
        let validation = validate(config, &registry);
        for warning in &validation.warnings {
            debug!("validate"; "{}: {:?}", warning.model, warning.issue);
        }
        self.emit(Event::Validation(validation.clone()));

        // Rendering
        let render_hash = render_config_hash(config);
        let render_config_changed = cache
            .as_ref()
            .is_none_or(|c| c.render_config_hash != render_hash);

        let mut summary = RunSummary::new(RunOutcome::Rendered, started);
        let mut stale: Vec<(&Model, ModelHashes)> = Vec::new();
        for model in config
            .models
            .iter()
            .filter(|m| validation.is_valid(&m.name) && request.selects(&m.name))
        {
            let hashes = model_hash(model);
            let unchanged = cache
                .as_ref()
                .and_then(|c| c.model(&model.name))
                .is_some_and(|prev| *prev == hashes);
            if !request.force && !render_config_changed && unchanged {
                summary.skipped += 1;
            } else {
                stale.push((model, hashes));
            }
        }

        let models: Vec<&Model> = stale.iter().map(|(m, _)| *m).collect();
        let failed_models = self.render(&models, &mut summary).await;

        let previous_render_hash = cache
            .as_ref()
            .map_or_else(ContentHash::empty, |c| c.render_config_hash);

        // Models not rendered this run keep their previous record, as do
        // models with a failed job so the next run retries them.
        let mut model_hashes: BTreeMap<String, ModelHashes> = cache
            .map(|c| c.models)
            .unwrap_or_default()
            .into_iter()
            .filter(|(name, _)| config.model(name).is_some())
            .collect();
        for (model, hashes) in stale {
            if !failed_models.contains(model.name.as_str()) {
                model_hashes.insert(model.name.clone(), hashes);
            }
        }

        // The project-wide hashes may only short-circuit the next run once
        // every valid model is current under the current render settings.
        let settled = failed_models.is_empty()
            && config
                .models
                .iter()
                .filter(|m| validation.is_valid(&m.name) && !request.selects(&m.name))
                .all(|m| {
                    !render_config_changed && model_hashes.get(&m.name) == Some(&model_hash(m))
                });
        let (source_hash, render_hash) = if settled {
            (source_hash, render_hash)
        } else {
            debug!("pipeline"; "models left stale, next run rechecks everything");
            (ContentHash::empty(), previous_render_hash)
        };

        let record = PipelineCache {
            source_hash,
            render_config_hash: render_hash,
            validation,
            models: model_hashes,
        };
        if let Err(e) = record.persist(&cache_path) {
            log!("cache"; "failed to write {}: {}", cache_path.display(), e);
        }

        summary.duration = started.elapsed();
        self.emit(Event::RenderComplete {
            duration_ms: u64::try_from(summary.duration.as_millis()).unwrap_or(u64::MAX),
        });
        summary
    }

    /// Run the build command, reporting `build_start`/`build_complete`.
    ///
    /// Returns whether the build succeeded.
    async fn build(&self) -> bool {
        let config = &*self.config;
        self.emit(Event::BuildStart {
            command: config.build.command_line(),
        });

        let started = Instant::now();
        let result = Cmd::from_slice(&config.build.command)
            .cwd(&config.root)
            .run()
            .await;

        let error = match result {
            Ok(output) if output.success() => {
                self.emit(Event::BuildComplete {
                    success: true,
                    error: None,
                    duration_ms: output.duration_ms(),
                });
                return true;
            }
            Ok(output) => output.error_message(),
            Err(e) => format!("{e:#}"),
        };

        log!("build"; "{}", error);
        self.emit(Event::BuildComplete {
            success: false,
            error: Some(error.clone()),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
        self.emit(Event::error(error, "build"));
        false
    }

    /// Render every job for `models` in order; returns models with a failed job.
    async fn render<'a>(
        &self,
        models: &[&'a Model],
        summary: &mut RunSummary,
    ) -> FxHashSet<&'a str> {
        let config = &*self.config;
        let jobs = plan_jobs(config, models);
        let total = jobs.len();
        summary.planned = total;

        self.emit(Event::RenderStart {
            models: models.iter().map(|m| m.name.clone()).collect(),
            total_angles: total,
        });

        let mut failed = FxHashSet::default();
        for (i, job) in jobs.iter().enumerate() {
            self.emit(Event::RenderProgress {
                model: job.model.clone(),
                angle: job.angle.clone(),
                current: i + 1,
                total,
            });

            match run_job(config, job).await {
                Ok(path) => {
                    summary.rendered += 1;
                    self.emit(Event::ArtifactUpdated {
                        model: job.model.clone(),
                        angle: job.angle.clone(),
                        path: build_relative(config, &path),
                        mtime: mtime_ms(&path).unwrap_or_default(),
                    });
                }
                Err(e) => {
                    summary.failed += 1;
                    log!("render"; "{}/{}: {:#}", job.model, job.angle, e);
                    self.emit(Event::error(
                        format!("{}/{}: {e:#}", job.model, job.angle),
                        "render",
                    ));
                    if let Some(model) = models.iter().copied().find(|m| m.name == job.model) {
                        failed.insert(model.name.as_str());
                    }
                }
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_project;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
[build]
command = ["sh", "-c", "echo build >> build.log"]
registry = ["sh", "-c", "cat registry.json"]

[render]
command = ["sh", "-c", 'while [ "$1" != "-o" ]; do shift; done; echo png > "$2"; echo "$2" >> render.log', "render"]

[cameras]
iso = "0,0,0,55,0,25,140"
front = "0,0,0,0,0,0,140"

[camera_sets]
standard = ["iso", "front"]

[[models]]
name = "bracket"
type = "component"
source = "src/bracket.scad"

[[models]]
name = "cube"
type = "component"
source = "src/cube.scad"
"#;

    const REGISTRY: &str = r#"[{"name":"bracket","type":"component","stl":true},{"name":"cube","type":"component","stl":true}]"#;

    struct Fixture {
        dir: TempDir,
        orchestrator: Orchestrator,
        rx: mpsc::UnboundedReceiver<Event>,
    }

    impl Fixture {
        fn new(config: &str, registry: &str) -> Self {
            let (dir, config) = test_project(config);
            fs::write(dir.path().join("registry.json"), registry).unwrap();
            fs::write(dir.path().join("src/bracket.scad"), "cube(10);").unwrap();
            fs::write(dir.path().join("src/cube.scad"), "cube(5);").unwrap();
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                dir,
                orchestrator: Orchestrator::new(Arc::new(config), tx),
                rx,
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        async fn run(&mut self, request: RunRequest) -> (RunSummary, Vec<Event>) {
            let summary = self.orchestrator.run_gated(request).await.unwrap();
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            (summary, events)
        }

        fn count_lines(&self, file: &str) -> usize {
            fs::read_to_string(self.root().join(file))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        fn builds(&self) -> usize {
            self.count_lines("build.log")
        }

        fn renders(&self) -> usize {
            self.count_lines("render.log")
        }
    }

    fn kinds(events: &[Event]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                Event::Connected { .. } => "connected",
                Event::BuildStart { .. } => "build_start",
                Event::BuildComplete { .. } => "build_complete",
                Event::Validation(_) => "validation",
                Event::RenderStart { .. } => "render_start",
                Event::RenderProgress { .. } => "render_progress",
                Event::RenderComplete { .. } => "render_complete",
                Event::ArtifactUpdated { .. } => "artifact_updated",
                Event::ExportReady { .. } => "export_ready",
                Event::Error { .. } => "error",
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_model_run() {
        let config = PROJECT.split("\n[[models]]\nname = \"cube\"").next().unwrap();
        let mut fx = Fixture::new(
            config,
            r#"[{"name":"bracket","type":"component","stl":true}]"#,
        );

        let (summary, events) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.outcome, RunOutcome::Rendered);
        assert_eq!(
            kinds(&events),
            vec![
                "build_start",
                "build_complete",
                "validation",
                "render_start",
                "render_progress",
                "artifact_updated",
                "render_progress",
                "artifact_updated",
                "render_complete",
            ]
        );

        let Event::Validation(validation) = &events[2] else { unreachable!() };
        assert!(validation.warnings.is_empty());
        assert_eq!(validation.valid_models, ["bracket".to_string()].into());

        let progress: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::RenderProgress { model, angle, current, total } => {
                    Some(format!("{model}/{angle} {current}/{total}"))
                }
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec!["bracket/iso 1/2", "bracket/front 2/2"]);

        let Event::ArtifactUpdated { path, mtime, .. } = &events[5] else { unreachable!() };
        assert_eq!(path, "screenshots/component-bracket-iso.png");
        assert!(*mtime > 0);
        assert!(fx.orchestrator.config().cache_path().exists());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let mut fx = Fixture::new(PROJECT, REGISTRY);
        fx.run(RunRequest::changed()).await;
        assert_eq!((fx.builds(), fx.renders()), (1, 4));

        let (summary, events) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.outcome, RunOutcome::Unchanged);
        assert_eq!(kinds(&events), vec!["validation"]);
        assert_eq!((fx.builds(), fx.renders()), (1, 4));
    }

    #[tokio::test]
    async fn test_render_config_change_rerenders_everything() {
        let mut fx = Fixture::new(PROJECT, REGISTRY);
        fx.run(RunRequest::changed()).await;

        let mut config = (**fx.orchestrator.config()).clone();
        config.render.facets = 32;
        // Any source edit gets past the checking phase
        fs::write(fx.root().join("src/notes.py"), "# touched").unwrap();
        let tx = fx.orchestrator.events.clone();
        fx.orchestrator = Orchestrator::new(Arc::new(config), tx);

        let (summary, _) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.rendered, 4);
        assert_eq!(summary.skipped, 0);
        assert_eq!(fx.renders(), 8);
    }

    #[tokio::test]
    async fn test_only_edited_model_rerenders() {
        let mut fx = Fixture::new(PROJECT, REGISTRY);
        fx.run(RunRequest::changed()).await;

        fs::write(fx.root().join("src/cube.scad"), "cube(6);").unwrap();
        let (summary, events) = fx.run(RunRequest::changed()).await;

        assert_eq!(fx.builds(), 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.rendered, 2);
        let start = events.iter().find_map(|e| match e {
            Event::RenderStart { models, total_angles } => Some((models.clone(), *total_angles)),
            _ => None,
        });
        assert_eq!(start, Some((vec!["cube".to_string()], 2)));
    }

    #[tokio::test]
    async fn test_force_and_subset() {
        let mut fx = Fixture::new(PROJECT, REGISTRY);
        fx.run(RunRequest::changed()).await;

        let (summary, _) = fx.run(RunRequest::only(vec!["cube".into()], true)).await;
        assert_eq!(summary.rendered, 2);
        assert_eq!(fx.builds(), 2);

        let (summary, _) = fx.run(RunRequest::forced()).await;
        assert_eq!(summary.rendered, 4);
        assert_eq!(fx.renders(), 10);
    }

    #[tokio::test]
    async fn test_build_failure_leaves_cache_untouched() {
        let config = PROJECT.replace("echo build >> build.log", "echo boom >&2; exit 3");
        let mut fx = Fixture::new(&config, REGISTRY);

        let (summary, events) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.outcome, RunOutcome::BuildFailed);
        assert_eq!(kinds(&events), vec!["build_start", "build_complete", "error"]);
        assert!(matches!(
            &events[1],
            Event::BuildComplete { success: false, error: Some(e), .. } if e.contains("boom")
        ));
        assert!(matches!(
            &events[2],
            Event::Error { context: Some(c), .. } if c == "build"
        ));
        assert!(!fx.orchestrator.config().cache_path().exists());
        assert_eq!(fx.renders(), 0);
    }

    #[tokio::test]
    async fn test_bad_registry_renders_nothing() {
        let mut fx = Fixture::new(PROJECT, "not json");

        let (summary, events) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.planned, 0);
        assert!(events.iter().any(
            |e| matches!(e, Event::Error { context: Some(c), .. } if c == "registry")
        ));
        let Some(Event::Validation(validation)) =
            events.iter().find(|e| matches!(e, Event::Validation(_)))
        else {
            panic!("no validation event");
        };
        assert!(validation.valid_models.is_empty());
        assert_eq!(validation.warnings.len(), 2);
        assert!(matches!(events.last(), Some(Event::RenderComplete { .. })));
        assert!(fx.orchestrator.config().cache_path().exists());
    }

    #[tokio::test]
    async fn test_failed_job_is_retried_next_run() {
        let config = PROJECT.replace(
            r#"echo png > "$2"; echo "$2" >> render.log'"#,
            r#"echo "$2" >> render.log; case "$2" in *cube*) exit 1;; esac; echo png > "$2"'"#,
        );
        let mut fx = Fixture::new(&config, REGISTRY);

        let (summary, events) = fx.run(RunRequest::changed()).await;
        assert_eq!((summary.rendered, summary.failed), (2, 2));
        assert!(events.iter().any(
            |e| matches!(e, Event::Error { context: Some(c), .. } if c == "render")
        ));

        // No edit needed: the failure keeps the next run past Checking
        let (summary, _) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.outcome, RunOutcome::Rendered);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.planned, 2);
    }

    #[tokio::test]
    async fn test_subset_run_keeps_other_edits_pending() {
        let mut fx = Fixture::new(PROJECT, REGISTRY);
        fx.run(RunRequest::changed()).await;

        fs::write(fx.root().join("src/cube.scad"), "cube(6);").unwrap();
        let (summary, _) = fx.run(RunRequest::only(vec!["bracket".into()], true)).await;
        assert_eq!(summary.rendered, 2);

        let (summary, events) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.outcome, RunOutcome::Rendered);
        assert_eq!((summary.rendered, summary.skipped), (2, 1));
        let start = events.iter().find_map(|e| match e {
            Event::RenderStart { models, .. } => Some(models.clone()),
            _ => None,
        });
        assert_eq!(start, Some(vec!["cube".to_string()]));

        let (summary, _) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.outcome, RunOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_subset_run_after_render_config_change() {
        let mut fx = Fixture::new(PROJECT, REGISTRY);
        fx.run(RunRequest::changed()).await;

        let mut config = (**fx.orchestrator.config()).clone();
        config.render.facets = 32;
        let tx = fx.orchestrator.events.clone();
        fx.orchestrator = Orchestrator::new(Arc::new(config), tx);

        let (summary, _) = fx.run(RunRequest::only(vec!["bracket".into()], true)).await;
        assert_eq!(summary.rendered, 2);
        assert_eq!(fx.renders(), 6);

        // cube still has the old settings, so it must be rendered now
        let (summary, _) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.outcome, RunOutcome::Rendered);
        assert_eq!(summary.rendered, 4);

        let (summary, _) = fx.run(RunRequest::changed()).await;
        assert_eq!(summary.outcome, RunOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_busy_gate_drops_trigger() {
        let fx = Fixture::new(PROJECT, REGISTRY);
        fx.orchestrator.busy.store(true, Ordering::Release);
        assert!(fx.orchestrator.run_gated(RunRequest::forced()).await.is_none());
        assert_eq!(fx.builds(), 0);

        fx.orchestrator.busy.store(false, Ordering::Release);
        assert!(fx.orchestrator.run_gated(RunRequest::forced()).await.is_some());
        assert!(!fx.orchestrator.is_busy());
    }

    #[test]
    fn test_summary_describe() {
        let summary = RunSummary {
            outcome: RunOutcome::Rendered,
            planned: 4,
            rendered: 3,
            failed: 1,
            skipped: 2,
            duration: Duration::from_millis(1500),
        };
        assert_eq!(summary.describe(), "rendered 3, 2 unchanged, 1 failed in 1500ms");
    }
}
