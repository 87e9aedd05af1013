//! One-shot pipeline run (`scadview build`).
//!
//! Runs the same build → validate → render pipeline as serve mode, once,
//! with a terminal progress line instead of viewers.

use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::mpsc;

use crate::config::ProjectConfig;
use crate::logger::ProgressLine;
use crate::pipeline::{Orchestrator, RunOutcome, RunRequest, RunSummary, ValidationIssue};
use crate::reload::message::Event;
use crate::utils::exec::missing_programs;
use crate::{debug, log};

/// Run the pipeline once.
///
/// Returns an error when the build command fails or a named model is not
/// declared; individual render failures are reported but do not fail the
/// command.
pub fn build(config: Arc<ProjectConfig>, force: bool, models: Vec<String>) -> Result<()> {
    let unknown: Vec<_> = models.iter().filter(|m| config.model(m).is_none()).collect();
    if !unknown.is_empty() {
        bail!("unknown model(s): {:?}", unknown);
    }

    warn_missing_programs(&config);

    let request = if models.is_empty() {
        RunRequest {
            force,
            models: None,
        }
    } else {
        RunRequest::only(models, true)
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let summary = rt.block_on(run_once(config, request));

    match summary.outcome {
        RunOutcome::BuildFailed => bail!("{}", summary.describe()),
        RunOutcome::Unchanged => log!("build"; "{}, nothing to do (use --force to re-render)", summary.describe()),
        RunOutcome::Rendered => log!("build"; "{}", summary.describe()),
    }
    Ok(())
}

/// Warn about configured programs that are not on `PATH`.
pub fn warn_missing_programs(config: &ProjectConfig) {
    let commands = [
        config.build.command.as_slice(),
        config.build.registry.as_slice(),
        config.render.command.as_slice(),
        config.export.command.as_slice(),
    ];
    for program in missing_programs(commands) {
        log!("warning"; "`{}` not found on PATH", program);
    }
}

async fn run_once(config: Arc<ProjectConfig>, request: RunRequest) -> RunSummary {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(config, events_tx);
    let reporter = tokio::spawn(report_events(events_rx));

    // A fresh orchestrator is never busy
    let summary = orchestrator.run_gated(request).await;
    drop(orchestrator);
    let _ = reporter.await;

    summary.unwrap_or_else(|| RunSummary {
        outcome: RunOutcome::Unchanged,
        planned: 0,
        rendered: 0,
        failed: 0,
        skipped: 0,
        duration: std::time::Duration::ZERO,
    })
}

/// Print pipeline events until the orchestrator is dropped.
async fn report_events(mut rx: mpsc::UnboundedReceiver<Event>) {
    let mut progress: Option<ProgressLine> = None;

    while let Some(event) = rx.recv().await {
        match event {
            Event::BuildStart { command } => debug!("build"; "{}", command),
            Event::BuildComplete {
                success: true,
                duration_ms,
                ..
            } => log!("build"; "done in {}ms", duration_ms),
            Event::BuildComplete { error, .. } => {
                log!("error"; "build failed");
                if let Some(error) = error {
                    eprintln!("{error}");
                }
            }
            Event::Validation(validation) => {
                for warning in &validation.warnings {
                    let issue = match warning.issue {
                        ValidationIssue::NotInRegistry => "declared but not in the registry",
                        ValidationIssue::NotInConfig => "in the registry but not declared",
                    };
                    log!("validate"; "{}: {}", warning.model, issue);
                }
            }
            Event::RenderStart { models, total_angles } => {
                debug!("render"; "{}", models.join(", "));
                if total_angles > 0 {
                    progress = Some(ProgressLine::new(&[("render", total_angles)]));
                }
            }
            Event::RenderProgress { .. } => {
                if let Some(progress) = &progress {
                    progress.inc("render");
                }
            }
            Event::RenderComplete { .. } => {
                if let Some(progress) = progress.take() {
                    progress.finish();
                }
            }
            Event::Error { message, context } => {
                log!("error"; "{}: {}", context.as_deref().unwrap_or("pipeline"), message);
            }
            Event::ArtifactUpdated { path, .. } => debug!("render"; "{}", path),
            Event::Connected { .. } | Event::ExportReady { .. } => {}
        }
    }
}
