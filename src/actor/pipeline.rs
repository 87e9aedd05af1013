//! Pipeline Actor
//!
//! Turns run requests into gated orchestrator runs. Each run is spawned so
//! the mailbox keeps draining; a request arriving mid-run reaches
//! [`Orchestrator::run_gated`] and is dropped there, never queued.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::messages::PipelineMsg;
use crate::logger::{status_error, status_success, status_unchanged, status_warning};
use crate::pipeline::{Orchestrator, RunOutcome, RunRequest, RunSummary};

pub struct PipelineActor {
    rx: mpsc::Receiver<PipelineMsg>,
    orchestrator: Arc<Orchestrator>,
    current: Option<JoinHandle<()>>,
}

impl PipelineActor {
    pub fn new(rx: mpsc::Receiver<PipelineMsg>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            rx,
            orchestrator,
            current: None,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                PipelineMsg::Run(request) => self.start(request),
                PipelineMsg::Shutdown => {
                    crate::debug!("pipeline"; "shutting down");
                    break;
                }
            }
        }

        // Let an active run finish writing its cache record
        if let Some(handle) = self.current.take() {
            let _ = handle.await;
        }
    }

    fn start(&mut self, request: RunRequest) {
        let pending = self.current.as_ref().is_some_and(|h| !h.is_finished());
        if pending || self.orchestrator.is_busy() {
            crate::debug!("pipeline"; "busy, dropping {:?}", request);
            return;
        }
        crate::debug!("pipeline"; "{}: {:?}", self.orchestrator.config().name(), request);
        let orchestrator = Arc::clone(&self.orchestrator);
        self.current = Some(tokio::spawn(async move {
            if let Some(summary) = orchestrator.run_gated(request).await {
                report(&summary);
            }
        }));
    }
}

/// Serve-mode status line for a finished run.
pub fn report(summary: &RunSummary) {
    let line = summary.describe();
    match summary.outcome {
        RunOutcome::Unchanged => status_unchanged(&line),
        RunOutcome::BuildFailed => status_error(&line, "see the build error above"),
        RunOutcome::Rendered if summary.failed > 0 => status_warning(&line),
        RunOutcome::Rendered => status_success(&line),
    }
}
