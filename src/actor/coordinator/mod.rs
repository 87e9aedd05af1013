//! Actor Coordinator - Wires up the serve-mode actor system
//!
//! The Coordinator is a thin orchestrator that:
//! - Creates communication channels
//! - Binds the WebSocket listener
//! - Wires up actors and queues the initial pipeline run
//! - Runs them until shutdown

mod runtime;

use std::sync::Arc;

use anyhow::Result;
use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use super::fs::FsActor;
use super::messages::{PipelineMsg, RequestMsg, WsMsg};
use super::pipeline::PipelineActor;
use super::request::RequestActor;
use super::ws::WsActor;
use crate::cache::PipelineCache;
use crate::config::ProjectConfig;
use crate::export::ExportGenerator;
use crate::pipeline::{Orchestrator, RunRequest};
use crate::reload::server::start_ws_server;

const CHANNEL_BUFFER: usize = 32;

/// Coordinator - wires up and runs the actor system.
pub struct Coordinator {
    config: Arc<ProjectConfig>,
    http_port: u16,
    shutdown_rx: Option<Receiver<()>>,
}

impl Coordinator {
    pub fn with_config(config: Arc<ProjectConfig>, http_port: u16) -> Self {
        Self {
            config,
            http_port,
            shutdown_rx: None,
        }
    }

    /// Set shutdown signal receiver.
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Run the actor system.
    pub async fn run(mut self) -> Result<()> {
        let config = &self.config;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (pipeline_tx, pipeline_rx) = mpsc::channel::<PipelineMsg>(CHANNEL_BUFFER);
        let (request_tx, request_rx) = mpsc::channel::<RequestMsg>(CHANNEL_BUFFER);
        let (ws_tx, ws_rx) = mpsc::channel::<WsMsg>(CHANNEL_BUFFER);

        let ws_port = start_ws_server(config.serve.interface, config.serve.ws_port, ws_tx.clone())?;
        if ws_port != config.serve.ws_port {
            crate::log!("ws"; "port {} in use, using {} instead", config.serve.ws_port, ws_port);
        }
        crate::log!("ws"; "ws://{}:{}", config.serve.interface, ws_port);

        // Watcher first, so edits made during the initial run are not lost
        let fs_actor = FsActor::new(pipeline_tx.clone(), Arc::clone(config))
            .map_err(|e| anyhow::anyhow!("watcher failed: {}", e))?;

        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(config), events_tx.clone()));
        let exports = Arc::new(ExportGenerator::new(Arc::clone(config), events_tx.clone()));

        let pipeline_actor = PipelineActor::new(pipeline_rx, orchestrator);
        let request_actor = RequestActor::new(request_rx, pipeline_tx.clone(), exports, events_tx);
        let restored = PipelineCache::restore(&config.cache_path()).map(|c| c.validation);
        let ws_actor = WsActor::new(ws_rx, events_rx, request_tx.clone(), Arc::clone(config), self.http_port)
            .with_validation(restored);

        pipeline_tx
            .send(PipelineMsg::Run(RunRequest::changed()))
            .await
            .map_err(|_| anyhow::anyhow!("pipeline actor unavailable"))?;

        crate::debug!("actor"; "start");
        let shutdown_rx = self.shutdown_rx.take();
        runtime::run_actors(
            runtime::Actors {
                fs: fs_actor,
                pipeline: pipeline_actor,
                request: request_actor,
                ws: ws_actor,
            },
            runtime::Mailboxes {
                pipeline: pipeline_tx,
                request: request_tx,
                ws: ws_tx,
            },
            shutdown_rx,
        )
        .await;

        crate::debug!("actor"; "stopped");
        Ok(())
    }
}
