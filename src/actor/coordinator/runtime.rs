use std::time::Duration;

use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use crate::actor::fs::FsActor;
use crate::actor::messages::{PipelineMsg, RequestMsg, WsMsg};
use crate::actor::pipeline::PipelineActor;
use crate::actor::request::RequestActor;
use crate::actor::ws::WsActor;

/// How long an active run may keep going after Ctrl+C.
const PIPELINE_GRACE: Duration = Duration::from_secs(2);

pub(super) struct Actors {
    pub(super) fs: FsActor,
    pub(super) pipeline: PipelineActor,
    pub(super) request: RequestActor,
    pub(super) ws: WsActor,
}

pub(super) struct Mailboxes {
    pub(super) pipeline: mpsc::Sender<PipelineMsg>,
    pub(super) request: mpsc::Sender<RequestMsg>,
    pub(super) ws: mpsc::Sender<WsMsg>,
}

/// Run all actors concurrently until shutdown.
pub(super) async fn run_actors(
    actors: Actors,
    mailboxes: Mailboxes,
    shutdown_rx: Option<Receiver<()>>,
) {
    let Actors {
        fs,
        pipeline,
        request,
        ws,
    } = actors;

    let fs_handle = tokio::spawn(fs.run());
    let mut pipeline_handle = tokio::spawn(pipeline.run());
    let request_handle = tokio::spawn(request.run());
    let mut ws_handle = tokio::spawn(ws.run());

    loop {
        let signalled = shutdown_rx.as_ref().is_some_and(|rx| rx.try_recv().is_ok());
        if signalled || crate::core::is_shutdown() {
            crate::debug!("actor"; "shutdown signal received");
            break;
        }
        if fs_handle.is_finished() || ws_handle.is_finished() || request_handle.is_finished() {
            crate::log!("actor"; "an actor stopped unexpectedly, shutting down");
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    fs_handle.abort();
    let _ = mailboxes.request.send(RequestMsg::Shutdown).await;
    let _ = mailboxes.pipeline.send(PipelineMsg::Shutdown).await;
    if tokio::time::timeout(PIPELINE_GRACE, &mut pipeline_handle).await.is_err() {
        crate::log!("pipeline"; "run still active, abandoning it");
        pipeline_handle.abort();
    }
    let _ = mailboxes.ws.send(WsMsg::Shutdown).await;
    let _ = tokio::time::timeout(Duration::from_millis(500), &mut ws_handle).await;
    let _ = request_handle.await;
}
