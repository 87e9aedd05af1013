//! Request Actor
//!
//! Dispatches viewer requests: rebuild and render requests become pipeline
//! runs, export requests go to the shared [`ExportGenerator`]. Exports run
//! as their own tasks so a slow export never blocks other requests.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::messages::{PipelineMsg, RequestMsg};
use crate::export::ExportGenerator;
use crate::pipeline::{EventTx, RunRequest};
use crate::reload::message::{Event, ViewerRequest};

pub struct RequestActor {
    rx: mpsc::Receiver<RequestMsg>,
    pipeline_tx: mpsc::Sender<PipelineMsg>,
    exports: Arc<ExportGenerator>,
    events: EventTx,
}

impl RequestActor {
    pub fn new(
        rx: mpsc::Receiver<RequestMsg>,
        pipeline_tx: mpsc::Sender<PipelineMsg>,
        exports: Arc<ExportGenerator>,
        events: EventTx,
    ) -> Self {
        Self {
            rx,
            pipeline_tx,
            exports,
            events,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                RequestMsg::Viewer(request) => {
                    if self.dispatch(request).await.is_err() {
                        break;
                    }
                }
                RequestMsg::Shutdown => break,
            }
        }
    }

    /// Returns `Err` once the PipelineActor is gone.
    async fn dispatch(&self, request: ViewerRequest) -> Result<(), ()> {
        crate::debug!("request"; "{:?}", request);
        match request {
            ViewerRequest::RequestRebuild {} => self.send_run(RunRequest::forced()).await,
            ViewerRequest::RequestRender { models: None } => self.send_run(RunRequest::forced()).await,
            ViewerRequest::RequestRender {
                models: Some(models),
            } => self.send_run(RunRequest::only(models, true)).await,
            ViewerRequest::RequestExport { model, scale } => {
                let exports = Arc::clone(&self.exports);
                let events = self.events.clone();
                tokio::spawn(async move {
                    if let Err(e) = exports.request(&model, scale).await {
                        let _ = events.send(Event::error(format!("{model}: {e}"), "export"));
                    }
                });
                Ok(())
            }
        }
    }

    async fn send_run(&self, request: RunRequest) -> Result<(), ()> {
        self.pipeline_tx
            .send(PipelineMsg::Run(request))
            .await
            .map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_project;

    #[tokio::test]
    async fn test_requests_are_routed() {
        let (_dir, config) = test_project(
            r#"
[build]
command = ["true"]
registry = ["echo", "[]"]

[[models]]
name = "phone"
type = "vitamin"
source = "src/phone.scad"
stl = false
"#,
        );
        let config = Arc::new(config);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (pipeline_tx, mut pipeline_rx) = mpsc::channel(8);
        let (tx, rx) = mpsc::channel(8);
        let exports = Arc::new(ExportGenerator::new(Arc::clone(&config), events_tx.clone()));
        let actor = RequestActor::new(rx, pipeline_tx, exports, events_tx);
        let handle = tokio::spawn(actor.run());

        let send = |json: &str| RequestMsg::Viewer(ViewerRequest::from_json(json).unwrap());
        tx.send(send(r#"{"type":"request_rebuild"}"#)).await.unwrap();
        tx.send(send(r#"{"type":"request_render","models":["phone"]}"#)).await.unwrap();
        tx.send(send(r#"{"type":"request_export","model":"phone","scale":50}"#))
            .await
            .unwrap();

        let Some(PipelineMsg::Run(first)) = pipeline_rx.recv().await else {
            panic!("expected a run");
        };
        assert_eq!(first, RunRequest::forced());
        let Some(PipelineMsg::Run(second)) = pipeline_rx.recv().await else {
            panic!("expected a run");
        };
        assert_eq!(second, RunRequest::only(vec!["phone".into()], true));

        let event = events_rx.recv().await.unwrap();
        assert!(matches!(
            event,
            Event::Error { message, context: Some(c) } if c == "export" && message.contains("stl = false")
        ));

        tx.send(RequestMsg::Shutdown).await.unwrap();
        handle.await.unwrap();
    }
}
