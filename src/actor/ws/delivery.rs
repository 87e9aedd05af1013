use tungstenite::protocol::Message;

use super::WsActor;

impl WsActor {
    /// Send one serialized message to every viewer.
    ///
    /// A failed send means the viewer is gone; it is dropped silently.
    pub(super) fn broadcast(&self, msg: Message) {
        let mut viewers = self.viewers.lock();
        if viewers.is_empty() {
            return;
        }

        let before = viewers.len();
        viewers.retain_mut(|viewer| match viewer.ws.send(msg.clone()) {
            Ok(()) => true,
            Err(e) => {
                crate::debug!("ws"; "viewer {} dropped: {}", viewer.id, e);
                false
            }
        });
        crate::debug!("ws"; "broadcast to {}/{} viewers", viewers.len(), before);
    }
}
