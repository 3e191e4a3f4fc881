use tracing::debug;

use super::models::ParticipantUpdate;
use crate::utils::Uid;

/// Action published into the hosting application's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderListAction {
    UpdateRenderList { uid: Uid, update: ParticipantUpdate },
}

/// Receiver for participant updates produced by the bridge
pub trait RenderListSink: Send + Sync {
    fn dispatch(&self, action: RenderListAction);
}

/// Sink that only logs what it receives
pub struct TracingRenderListSink;

impl RenderListSink for TracingRenderListSink {
    fn dispatch(&self, action: RenderListAction) {
        match action {
            RenderListAction::UpdateRenderList { uid, update } => {
                debug!(uid = uid, update = ?update, "UpdateRenderList");
            }
        }
    }
}
