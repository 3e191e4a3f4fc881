// Participant cache and the render-list contract it publishes through

pub use models::{
    LocalIdentity, ParticipantAttributes, ParticipantKind, ParticipantUpdate, IS_HOST_KEY,
    SCREEN_UID_KEY,
};
pub use roster::ParticipantRoster;
pub use sink::{RenderListAction, RenderListSink, TracingRenderListSink};

mod models;
mod roster;
mod sink;
