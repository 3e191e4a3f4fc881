use thiserror::Error;

use super::events::BridgeEvent;

/// Reasons an incoming message is dropped instead of dispatched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Malformed message JSON: {0}")]
    MalformedJson(String),

    #[error("Malformed envelope for event {event}: {reason}")]
    MalformedEnvelope { event: String, reason: String },

    #[error("Unsupported waiting room message type: {0}")]
    UnknownWaitingRoomType(String),

    #[error("Unknown sender: {0}")]
    UnknownSender(String),
}

/// Trait for components that receive dispatched events
///
/// Handlers are invoked synchronously, in registration order, on the task
/// that dispatches the event. A handler sees every event in arrival order,
/// so it should return quickly and hand heavy work off to its own task.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &BridgeEvent);

    /// Get a human-readable name for this handler (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// Adapter registering a plain closure as a handler
pub(crate) struct ClosureHandler<F> {
    f: F,
}

impl<F> ClosureHandler<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventHandler for ClosureHandler<F>
where
    F: Fn(&BridgeEvent) + Send + Sync,
{
    fn handle(&self, event: &BridgeEvent) {
        (self.f)(event)
    }

    fn name(&self) -> &'static str {
        "closure"
    }
}
