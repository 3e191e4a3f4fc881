use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::{
    bus::EventBus,
    events::{BridgeEvent, ControlMessage, EventEnvelope, EventPayload, PersistLevel, QueuedEvent},
    handler::DispatchError,
    waiting_room,
};
use crate::rtm::{Attribute, MessagingClient};

/// Local policy deciding which control events may take effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlGate {
    pub waiting_room_enabled: bool,
    pub is_host: bool,
    pub approved: bool,
}

impl ControlGate {
    /// An attendee still in the waiting room must not be muted remotely
    pub fn blocks(&self, event_name: &str) -> bool {
        if !self.waiting_room_enabled || self.is_host || self.approved {
            return false;
        }
        ControlMessage::try_from(event_name)
            .map(|message| message.is_mute())
            .unwrap_or(false)
    }
}

/// Result of running one event through the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered(BridgeEvent),
    /// Suppressed by the control gate
    Blocked,
    /// Undecodable value, logged and discarded
    Dropped,
}

/// Decode the text of a peer or channel message into an event.
///
/// Waiting room service messages are rewritten into the canonical
/// `{evt, value}` form here; everything else must already have it.
pub fn decode_message(text: &str) -> Result<EventPayload, DispatchError> {
    let message: Value =
        serde_json::from_str(text).map_err(|e| DispatchError::MalformedJson(e.to_string()))?;

    if waiting_room::is_waiting_room_message(&message) {
        return waiting_room::to_event_payload(message);
    }

    serde_json::from_value(message).map_err(|e| DispatchError::MalformedJson(e.to_string()))
}

/// Runs queued or live events through gating, persistence and delivery
pub struct EventDispatcher {
    bus: EventBus,
    client: Arc<dyn MessagingClient>,
}

impl EventDispatcher {
    pub fn new(bus: EventBus, client: Arc<dyn MessagingClient>) -> Self {
        Self { bus, client }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Dispatch one event to every subscriber.
    ///
    /// Session-persisted events are mirrored into the local user's
    /// attributes first so participants joining later replay them.
    #[instrument(skip_all, fields(event_name = %event.payload.event_name, sender_uid = event.sender_uid))]
    pub async fn dispatch(&self, event: QueuedEvent, gate: ControlGate) -> DispatchOutcome {
        let QueuedEvent {
            payload: EventPayload { event_name, value },
            sender_uid,
            timestamp,
        } = event;

        if gate.blocks(&event_name) {
            debug!(
                source = "events",
                category = "custom_events",
                "Dropping mute control while waiting for approval"
            );
            return DispatchOutcome::Blocked;
        }

        let envelope = match EventEnvelope::parse(&event_name, &value) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(
                    source = "events",
                    category = "custom_events",
                    error = %e,
                    "Error while parsing event value"
                );
                return DispatchOutcome::Dropped;
            }
        };

        if envelope.persist_level == PersistLevel::Session {
            let attribute = Attribute::new(event_name.clone(), value);
            if let Err(e) = self
                .client
                .add_or_update_local_attributes(std::slice::from_ref(&attribute))
                .await
            {
                warn!(
                    source = "rtm",
                    category = "api",
                    error = %e,
                    "Failed to persist session event, dispatching anyway"
                );
            }
        }

        let event = BridgeEvent {
            event_name,
            source: envelope.source,
            payload: envelope.payload,
            persist_level: envelope.persist_level,
            sender_uid,
            timestamp,
        };
        self.bus.emit(&event);

        DispatchOutcome::Delivered(event)
    }
}
