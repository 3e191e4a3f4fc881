// Event pipeline components
//
// Raw messages are decoded into events, queued until the local participant
// has synchronized, then gated and dispatched to in-process subscribers.

// Public API - what other modules can use
pub use bus::{EventBus, Subscription};
pub use dispatcher::{decode_message, ControlGate, DispatchOutcome, EventDispatcher};
pub use events::{
    BridgeEvent, ControlMessage, EventEnvelope, EventPayload, LocalEvent, PersistLevel,
    QueuedEvent, NAME_EVENT,
};
pub use handler::{DispatchError, EventHandler};
pub use queue::EventQueue;
pub use waiting_room::{WaitingRoomStatus, WAITING_ROOM_REQUEST, WAITING_ROOM_RESPONSE};

// Internal modules
mod bus;
mod dispatcher;
mod events;
mod handler;
mod queue;
mod waiting_room;
