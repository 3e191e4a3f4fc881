// Library crate for the realtime messaging event bridge
// This file exposes the public API for integration tests and the demo binary

pub mod bridge;
pub mod config;
pub mod event;
pub mod participant;
pub mod retry;
pub mod rtm;
pub mod shared;
pub mod utils;

// Re-export commonly used types for easier access in tests
pub use bridge::{ConnectionState, RealtimeEventBridge};
pub use config::BridgeConfig;
pub use event::{BridgeEvent, EventHandler, LocalEvent, PersistLevel, Subscription};
pub use participant::{LocalIdentity, ParticipantAttributes, RenderListAction, RenderListSink};
pub use retry::{RetryBudget, SyncStep};
pub use rtm::{InMemoryRtmClient, InMemoryRtmServer, MessagingClient};
pub use shared::BridgeError;
