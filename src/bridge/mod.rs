// Realtime event bridge
//
// `RealtimeEventBridge` owns a connection driver and a notification
// listener, both spawned as tokio tasks and aborted on stop.

pub use service::RealtimeEventBridge;
pub use state::ConnectionState;

mod listener;
mod service;
mod state;
mod sync;
