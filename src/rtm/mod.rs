// Messaging service boundary
//
// The bridge only ever talks to the service through `MessagingClient`.
// `memory` provides an in-process implementation with fault injection.

pub use client::MessagingClient;
pub use memory::{CallRecord, InMemoryRtmClient, InMemoryRtmServer};
pub use types::{
    Attribute, ChannelAttribute, ChannelMember, Operation, ServiceError, ServiceNotification,
    UserAttributes,
};

mod client;
mod memory;
mod types;
