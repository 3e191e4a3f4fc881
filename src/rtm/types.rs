use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumIter};
use thiserror::Error;

/// Key/value pair stored against a user or a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Member entry returned by a channel member listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMember {
    pub uid: String,
}

/// Attributes published by a single user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttributes {
    pub uid: String,
    pub attributes: BTreeMap<String, String>,
}

impl UserAttributes {
    /// A user that joined but has not published yet reports an empty map,
    /// or keys with empty values while the write is still propagating.
    pub fn is_populated(&self) -> bool {
        !self.attributes.is_empty() && self.attributes.values().all(|v| !v.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Shared channel-level attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAttribute {
    pub key: String,
    pub value: String,
    pub last_update_ts: Option<i64>,
    pub last_update_user_id: String,
}

/// Callbacks raised by the messaging service, delivered over a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceNotification {
    MemberJoined {
        uid: String,
        channel: String,
    },
    MemberLeft {
        uid: String,
        channel: String,
    },
    ChannelAttributesUpdated {
        channel: String,
        attributes: Vec<ChannelAttribute>,
    },
    PeerMessage {
        peer_id: String,
        text: String,
        ts: Option<i64>,
    },
    ChannelMessage {
        uid: String,
        channel: String,
        text: String,
        ts: Option<i64>,
    },
}

impl ServiceNotification {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceNotification::MemberJoined { .. } => "member_joined",
            ServiceNotification::MemberLeft { .. } => "member_left",
            ServiceNotification::ChannelAttributesUpdated { .. } => "channel_attributes_updated",
            ServiceNotification::PeerMessage { .. } => "peer_message",
            ServiceNotification::ChannelMessage { .. } => "channel_message",
        }
    }
}

/// Messaging service operations, used for logging and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Login,
    SetLocalAttributes,
    JoinChannel,
    LeaveChannel,
    GetChannelMembers,
    GetUserAttributes,
    GetChannelAttributes,
    AddOrUpdateLocalAttributes,
    Logout,
}

/// Errors reported by the messaging service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Not a member of channel: {0}")]
    NotInChannel(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Attributes not yet populated for user: {0}")]
    AttributesNotReady(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Injected failure for {0}")]
    Injected(Operation),
}
