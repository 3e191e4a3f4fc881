use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use strum_macros::EnumIter;

use super::handler::DispatchError;
use crate::utils::Uid;

/// Participant display-name announcement
pub const NAME_EVENT: &str = "name";

/// How far an event should be mirrored into service attributes
///
/// Carried on the wire as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PersistLevel {
    /// Fire and forget
    #[default]
    None = 1,
    Sender = 2,
    /// Mirrored into the sender's user attributes so late joiners replay it
    Session = 3,
    Channel = 4,
}

impl TryFrom<u8> for PersistLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PersistLevel::None),
            2 => Ok(PersistLevel::Sender),
            3 => Ok(PersistLevel::Session),
            4 => Ok(PersistLevel::Channel),
            other => Err(format!("unknown persist level {}", other)),
        }
    }
}

impl From<PersistLevel> for u8 {
    fn from(level: PersistLevel) -> Self {
        level as u8
    }
}

/// Control messages exchanged between participants, keyed by event name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum ControlMessage {
    MuteVideo,
    MuteAudio,
    MuteSingleVideo,
    MuteSingleAudio,
    KickUser,
    RequestVideo,
    RequestAudio,
    KickScreenshare,
}

impl ControlMessage {
    /// Event name used on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            ControlMessage::MuteVideo => "1",
            ControlMessage::MuteAudio => "2",
            ControlMessage::MuteSingleVideo => "3",
            ControlMessage::MuteSingleAudio => "4",
            ControlMessage::KickUser => "5",
            ControlMessage::RequestVideo => "6",
            ControlMessage::RequestAudio => "7",
            ControlMessage::KickScreenshare => "8",
        }
    }

    /// Mute commands that must not reach an unapproved attendee
    pub fn is_mute(&self) -> bool {
        matches!(self, ControlMessage::MuteAudio | ControlMessage::MuteVideo)
    }
}

impl TryFrom<&str> for ControlMessage {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "1" => Ok(ControlMessage::MuteVideo),
            "2" => Ok(ControlMessage::MuteAudio),
            "3" => Ok(ControlMessage::MuteSingleVideo),
            "4" => Ok(ControlMessage::MuteSingleAudio),
            "5" => Ok(ControlMessage::KickUser),
            "6" => Ok(ControlMessage::RequestVideo),
            "7" => Ok(ControlMessage::RequestAudio),
            "8" => Ok(ControlMessage::KickScreenshare),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

/// Raw event as received: a name and its still-encoded value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "evt")]
    pub event_name: String,
    pub value: String,
}

impl EventPayload {
    pub fn new(event_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            value: value.into(),
        }
    }
}

/// Event waiting for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    pub payload: EventPayload,
    pub sender_uid: Uid,
    pub timestamp: i64,
}

/// Decoded event value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub persist_level: PersistLevel,
    #[serde(default)]
    pub source: String,
}

impl EventEnvelope {
    pub fn parse(event_name: &str, value: &str) -> Result<Self, DispatchError> {
        serde_json::from_str(value).map_err(|e| DispatchError::MalformedEnvelope {
            event: event_name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeEvent {
    pub event_name: String,
    pub source: String,
    pub payload: Value,
    pub persist_level: PersistLevel,
    pub sender_uid: Uid,
    pub timestamp: i64,
}

impl BridgeEvent {
    pub fn is_name_announcement(&self) -> bool {
        self.event_name == NAME_EVENT
    }
}

/// In-process notices raised by the bridge outside the event pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    /// The local participant joined the channel
    Joined { channel: String },
    /// A remote participant left the channel
    MemberLeft { uid: Uid },
    /// Converted pages published by the whiteboard upload service
    WhiteboardFileUpload { images: Value },
}
