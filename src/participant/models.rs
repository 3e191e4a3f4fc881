use serde::{Deserialize, Serialize};

use crate::rtm::{Attribute, UserAttributes};
use crate::utils::{uid_from_wire, Uid};

/// User attribute carrying the participant's screen-share uid
pub const SCREEN_UID_KEY: &str = "screenUid";
/// User attribute carrying the participant's host flag
pub const IS_HOST_KEY: &str = "isHost";

/// What a render-list entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    Rtc,
    /// Recording/livestream bot
    Bot,
    ScreenShare,
}

/// Identity the local participant connects with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub uid: Uid,
    pub screen_share_uid: Uid,
    pub is_host: bool,
}

impl LocalIdentity {
    pub fn new(uid: Uid, screen_share_uid: Uid, is_host: bool) -> Self {
        Self {
            uid,
            screen_share_uid,
            is_host,
        }
    }

    /// Attributes published so other participants can discover us
    pub fn local_attributes(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(SCREEN_UID_KEY, self.screen_share_uid.to_string()),
            Attribute::new(IS_HOST_KEY, self.is_host.to_string()),
        ]
    }
}

/// Cached state of one participant in the call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantAttributes {
    pub uid: Uid,
    pub screen_share_uid: Uid,
    pub is_host: bool,
    pub last_message_timestamp: i64,
    pub online: bool,
    pub kind: ParticipantKind,
}

impl ParticipantAttributes {
    /// Build an online participant from the attributes it published
    pub fn from_user_attributes(
        uid: Uid,
        attributes: &UserAttributes,
        recording_bot_uid: Option<Uid>,
    ) -> Self {
        let screen_share_uid = attributes
            .get(SCREEN_UID_KEY)
            .and_then(uid_from_wire)
            .unwrap_or_default();
        let is_host = attributes.get(IS_HOST_KEY) == Some("true");
        let kind = if recording_bot_uid == Some(uid) {
            ParticipantKind::Bot
        } else {
            ParticipantKind::Rtc
        };

        Self {
            uid,
            screen_share_uid,
            is_host,
            last_message_timestamp: 0,
            online: true,
            kind,
        }
    }
}

/// Partial participant record published to the render list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantUpdate {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParticipantKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
    #[serde(rename = "screenUid", skip_serializing_if = "Option::is_none")]
    pub screen_share_uid: Option<Uid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_host: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline: Option<bool>,
    #[serde(rename = "lastMessageTimeStamp", skip_serializing_if = "Option::is_none")]
    pub last_message_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_uid: Option<Uid>,
}

impl ParticipantUpdate {
    pub fn from_participant(participant: &ParticipantAttributes) -> Self {
        Self {
            kind: Some(participant.kind),
            uid: Some(participant.uid),
            screen_share_uid: Some(participant.screen_share_uid),
            is_host: Some(participant.is_host),
            offline: Some(!participant.online),
            last_message_timestamp: Some(participant.last_message_timestamp),
            parent_uid: None,
        }
    }

    /// Entry for the screen-share stream owned by `parent_uid`
    pub fn screen_share(parent_uid: Uid) -> Self {
        Self {
            kind: Some(ParticipantKind::ScreenShare),
            parent_uid: Some(parent_uid),
            ..Self::default()
        }
    }

    pub fn offline() -> Self {
        Self {
            offline: Some(true),
            ..Self::default()
        }
    }
}
