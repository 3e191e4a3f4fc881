use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::events::{EventPayload, PersistLevel};
use super::handler::DispatchError;

/// Value of `feat` on messages produced by the waiting room service
pub const WAITING_ROOM_FEATURE: &str = "WAITING_ROOM";
pub const WAITING_ROOM_REQUEST: &str = "WAITING_ROOM_REQUEST";
pub const WAITING_ROOM_RESPONSE: &str = "WAITING_ROOM_RESPONSE";

/// Source tag attached to envelopes built by the bridge itself
const CORE_SOURCE: &str = "core";

/// Approval state of the local participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitingRoomStatus {
    #[default]
    NotRequested,
    Requested,
    Approved,
    Rejected,
}

#[derive(Debug, Deserialize)]
struct ServiceMessage {
    etyp: String,
    #[serde(default)]
    data: ServiceMessageData,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceMessageData {
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize, Serialize)]
struct RequestPayload {
    #[serde(default)]
    attendee_uid: Value,
    #[serde(default)]
    attendee_screenshare_uid: Value,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(default)]
    approved: Value,
    #[serde(default)]
    channel_name: Value,
    #[serde(default, rename = "mainUser")]
    main_user: Value,
    #[serde(default, rename = "screenShare")]
    screen_share: Value,
    #[serde(default)]
    whiteboard: Value,
    #[serde(default)]
    chat: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePayload {
    approved: Value,
    channel_name: Value,
    main_user: Value,
    screen_share: Value,
    whiteboard: Value,
    #[serde(skip_serializing_if = "Value::is_null")]
    chat: Value,
}

/// True if a decoded message was produced by the waiting room service
pub fn is_waiting_room_message(message: &Value) -> bool {
    message.get("feat").and_then(Value::as_str) == Some(WAITING_ROOM_FEATURE)
}

/// Rewrite a waiting room service message into the canonical event form.
///
/// The resulting value is an envelope whose `payload` is itself a JSON
/// string, matching what other clients emit for the same events.
pub fn to_event_payload(message: Value) -> Result<EventPayload, DispatchError> {
    let message: ServiceMessage =
        serde_json::from_value(message).map_err(|e| DispatchError::MalformedJson(e.to_string()))?;

    let (event_name, payload) = match message.etyp.as_str() {
        "REQUEST" => {
            let request: RequestPayload = serde_json::from_value(message.data.data)
                .map_err(|e| DispatchError::MalformedJson(e.to_string()))?;
            (WAITING_ROOM_REQUEST, serialize(&request)?)
        }
        "RESPONSE" => {
            let response: ResponseData = serde_json::from_value(message.data.data)
                .map_err(|e| DispatchError::MalformedJson(e.to_string()))?;
            let payload = ResponsePayload {
                approved: response.approved,
                channel_name: response.channel_name,
                main_user: response.main_user,
                screen_share: response.screen_share,
                whiteboard: response.whiteboard,
                chat: response.chat,
            };
            (WAITING_ROOM_RESPONSE, serialize(&payload)?)
        }
        other => return Err(DispatchError::UnknownWaitingRoomType(other.to_string())),
    };

    let envelope = json!({
        "evt": event_name,
        "payload": payload,
        "persistLevel": u8::from(PersistLevel::None),
        "source": CORE_SOURCE,
    });

    Ok(EventPayload::new(event_name, envelope.to_string()))
}

fn serialize<T: Serialize>(value: &T) -> Result<String, DispatchError> {
    serde_json::to_string(value).map_err(|e| DispatchError::MalformedJson(e.to_string()))
}
