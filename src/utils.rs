use chrono::Utc;
use serde_json::Value;

/// Participant identifier as used by the media layer
pub type Uid = u32;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn time_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Resolve a service-provided timestamp, falling back to now when absent
pub fn message_time(ts: Option<i64>) -> i64 {
    match ts {
        Some(ts) if ts > 0 => ts,
        _ => time_now(),
    }
}

/// Returns true when the string parses as a JSON object or array.
///
/// Plain strings, numbers and booleans are ordinary attributes; only
/// structured values carry event state.
pub fn has_json_structure(value: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(value),
        Ok(Value::Object(_)) | Ok(Value::Array(_))
    )
}

/// Convert a wire user id into a 32-bit participant uid.
///
/// The messaging service carries ids as decimal strings that may exceed
/// the 32-bit range; values are truncated to their low 32 bits the same
/// way the media layer does.
pub fn uid_from_wire(raw: &str) -> Option<Uid> {
    raw.trim().parse::<i64>().ok().map(|value| value as u32)
}
