use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::retry::{BackoffPolicy, Jitter};
use crate::utils::Uid;

const ENV_PREFIX: &str = "RTM_BRIDGE_";

/// Uid the whiteboard upload service publishes converted pages from
pub const WHITEBOARD_UPLOADER_UID: Uid = 1010101;

/// Bridge feature flags and timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub waiting_room_enabled: bool,
    /// Connect as soon as the call screen is shown rather than on demand
    pub auto_connect: bool,
    pub initial_retry_delay: Duration,
    /// Ceiling for the per-step doubling delay; unbounded when absent
    pub max_retry_delay: Option<Duration>,
    pub member_backoff: BackoffPolicy,
    pub name_redispatch_delay: Duration,
    pub whiteboard_uploader_uid: Uid,
    pub recording_bot_uid: Option<Uid>,
    /// Capacity of the broadcast streams handed to async subscribers
    pub event_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            waiting_room_enabled: false,
            auto_connect: true,
            initial_retry_delay: Duration::from_secs(5),
            max_retry_delay: None,
            member_backoff: BackoffPolicy::default(),
            name_redispatch_delay: Duration::from_millis(200),
            whiteboard_uploader_uid: WHITEBOARD_UPLOADER_UID,
            recording_bot_uid: None,
            event_buffer: 256,
        }
    }
}

impl BridgeConfig {
    /// Build a config from `RTM_BRIDGE_*` environment variables.
    ///
    /// Unset variables keep their default; unparsable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = parse(&read, "WAITING_ROOM_ENABLED") {
            config.waiting_room_enabled = v;
        }
        if let Some(v) = parse(&read, "AUTO_CONNECT") {
            config.auto_connect = v;
        }
        if let Some(ms) = parse::<u64, _>(&read, "INITIAL_RETRY_DELAY_MS") {
            config.initial_retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&read, "MAX_RETRY_DELAY_MS") {
            config.max_retry_delay = Some(Duration::from_millis(ms));
        }
        if let Some(v) = parse(&read, "MEMBER_MAX_ATTEMPTS") {
            config.member_backoff.max_attempts = v;
        }
        if let Some(ms) = parse::<u64, _>(&read, "MEMBER_INITIAL_DELAY_MS") {
            config.member_backoff.initial_delay = Duration::from_millis(ms);
        }
        if let Some(true) = parse::<bool, _>(&read, "MEMBER_JITTER") {
            config.member_backoff.jitter = Jitter::Full;
        }
        if let Some(ms) = parse::<u64, _>(&read, "NAME_REDISPATCH_DELAY_MS") {
            config.name_redispatch_delay = Duration::from_millis(ms);
        }
        if let Some(v) = parse(&read, "WHITEBOARD_UPLOADER_UID") {
            config.whiteboard_uploader_uid = v;
        }
        if let Some(v) = parse(&read, "RECORDING_BOT_UID") {
            config.recording_bot_uid = Some(v);
        }
        if let Some(v) = parse(&read, "EVENT_BUFFER") {
            config.event_buffer = v;
        }

        config
    }

    /// Whether the call screen should bring the bridge online right away.
    ///
    /// With a waiting room an attendee connects before the call is active so
    /// it can request approval, while a host waits for auto-connect or an
    /// active call.
    pub fn should_connect(&self, is_host: bool, call_active: bool) -> bool {
        if self.waiting_room_enabled && !is_host {
            return !call_active;
        }
        self.auto_connect || call_active
    }
}

fn parse<T, F>(read: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = read(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = %format!("{}{}", ENV_PREFIX, name), value = %raw, "Ignoring invalid config value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> BridgeConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{}{}", ENV_PREFIX, k), v.to_string()))
            .collect();
        BridgeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();

        assert_eq!(config.initial_retry_delay, Duration::from_secs(5));
        assert_eq!(config.max_retry_delay, None);
        assert_eq!(config.name_redispatch_delay, Duration::from_millis(200));
        assert_eq!(config.whiteboard_uploader_uid, 1010101);
        assert_eq!(config.member_backoff.max_attempts, 10);
        assert!(!config.waiting_room_enabled);
    }

    #[test]
    fn test_lookup_overrides_defaults() {
        let config = from_pairs(&[
            ("WAITING_ROOM_ENABLED", "true"),
            ("INITIAL_RETRY_DELAY_MS", "250"),
            ("MAX_RETRY_DELAY_MS", "60000"),
            ("MEMBER_JITTER", "true"),
            ("RECORDING_BOT_UID", "999"),
        ]);

        assert!(config.waiting_room_enabled);
        assert_eq!(config.initial_retry_delay, Duration::from_millis(250));
        assert_eq!(config.max_retry_delay, Some(Duration::from_secs(60)));
        assert_eq!(config.member_backoff.jitter, Jitter::Full);
        assert_eq!(config.recording_bot_uid, Some(999));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_pairs(&[("AUTO_CONNECT", "sometimes"), ("EVENT_BUFFER", "-1")]);

        assert_eq!(config, BridgeConfig::default());
    }

    #[rstest]
    // waiting room: attendees connect early, hosts follow auto-connect
    #[case(true, false, false, false, true)]
    #[case(true, false, false, true, false)]
    #[case(true, false, true, false, false)]
    #[case(true, false, true, true, true)]
    #[case(true, true, true, false, true)]
    // no waiting room
    #[case(false, true, false, false, true)]
    #[case(false, false, false, false, false)]
    #[case(false, false, false, true, true)]
    fn test_should_connect(
        #[case] waiting_room_enabled: bool,
        #[case] auto_connect: bool,
        #[case] is_host: bool,
        #[case] call_active: bool,
        #[case] expected: bool,
    ) {
        let config = BridgeConfig {
            waiting_room_enabled,
            auto_connect,
            ..BridgeConfig::default()
        };

        assert_eq!(config.should_connect(is_host, call_active), expected);
    }
}
