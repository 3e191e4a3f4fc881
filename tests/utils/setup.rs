#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use rtm_bridge::{
    rtm::Operation, BridgeConfig, InMemoryRtmClient, InMemoryRtmServer, LocalIdentity,
    RealtimeEventBridge, Subscription,
};

use super::mocks::{RecordingSink, RecordingSubscriber};

pub const CHANNEL: &str = "room-123";
pub const LOCAL_UID: u32 = 100;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub server: InMemoryRtmServer,
    pub client: Arc<InMemoryRtmClient>,
    pub bridge: RealtimeEventBridge,
    pub sink: RecordingSink,
    pub subscriber: RecordingSubscriber,
    pub identity: LocalIdentity,
    _subscription: Subscription,
}

pub struct TestSetupBuilder {
    server: InMemoryRtmServer,
    config: BridgeConfig,
    identity: LocalIdentity,
    members: Vec<(String, Vec<(String, String)>)>,
    delayed: Vec<(String, u32)>,
    failures: Vec<(Operation, u32)>,
    channel_attributes: Vec<(String, String, String)>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            server: InMemoryRtmServer::new(),
            config: BridgeConfig::default(),
            identity: LocalIdentity::new(LOCAL_UID, LOCAL_UID + 1000, false),
            members: vec![],
            delayed: vec![],
            failures: vec![],
            channel_attributes: vec![],
        }
    }

    /// Share a messaging server with another setup
    pub fn on_server(mut self, server: &InMemoryRtmServer) -> Self {
        self.server = server.clone();
        self
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.identity = LocalIdentity::new(uid, uid + 1000, self.identity.is_host);
        self
    }

    pub fn as_host(mut self) -> Self {
        self.identity.is_host = true;
        self
    }

    pub fn with_waiting_room(mut self) -> Self {
        self.config.waiting_room_enabled = true;
        self
    }

    /// Remote participant already present when the bridge starts
    pub fn with_member(mut self, uid: &str, attributes: &[(&str, &str)]) -> Self {
        let attributes = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.members.push((uid.to_string(), attributes));
        self
    }

    /// Member whose attributes read back empty `reads` times
    pub fn with_delayed_member(mut self, uid: &str, reads: u32) -> Self {
        self.delayed.push((uid.to_string(), reads));
        self
    }

    pub fn with_channel_attribute(mut self, key: &str, value: &str, by_user: &str) -> Self {
        self.channel_attributes
            .push((key.to_string(), value.to_string(), by_user.to_string()));
        self
    }

    /// Fail the next `times` calls of `operation` made by the bridge
    pub fn failing(mut self, operation: Operation, times: u32) -> Self {
        self.failures.push((operation, times));
        self
    }

    pub fn build(self) -> TestSetup {
        for (uid, attributes) in &self.members {
            let pairs: Vec<(&str, &str)> = attributes
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            self.server.add_member(CHANNEL, uid, &pairs);
        }
        for (uid, reads) in &self.delayed {
            self.server.delay_attributes(uid, *reads);
        }
        for (key, value, by_user) in &self.channel_attributes {
            self.server.set_channel_attribute(CHANNEL, key, value, by_user);
        }

        let client = Arc::new(self.server.client());
        for (operation, times) in &self.failures {
            client.fail_next(*operation, *times);
        }

        let sink = RecordingSink::new();
        let subscriber = RecordingSubscriber::new();
        let bridge = RealtimeEventBridge::new(client.clone(), Arc::new(sink.clone()), self.config);
        let subscription = bridge.add_handler(Arc::new(subscriber.clone()));

        TestSetup {
            server: self.server,
            client,
            bridge,
            sink,
            subscriber,
            identity: self.identity,
            _subscription: subscription,
        }
    }
}

impl TestSetup {
    pub fn start(&self) {
        self.bridge
            .start(self.identity.clone(), CHANNEL, "test-token");
    }

    /// Start and wait until every queued event has been dispatched
    pub async fn start_and_sync(&self) {
        self.start();
        assert!(self.bridge.ready().await, "bridge should become ready");
        settle().await;
        assert!(self.bridge.initial_sync_complete());
    }

    pub fn peer_message(&self, from: &str, text: &str) {
        self.server
            .send_peer_message(from, &self.identity.uid.to_string(), text);
    }

    pub fn channel_message(&self, from: &str, text: &str) {
        self.server.send_channel_message(CHANNEL, from, text);
    }
}

/// Let every runnable task finish without firing pending retry timers
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Event value as other clients encode it
pub fn envelope(payload: Value, persist_level: u8) -> String {
    json!({"payload": payload, "persistLevel": persist_level, "source": "core"}).to_string()
}

/// Peer or channel message text carrying one event
pub fn event_message(event_name: &str, value: &str) -> String {
    json!({"evt": event_name, "value": value}).to_string()
}
