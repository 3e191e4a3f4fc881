use rtm_bridge::{
    participant::TracingRenderListSink, BridgeConfig, InMemoryRtmServer, LocalIdentity,
    MessagingClient, RealtimeEventBridge,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CHANNEL: &str = "demo-room";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtm_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BridgeConfig::from_env();
    info!(config = ?config, "Starting realtime bridge demo");

    // A remote host already in the call, with a persisted name announcement
    let server = InMemoryRtmServer::new();
    let name = json!({"payload": "Host", "persistLevel": 3, "source": "core"}).to_string();
    server.add_member(
        CHANNEL,
        "1001",
        &[("screenUid", "2001"), ("isHost", "true"), ("name", name.as_str())],
    );

    let client: Arc<dyn MessagingClient> = Arc::new(server.client());
    let bridge = RealtimeEventBridge::new(client, Arc::new(TracingRenderListSink), config);
    let _subscription = bridge.on_event(|event| {
        info!(
            event_name = %event.event_name,
            sender_uid = event.sender_uid,
            payload = %event.payload,
            "Event received"
        );
    });

    bridge.start(LocalIdentity::new(1002, 2002, false), CHANNEL, "demo-token");

    match tokio::time::timeout(Duration::from_secs(15), bridge.ready()).await {
        Ok(true) => {
            let raise_hand = json!({
                "evt": "raise-hand",
                "value": json!({"payload": {"raised": true}, "persistLevel": 1}).to_string(),
            });
            server.send_channel_message(CHANNEL, "1001", &raise_hand.to_string());
            tokio::time::sleep(Duration::from_millis(500)).await;
            info!(online = bridge.online_users_count(), "Demo finished");
        }
        Ok(false) => warn!("Bridge stopped before becoming ready"),
        Err(_) => warn!("Timed out waiting for the bridge"),
    }

    bridge.stop().await;
}
