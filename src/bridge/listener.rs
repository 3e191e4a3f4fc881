use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::service::BridgeInner;
use super::sync::fetch_member;
use crate::event::{decode_message, DispatchError, EventPayload, LocalEvent, QueuedEvent};
use crate::participant::{ParticipantUpdate, RenderListAction};
use crate::rtm::{ChannelAttribute, ServiceNotification};
use crate::utils::{message_time, uid_from_wire};

/// Consume service notifications until the bridge is stopped
pub(super) async fn listen(
    inner: Arc<BridgeInner>,
    mut notifications: mpsc::UnboundedReceiver<ServiceNotification>,
) {
    while let Some(notification) = notifications.recv().await {
        if inner.is_destroyed() {
            break;
        }
        debug!(kind = notification.kind(), "Service notification");
        handle_notification(&inner, notification).await;
    }
    debug!("Notification listener finished");
}

fn is_bound_channel(inner: &BridgeInner, channel: &str) -> bool {
    inner.session().channel.as_deref() == Some(channel)
}

async fn handle_notification(inner: &Arc<BridgeInner>, notification: ServiceNotification) {
    match notification {
        ServiceNotification::MemberJoined { uid, channel } => {
            if !is_bound_channel(inner, &channel) {
                return;
            }
            info!(source = "rtm", category = "event", uid = %uid, "Member joined");
            let task_inner = Arc::clone(inner);
            inner.spawn_tracked(async move {
                fetch_member(&task_inner, uid, false).await;
            });
        }
        ServiceNotification::MemberLeft { uid, channel } => {
            if !is_bound_channel(inner, &channel) {
                return;
            }
            member_left(inner, &uid);
        }
        ServiceNotification::ChannelAttributesUpdated {
            channel,
            attributes,
        } => {
            if !is_bound_channel(inner, &channel) {
                return;
            }
            for attribute in attributes {
                if let Some(event) = channel_attribute_event(attribute) {
                    inner.route(event).await;
                }
            }
        }
        ServiceNotification::PeerMessage { peer_id, text, ts } => {
            match message_event(&peer_id, &text, ts) {
                Ok(event) => inner.route(event).await,
                Err(e) => error!(
                    source = "rtm",
                    category = "event",
                    peer = %peer_id,
                    error = %e,
                    "Dropping peer message"
                ),
            }
        }
        ServiceNotification::ChannelMessage {
            uid,
            channel,
            text,
            ts,
        } => {
            if uid_from_wire(&uid) == Some(inner.config.whiteboard_uploader_uid) {
                whiteboard_upload(inner, &text);
                return;
            }
            if !is_bound_channel(inner, &channel) {
                return;
            }
            match message_event(&uid, &text, ts) {
                Ok(event) => inner.route(event).await,
                Err(e) => error!(
                    source = "rtm",
                    category = "event",
                    uid = %uid,
                    error = %e,
                    "Dropping channel message"
                ),
            }
        }
    }
}

fn member_left(inner: &BridgeInner, raw_uid: &str) {
    let uid = match uid_from_wire(raw_uid) {
        Some(uid) if uid != 0 => uid,
        _ => {
            debug!(uid = %raw_uid, "Ignoring leave for invalid uid");
            return;
        }
    };

    info!(source = "rtm", category = "event", uid = uid, "Member left");
    inner.bus().emit_local(LocalEvent::MemberLeft { uid });
    inner.session().roster.mark_offline(uid);
    inner.sink.dispatch(RenderListAction::UpdateRenderList {
        uid,
        update: ParticipantUpdate::offline(),
    });
}

fn channel_attribute_event(attribute: ChannelAttribute) -> Option<QueuedEvent> {
    let Some(sender_uid) = uid_from_wire(&attribute.last_update_user_id) else {
        warn!(
            key = %attribute.key,
            user = %attribute.last_update_user_id,
            "Dropping channel attribute with unknown updater"
        );
        return None;
    };

    Some(QueuedEvent {
        payload: EventPayload::new(attribute.key, attribute.value),
        sender_uid,
        timestamp: message_time(attribute.last_update_ts),
    })
}

fn message_event(sender: &str, text: &str, ts: Option<i64>) -> Result<QueuedEvent, DispatchError> {
    let sender_uid =
        uid_from_wire(sender).ok_or_else(|| DispatchError::UnknownSender(sender.to_string()))?;
    let payload = decode_message(text)?;

    Ok(QueuedEvent {
        payload,
        sender_uid,
        timestamp: message_time(ts),
    })
}

fn whiteboard_upload(inner: &BridgeInner, text: &str) {
    let images = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|message| message.pointer("/data/data/images").cloned());

    match images {
        Some(images) => {
            info!(source = "whiteboard", category = "event", "File upload converted");
            inner
                .bus()
                .emit_local(LocalEvent::WhiteboardFileUpload { images });
        }
        None => warn!(source = "whiteboard", category = "event", "Upload message without images"),
    }
}
