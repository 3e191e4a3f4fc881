use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::service::BridgeInner;
use super::state::ConnectionState;
use crate::event::{EventPayload, LocalEvent, QueuedEvent};
use crate::participant::{ParticipantAttributes, ParticipantUpdate, RenderListAction};
use crate::retry::SyncStep;
use crate::rtm::{ServiceError, UserAttributes};
use crate::shared::BridgeError;
use crate::utils::{has_json_structure, message_time, time_now, uid_from_wire, Uid};

/// Connection driver, spawned by `start()`
pub(super) async fn drive(inner: Arc<BridgeInner>) {
    match connect(&inner).await {
        Ok(()) => {}
        Err(BridgeError::Destroyed) => debug!("Connection abandoned, bridge destroyed"),
        Err(e) => error!(source = "rtm", category = "log", error = %e, "Connection failed"),
    }
}

async fn connect(inner: &Arc<BridgeInner>) -> Result<(), BridgeError> {
    let (identity, channel, token) = {
        let session = inner.session();
        match (&session.identity, &session.channel) {
            (Some(identity), Some(channel)) => {
                (identity.clone(), channel.clone(), session.token.clone())
            }
            _ => return Err(BridgeError::Destroyed),
        }
    };
    let client = &inner.client;

    inner.advance(ConnectionState::LoggingIn)?;
    let uid = identity.uid.to_string();
    let (uid, token) = (uid.as_str(), token.as_str());
    inner
        .retry_step(SyncStep::Login, move || client.login(uid, token))
        .await?;
    inner.session().logged_in = true;
    info!(source = "rtm", category = "log", uid = uid, "Logged in");

    inner.advance(ConnectionState::SettingAttributes)?;
    let attributes = identity.local_attributes();
    let attributes = attributes.as_slice();
    inner
        .retry_step(SyncStep::SetAttributes, move || {
            client.set_local_attributes(attributes)
        })
        .await?;

    inner.advance(ConnectionState::JoiningChannel)?;
    join_channel(inner, &channel).await?;
    sync_members(inner, &channel).await?;
    sync_channel_attributes(inner, &channel).await?;

    inner.advance(ConnectionState::Ready)?;
    info!(source = "rtm", category = "log", channel = %channel, "Bridge ready");

    drain_queue(inner).await;
    Ok(())
}

async fn join_channel(inner: &BridgeInner, channel: &str) -> Result<(), BridgeError> {
    let already_joined = inner.session().joined_channel.as_deref() == Some(channel);
    if already_joined {
        debug!(channel = %channel, "Already joined, skipping join");
        return Ok(());
    }

    let client = &inner.client;
    inner
        .retry_step(SyncStep::JoinChannel, move || client.join_channel(channel))
        .await?;

    {
        let mut session = inner.session();
        session.joined_channel = Some(channel.to_string());
        session.has_joined = true;
    }
    info!(source = "rtm", category = "log", channel = %channel, "Joined channel");
    inner.bus().emit_local(LocalEvent::Joined {
        channel: channel.to_string(),
    });
    Ok(())
}

/// Fetch every current member concurrently and queue the events their
/// attributes carry
async fn sync_members(inner: &BridgeInner, channel: &str) -> Result<(), BridgeError> {
    let client = &inner.client;
    let members = inner
        .retry_step(SyncStep::FetchMembers, move || {
            client.get_channel_members(channel)
        })
        .await?;
    debug!(channel = %channel, members = members.len(), "Fetched channel members");

    join_all(
        members
            .into_iter()
            .map(|member| fetch_member(inner, member.uid, true)),
    )
    .await;
    Ok(())
}

async fn sync_channel_attributes(inner: &BridgeInner, channel: &str) -> Result<(), BridgeError> {
    let client = &inner.client;
    let attributes = inner
        .retry_step(SyncStep::FetchChannelAttributes, move || {
            client.get_channel_attributes(channel)
        })
        .await?;

    let mut session = inner.session();
    for attribute in attributes {
        if !has_json_structure(&attribute.value) {
            continue;
        }
        let Some(sender_uid) = uid_from_wire(&attribute.last_update_user_id) else {
            warn!(
                key = %attribute.key,
                user = %attribute.last_update_user_id,
                "Skipping channel attribute with unknown updater"
            );
            continue;
        };
        session.queue.enqueue(QueuedEvent {
            payload: EventPayload::new(attribute.key, attribute.value),
            sender_uid,
            timestamp: message_time(attribute.last_update_ts),
        });
    }
    debug!(queued = session.queue.len(), "Channel attributes synced");
    Ok(())
}

/// Fetch one member's attributes, retrying while they are not yet
/// populated, then publish the member.
#[instrument(skip(inner))]
pub(super) async fn fetch_member(inner: &BridgeInner, member: String, enqueue: bool) {
    let Some(uid) = uid_from_wire(&member) else {
        warn!(member = %member, "Ignoring member with invalid uid");
        return;
    };

    let client = &inner.client;
    let member_id = member.as_str();
    let result = inner
        .config
        .member_backoff
        .retry(
            "fetch_member_attributes",
            move || async move {
                match client.get_user_attributes(member_id).await {
                    Ok(attributes) if attributes.is_populated() => Ok(attributes),
                    Ok(_) => Err(ServiceError::AttributesNotReady(member_id.to_string())),
                    Err(e) => Err(e),
                }
            },
            || inner.is_destroyed(),
        )
        .await;

    match result {
        Ok(attributes) => apply_member_attributes(inner, uid, &attributes, enqueue),
        Err(_) if inner.is_destroyed() => {}
        Err(e) => warn!(
            source = "rtm",
            category = "api",
            uid = uid,
            error = %e,
            "Giving up on member attributes"
        ),
    }
}

fn apply_member_attributes(
    inner: &BridgeInner,
    uid: Uid,
    attributes: &UserAttributes,
    enqueue: bool,
) {
    let participant =
        ParticipantAttributes::from_user_attributes(uid, attributes, inner.config.recording_bot_uid);
    let screen_share_uid = participant.screen_share_uid;

    let participant = {
        let mut session = inner.session();
        session.roster.upsert(participant);
        if enqueue {
            let now = time_now();
            for (key, value) in attributes.attributes.iter() {
                if has_json_structure(value) {
                    session.queue.enqueue(QueuedEvent {
                        payload: EventPayload::new(key.as_str(), value.as_str()),
                        sender_uid: uid,
                        timestamp: now,
                    });
                }
            }
        }
        session.roster.get(uid).cloned()
    };

    if let Some(participant) = participant {
        inner.sink.dispatch(RenderListAction::UpdateRenderList {
            uid,
            update: ParticipantUpdate::from_participant(&participant),
        });
    }
    if screen_share_uid != 0 {
        inner.sink.dispatch(RenderListAction::UpdateRenderList {
            uid: screen_share_uid,
            update: ParticipantUpdate::screen_share(uid),
        });
    }
}

/// Dispatch everything queued before `Ready`, oldest first
pub(super) async fn drain_queue(inner: &Arc<BridgeInner>) {
    let _lane = inner.dispatch_lane.lock().await;
    let mut drained = 0usize;

    loop {
        if inner.is_destroyed() {
            return;
        }
        let next = inner.session().queue.dequeue();
        let Some(event) = next else {
            break;
        };
        inner.dispatch(event).await;
        drained += 1;
    }

    inner.session().initial_sync_complete = true;
    info!(
        source = "events",
        category = "log",
        drained = drained,
        "Initial sync complete"
    );
}
