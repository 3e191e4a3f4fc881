use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::client::MessagingClient;
use super::types::{
    Attribute, ChannelAttribute, ChannelMember, Operation, ServiceError, ServiceNotification,
    UserAttributes,
};
use crate::utils::time_now;

/// A call observed by an in-memory client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub operation: Operation,
    pub at: Instant,
}

#[derive(Default)]
struct ClientRecord {
    uid: Option<String>,
    channel: Option<String>,
    listeners: Vec<mpsc::UnboundedSender<ServiceNotification>>,
    failures: HashMap<Operation, u32>,
    calls: Vec<CallRecord>,
}

#[derive(Default)]
struct ChannelRecord {
    members: Vec<String>,
    attributes: BTreeMap<String, ChannelAttribute>,
}

#[derive(Default)]
struct ServerState {
    next_client_id: usize,
    clients: HashMap<usize, ClientRecord>,
    users: HashMap<String, BTreeMap<String, String>>,
    channels: HashMap<String, ChannelRecord>,
    /// uid -> number of attribute reads that still report nothing
    pending_attribute_reads: HashMap<String, u32>,
}

impl ServerState {
    /// Deliver a notification to every client bound to `channel`
    fn notify_channel(
        &mut self,
        channel: &str,
        except_client: Option<usize>,
        notification: ServiceNotification,
    ) {
        for (id, client) in self.clients.iter_mut() {
            if Some(*id) == except_client || client.channel.as_deref() != Some(channel) {
                continue;
            }
            client
                .listeners
                .retain(|listener| listener.send(notification.clone()).is_ok());
        }
    }

    fn notify_user(&mut self, uid: &str, notification: ServiceNotification) {
        for client in self.clients.values_mut() {
            if client.uid.as_deref() != Some(uid) {
                continue;
            }
            client
                .listeners
                .retain(|listener| listener.send(notification.clone()).is_ok());
        }
    }
}

/// In-process messaging service shared by any number of clients
///
/// Members can also be added without a client, standing in for remote
/// participants whose only footprint is presence and attributes.
#[derive(Clone, Default)]
pub struct InMemoryRtmServer {
    state: Arc<Mutex<ServerState>>,
}

impl InMemoryRtmServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new client connection to this server
    pub fn client(&self) -> InMemoryRtmClient {
        let mut state = self.lock();
        let id = state.next_client_id;
        state.next_client_id += 1;
        state.clients.insert(id, ClientRecord::default());
        debug!(client_id = id, "Created in-memory messaging client");

        InMemoryRtmClient {
            id,
            server: self.clone(),
        }
    }

    /// Add a remote member that has no client of its own
    pub fn add_member(&self, channel: &str, uid: &str, attributes: &[(&str, &str)]) {
        let mut state = self.lock();
        state.users.insert(
            uid.to_string(),
            attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );

        let record = state.channels.entry(channel.to_string()).or_default();
        if !record.members.iter().any(|m| m == uid) {
            record.members.push(uid.to_string());
        }

        state.notify_channel(
            channel,
            None,
            ServiceNotification::MemberJoined {
                uid: uid.to_string(),
                channel: channel.to_string(),
            },
        );
        info!(channel = %channel, uid = %uid, "Remote member added");
    }

    /// Remove a remote member from a channel
    pub fn remove_member(&self, channel: &str, uid: &str) {
        let mut state = self.lock();
        if let Some(record) = state.channels.get_mut(channel) {
            record.members.retain(|m| m != uid);
        }
        state.notify_channel(
            channel,
            None,
            ServiceNotification::MemberLeft {
                uid: uid.to_string(),
                channel: channel.to_string(),
            },
        );
    }

    /// Report empty attributes for `uid` on the next `reads` fetches
    pub fn delay_attributes(&self, uid: &str, reads: u32) {
        self.lock()
            .pending_attribute_reads
            .insert(uid.to_string(), reads);
    }

    pub fn set_channel_attribute(&self, channel: &str, key: &str, value: &str, by_user: &str) {
        let mut state = self.lock();
        let attribute = ChannelAttribute {
            key: key.to_string(),
            value: value.to_string(),
            last_update_ts: Some(time_now()),
            last_update_user_id: by_user.to_string(),
        };
        state
            .channels
            .entry(channel.to_string())
            .or_default()
            .attributes
            .insert(key.to_string(), attribute.clone());

        state.notify_channel(
            channel,
            None,
            ServiceNotification::ChannelAttributesUpdated {
                channel: channel.to_string(),
                attributes: vec![attribute],
            },
        );
    }

    pub fn send_peer_message(&self, from: &str, to: &str, text: &str) {
        self.lock().notify_user(
            to,
            ServiceNotification::PeerMessage {
                peer_id: from.to_string(),
                text: text.to_string(),
                ts: Some(time_now()),
            },
        );
    }

    pub fn send_channel_message(&self, channel: &str, from: &str, text: &str) {
        self.lock().notify_channel(
            channel,
            None,
            ServiceNotification::ChannelMessage {
                uid: from.to_string(),
                channel: channel.to_string(),
                text: text.to_string(),
                ts: Some(time_now()),
            },
        );
    }

    pub fn user_attributes(&self, uid: &str) -> BTreeMap<String, String> {
        self.lock().users.get(uid).cloned().unwrap_or_default()
    }

    pub fn channel_members(&self, channel: &str) -> Vec<String> {
        self.lock()
            .channels
            .get(channel)
            .map(|record| record.members.clone())
            .unwrap_or_default()
    }
}

/// One client connection to an [`InMemoryRtmServer`]
pub struct InMemoryRtmClient {
    id: usize,
    server: InMemoryRtmServer,
}

impl InMemoryRtmClient {
    /// Make the next `times` calls of `operation` fail
    pub fn fail_next(&self, operation: Operation, times: u32) {
        let mut state = self.server.lock();
        if let Some(client) = state.clients.get_mut(&self.id) {
            client.failures.insert(operation, times);
        }
    }

    /// All calls made through this client, in order
    pub fn calls(&self) -> Vec<CallRecord> {
        self.server
            .lock()
            .clients
            .get(&self.id)
            .map(|client| client.calls.clone())
            .unwrap_or_default()
    }

    pub fn calls_for(&self, operation: Operation) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation == operation)
            .collect()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls_for(operation).len()
    }

    /// Record the call and consume an injected failure if one is pending
    fn begin<'a>(
        &self,
        state: &'a mut ServerState,
        operation: Operation,
    ) -> Result<&'a mut ClientRecord, ServiceError> {
        let client = state
            .clients
            .get_mut(&self.id)
            .ok_or_else(|| ServiceError::Unavailable("client closed".to_string()))?;

        client.calls.push(CallRecord {
            operation,
            at: Instant::now(),
        });

        if let Some(remaining) = client.failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                warn!(client_id = self.id, operation = %operation, "Injected failure");
                return Err(ServiceError::Injected(operation));
            }
        }

        Ok(client)
    }

    fn logged_in_uid(client: &ClientRecord) -> Result<String, ServiceError> {
        client.uid.clone().ok_or(ServiceError::NotLoggedIn)
    }

    fn leave_locked(state: &mut ServerState, client_id: usize, uid: &str, channel: &str) {
        if let Some(record) = state.channels.get_mut(channel) {
            record.members.retain(|m| m != uid);
        }
        if let Some(client) = state.clients.get_mut(&client_id) {
            client.channel = None;
        }
        state.notify_channel(
            channel,
            Some(client_id),
            ServiceNotification::MemberLeft {
                uid: uid.to_string(),
                channel: channel.to_string(),
            },
        );
    }
}

#[async_trait]
impl MessagingClient for InMemoryRtmClient {
    #[instrument(skip(self, token))]
    async fn login(&self, uid: &str, token: &str) -> Result<(), ServiceError> {
        let mut state = self.server.lock();
        let client = self.begin(&mut state, Operation::Login)?;

        if token.is_empty() {
            return Err(ServiceError::Unauthorized("empty token".to_string()));
        }

        client.uid = Some(uid.to_string());
        state.users.entry(uid.to_string()).or_default();
        debug!(uid = %uid, "Logged in");
        Ok(())
    }

    #[instrument(skip(self, attributes))]
    async fn set_local_attributes(&self, attributes: &[Attribute]) -> Result<(), ServiceError> {
        let mut state = self.server.lock();
        let client = self.begin(&mut state, Operation::SetLocalAttributes)?;
        let uid = Self::logged_in_uid(client)?;

        let map = attributes
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect();
        state.users.insert(uid, map);
        Ok(())
    }

    #[instrument(skip(self, attributes))]
    async fn add_or_update_local_attributes(
        &self,
        attributes: &[Attribute],
    ) -> Result<(), ServiceError> {
        let mut state = self.server.lock();
        let client = self.begin(&mut state, Operation::AddOrUpdateLocalAttributes)?;
        let uid = Self::logged_in_uid(client)?;

        let map = state.users.entry(uid).or_default();
        for attribute in attributes {
            map.insert(attribute.key.clone(), attribute.value.clone());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn join_channel(&self, channel: &str) -> Result<(), ServiceError> {
        let mut state = self.server.lock();
        let client = self.begin(&mut state, Operation::JoinChannel)?;
        let uid = Self::logged_in_uid(client)?;
        client.channel = Some(channel.to_string());

        let record = state.channels.entry(channel.to_string()).or_default();
        if !record.members.contains(&uid) {
            record.members.push(uid.clone());
        }

        state.notify_channel(
            channel,
            Some(self.id),
            ServiceNotification::MemberJoined {
                uid,
                channel: channel.to_string(),
            },
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn leave_channel(&self, channel: &str) -> Result<(), ServiceError> {
        let mut state = self.server.lock();
        let client = self.begin(&mut state, Operation::LeaveChannel)?;
        let uid = Self::logged_in_uid(client)?;
        if client.channel.as_deref() != Some(channel) {
            return Err(ServiceError::NotInChannel(channel.to_string()));
        }

        Self::leave_locked(&mut state, self.id, &uid, channel);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_channel_members(&self, channel: &str) -> Result<Vec<ChannelMember>, ServiceError> {
        let mut state = self.server.lock();
        let client = self.begin(&mut state, Operation::GetChannelMembers)?;
        Self::logged_in_uid(client)?;

        let record = state
            .channels
            .get(channel)
            .ok_or_else(|| ServiceError::NotInChannel(channel.to_string()))?;

        Ok(record
            .members
            .iter()
            .map(|uid| ChannelMember { uid: uid.clone() })
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_user_attributes(&self, uid: &str) -> Result<UserAttributes, ServiceError> {
        let mut state = self.server.lock();
        let client = self.begin(&mut state, Operation::GetUserAttributes)?;
        Self::logged_in_uid(client)?;

        if let Some(remaining) = state.pending_attribute_reads.get_mut(uid) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(UserAttributes {
                    uid: uid.to_string(),
                    attributes: BTreeMap::new(),
                });
            }
        }

        Ok(UserAttributes {
            uid: uid.to_string(),
            attributes: state.users.get(uid).cloned().unwrap_or_default(),
        })
    }

    #[instrument(skip(self))]
    async fn get_channel_attributes(
        &self,
        channel: &str,
    ) -> Result<Vec<ChannelAttribute>, ServiceError> {
        let mut state = self.server.lock();
        let client = self.begin(&mut state, Operation::GetChannelAttributes)?;
        Self::logged_in_uid(client)?;

        Ok(state
            .channels
            .get(channel)
            .map(|record| record.attributes.values().cloned().collect())
            .unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<(), ServiceError> {
        let mut state = self.server.lock();
        let client = self.begin(&mut state, Operation::Logout)?;
        let uid = Self::logged_in_uid(client)?;
        let channel = client.channel.take();
        client.uid = None;

        if let Some(channel) = channel {
            Self::leave_locked(&mut state, self.id, &uid, &channel);
        }
        state.users.remove(&uid);
        debug!(uid = %uid, "Logged out");
        Ok(())
    }

    fn notifications(&self) -> mpsc::UnboundedReceiver<ServiceNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.server.lock();
        if let Some(client) = state.clients.get_mut(&self.id) {
            client.listeners.push(tx);
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn logged_in(server: &InMemoryRtmServer, uid: &str) -> InMemoryRtmClient {
        let client = server.client();
        client.login(uid, "token").await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_login_rejects_empty_token() {
        let server = InMemoryRtmServer::new();
        let client = server.client();

        let result = client.login("100", "").await;

        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_operations_require_login() {
        let server = InMemoryRtmServer::new();
        let client = server.client();

        let result = client.join_channel("room").await;

        assert_eq!(result, Err(ServiceError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let server = InMemoryRtmServer::new();
        let client = server.client();
        client.fail_next(Operation::Login, 2);

        assert!(client.login("100", "token").await.is_err());
        assert!(client.login("100", "token").await.is_err());
        assert!(client.login("100", "token").await.is_ok());
        assert_eq!(client.call_count(Operation::Login), 3);
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members() {
        let server = InMemoryRtmServer::new();
        let alice = logged_in(&server, "100").await;
        alice.join_channel("room").await.unwrap();
        let mut alice_events = alice.notifications();

        let bob = logged_in(&server, "200").await;
        bob.join_channel("room").await.unwrap();

        let event = alice_events.recv().await.unwrap();
        assert_eq!(
            event,
            ServiceNotification::MemberJoined {
                uid: "200".to_string(),
                channel: "room".to_string()
            }
        );
        assert_eq!(server.channel_members("room"), vec!["100", "200"]);
    }

    #[tokio::test]
    async fn test_delayed_attributes_report_empty_first() {
        let server = InMemoryRtmServer::new();
        server.add_member("room", "300", &[("screenUid", "3001")]);
        server.delay_attributes("300", 1);
        let client = logged_in(&server, "100").await;

        let first = client.get_user_attributes("300").await.unwrap();
        let second = client.get_user_attributes("300").await.unwrap();

        assert!(!first.is_populated());
        assert!(second.is_populated());
    }

    #[tokio::test]
    async fn test_add_or_update_merges_attributes() {
        let server = InMemoryRtmServer::new();
        let client = logged_in(&server, "100").await;
        client
            .set_local_attributes(&[Attribute::new("screenUid", "1001")])
            .await
            .unwrap();

        client
            .add_or_update_local_attributes(&[Attribute::new("name", "{}")])
            .await
            .unwrap();

        let attributes = server.user_attributes("100");
        assert_eq!(attributes.get("screenUid").map(String::as_str), Some("1001"));
        assert_eq!(attributes.get("name").map(String::as_str), Some("{}"));
    }

    #[tokio::test]
    async fn test_logout_leaves_channel_and_clears_attributes() {
        let server = InMemoryRtmServer::new();
        let client = logged_in(&server, "100").await;
        client.join_channel("room").await.unwrap();

        client.logout().await.unwrap();

        assert!(server.channel_members("room").is_empty());
        assert!(server.user_attributes("100").is_empty());
    }
}
