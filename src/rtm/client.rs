use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{
    Attribute, ChannelAttribute, ChannelMember, ServiceError, ServiceNotification, UserAttributes,
};

/// Connection to a real-time messaging service
///
/// The bridge drives an implementation of this trait and never reaches for
/// a global SDK handle. Vendor callbacks are surfaced through
/// [`MessagingClient::notifications`] as a message stream instead of
/// registered closures.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Authenticate the local identity
    async fn login(&self, uid: &str, token: &str) -> Result<(), ServiceError>;

    /// Replace the local user's attributes
    async fn set_local_attributes(&self, attributes: &[Attribute]) -> Result<(), ServiceError>;

    /// Merge attributes into the local user's attributes
    async fn add_or_update_local_attributes(
        &self,
        attributes: &[Attribute],
    ) -> Result<(), ServiceError>;

    async fn join_channel(&self, channel: &str) -> Result<(), ServiceError>;

    async fn leave_channel(&self, channel: &str) -> Result<(), ServiceError>;

    async fn get_channel_members(&self, channel: &str) -> Result<Vec<ChannelMember>, ServiceError>;

    async fn get_user_attributes(&self, uid: &str) -> Result<UserAttributes, ServiceError>;

    async fn get_channel_attributes(
        &self,
        channel: &str,
    ) -> Result<Vec<ChannelAttribute>, ServiceError>;

    async fn logout(&self) -> Result<(), ServiceError>;

    /// Register a new listener for service callbacks
    ///
    /// Each call returns an independent receiver; notifications raised after
    /// registration are buffered until read.
    fn notifications(&self) -> mpsc::UnboundedReceiver<ServiceNotification>;
}
