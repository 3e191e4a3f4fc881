use strum_macros::{Display, EnumIter};

use crate::shared::BridgeError;

/// Connection lifecycle of the bridge
///
/// States only move forward one step at a time. `Destroyed` can be entered
/// from anywhere and is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    LoggedOut,
    LoggingIn,
    SettingAttributes,
    JoiningChannel,
    Ready,
    Destroyed,
}

impl ConnectionState {
    /// The state that follows this one during a normal connection
    pub fn next(&self) -> Option<ConnectionState> {
        match self {
            ConnectionState::LoggedOut => Some(ConnectionState::LoggingIn),
            ConnectionState::LoggingIn => Some(ConnectionState::SettingAttributes),
            ConnectionState::SettingAttributes => Some(ConnectionState::JoiningChannel),
            ConnectionState::JoiningChannel => Some(ConnectionState::Ready),
            ConnectionState::Ready | ConnectionState::Destroyed => None,
        }
    }

    pub fn can_advance_to(&self, to: ConnectionState) -> bool {
        if *self == ConnectionState::Destroyed {
            return false;
        }
        to == ConnectionState::Destroyed || self.next() == Some(to)
    }

    /// Validate a transition, returning the target state
    pub fn advance_to(&self, to: ConnectionState) -> Result<ConnectionState, BridgeError> {
        match (self, to) {
            (ConnectionState::Destroyed, _) => Err(BridgeError::Destroyed),
            (from, to) if from.can_advance_to(to) => Ok(to),
            (from, to) => Err(BridgeError::InvalidTransition { from: *from, to }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == ConnectionState::Destroyed
    }
}
