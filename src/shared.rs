use thiserror::Error;

use crate::bridge::ConnectionState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Bridge has been destroyed")]
    Destroyed,
}
