use crate::messages::{MessageId, RoutingType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("No delivery queue for routing type {0}")]
    UnknownRoutingType(RoutingType),

    #[error("Routing type {0} already has a subscriber")]
    AlreadySubscribed(RoutingType),

    #[error("Reply slot for message {0} is already allocated")]
    DuplicateReplySlot(MessageId),

    #[error("Local node already started")]
    AlreadyStarted,

    #[error("Invalid address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, NodeError>;
