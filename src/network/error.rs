use crate::messages::WireProtocolError;
use crate::node::NodeError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the send operations
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Tx msg queue full, discarding message")]
    TxQueueFull,

    #[error("Wait for reply timed out after {timeout:?}")]
    ReplyTimeout { timeout: Duration },

    #[error("Connection is stopped")]
    Stopped,

    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Wire(#[from] WireProtocolError),
}

/// Why a connection was stopped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisconnectReason {
    #[error("stop requested")]
    Requested,

    #[error("end of stream")]
    Eof,

    #[error("read connection error: {0}")]
    ReadFailed(String),

    #[error("write to connection error: {0}")]
    WriteFailed(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("keepalive timeout")]
    KeepaliveTimeout,

    #[error("remote node resolution failed: {0}")]
    Resolution(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl DisconnectReason {
    /// Whether the connection ended because something went wrong
    pub fn is_error(&self) -> bool {
        !matches!(self, DisconnectReason::Requested)
    }
}
