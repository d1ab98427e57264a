use crate::node::NodeRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which consumer on the receiving node gets a message
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingType {
    /// Point-to-point message for the receiving node itself
    Direct,
    /// Message the receiving node should forward towards its destination
    Relay,
    /// Message flooded to every neighbor
    Broadcast,
}

impl fmt::Display for RoutingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingType::Direct => write!(f, "direct"),
            RoutingType::Relay => write!(f, "relay"),
            RoutingType::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Kind of message carried in an envelope
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Liveness probe, payload is empty
    Ping,
    /// Ask the peer for its self-described node record
    GetNode,
    /// Opaque application data
    Data,
}

impl MessageType {
    /// Get the message type as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Ping => "Ping",
            MessageType::GetNode => "GetNode",
            MessageType::Data => "Data",
        }
    }
}

/// Caller-chosen identifier used to correlate replies with requests
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; MessageId::LEN]);

impl MessageId {
    pub const LEN: usize = 8;

    /// Generate a new random message identifier
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The unit of exchange between two peers.
///
/// `payload` is opaque to the connection engine; `reply_to` is set on replies
/// and carries the identifier of the request being answered.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub routing_type: RoutingType,
    pub message_type: MessageType,
    pub message_id: MessageId,
    pub reply_to: Option<MessageId>,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create a new request envelope with a fresh random message id
    pub fn new(routing_type: RoutingType, message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            routing_type,
            message_type,
            message_id: MessageId::random(),
            reply_to: None,
            payload,
        }
    }

    /// Create a direct Ping message
    pub fn new_ping() -> Self {
        Self::new(RoutingType::Direct, MessageType::Ping, Vec::new())
    }

    /// Create a direct GetNode message
    pub fn new_get_node() -> Self {
        Self::new(RoutingType::Direct, MessageType::GetNode, Vec::new())
    }

    /// Create a direct Data message carrying application bytes
    pub fn new_data(payload: Vec<u8>) -> Self {
        Self::new(RoutingType::Direct, MessageType::Data, payload)
    }

    /// Build the reply to this envelope
    pub fn reply(&self, payload: Vec<u8>) -> Self {
        Self {
            routing_type: self.routing_type,
            message_type: self.message_type,
            message_id: MessageId::random(),
            reply_to: Some(self.message_id),
            payload,
        }
    }

    /// Use a specific message id instead of the random one
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }
}

/// Payload of the reply to a GetNode request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GetNodeReply {
    pub node: NodeRecord,
}
