pub mod cli;
pub mod crypto;
pub mod messages;
pub mod network;
pub mod node;

// Re-export key types for easy testing
pub use crypto::{Identity, NodeId};
pub use messages::{Envelope, MessageId, MessageType, RoutingType};
pub use network::{Connection, ConnectionConfig, ConnectionError, DisconnectReason, RemoteMessage};
pub use node::{LocalNode, Middleware, NodeConfig, NodeError, NodeRecord};
