pub mod client;
pub mod config;
pub mod connection;
pub mod error;
mod io;
pub mod reply;
pub mod server;

pub use client::Client;
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState, PeerStream, RemoteMessage};
pub use error::{ConnectionError, DisconnectReason};
pub use reply::{ReplyRegistry, ReplySlot};
pub use server::Server;
