use crate::node::NodeError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

pub const CLIENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dials remote nodes
#[derive(Debug, Clone)]
pub struct Client {
    connect_timeout: Duration,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(CLIENT_CONNECT_TIMEOUT)
    }
}

impl Client {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Open a TCP stream to `addr`
    pub async fn connect(&self, addr: &str) -> Result<(TcpStream, SocketAddr), NodeError> {
        let connect_error = |source| NodeError::Connect {
            addr: addr.to_string(),
            source,
        };

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                connect_error(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.connect_timeout),
                ))
            })?
            .map_err(connect_error)?;

        let peer_addr = stream.peer_addr().map_err(connect_error)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
        }

        debug!("Connected to {}", peer_addr);
        Ok((stream, peer_addr))
    }
}
