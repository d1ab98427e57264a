use crate::node::LocalNode;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

/// Accept loop handing every inbound stream to the local node
pub struct Server {
    listener: TcpListener,
    node: Arc<LocalNode>,
}

impl Server {
    pub fn new(listener: TcpListener, node: Arc<LocalNode>) -> Self {
        Self { listener, node }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the shutdown flag is set
    #[instrument(skip_all, fields(node = %self.node.id().short()))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Accepting connections on {}", addr);
        }

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted new connection from {}", peer_addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                        }
                        self.node.add_connection(Box::new(stream), Some(peer_addr), false);
                    }
                    Err(e) => {
                        // Keep accepting other connections despite this error
                        error!("Failed to accept connection: {}", e);
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Listener stopped");
    }
}
