use crate::network::ConnectionConfig;

// Max number of messages per routing type waiting for the local consumer
pub const LOCAL_MSG_CHAN_LEN: usize = 23333;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:30001";

/// Configuration of a local node and every connection it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address the listener binds to
    pub bind_addr: String,
    /// Host announced to peers. Empty lets each peer use the address it
    /// observes on its socket.
    pub advertise_host: String,
    pub local_msg_chan_len: usize,
    pub connection: ConnectionConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            advertise_host: String::new(),
            local_msg_chan_len: LOCAL_MSG_CHAN_LEN,
            connection: ConnectionConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Ephemeral loopback port and short connection timeouts
    pub fn for_testing() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            advertise_host: "127.0.0.1".to_string(),
            local_msg_chan_len: 64,
            connection: ConnectionConfig::for_testing(),
        }
    }

    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.local_msg_chan_len == 0 {
            return Err("local message queue capacity must be at least 1".to_string());
        }
        self.connection.validate()
    }
}
