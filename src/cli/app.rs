use crate::crypto::{storage, Identity};
use crate::messages::RoutingType;
use crate::network::ConnectionConfig;
use crate::node::{join_host_port, split_host_port, LocalNode, Middleware, NodeConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Connection knobs as they appear in the `[connection]` table, durations in
/// milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub rx_msg_chan_len: usize,
    pub tx_msg_chan_len: usize,
    pub rx_buf_len: usize,
    pub reply_timeout_ms: u64,
    pub keepalive_interval_ms: u64,
    pub keepalive_timeout_ms: u64,
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionConfig::default().into()
    }
}

impl From<ConnectionConfig> for ConnectionSettings {
    fn from(config: ConnectionConfig) -> Self {
        Self {
            rx_msg_chan_len: config.rx_msg_chan_len,
            tx_msg_chan_len: config.tx_msg_chan_len,
            rx_buf_len: config.rx_buf_len,
            reply_timeout_ms: config.reply_timeout.as_millis() as u64,
            keepalive_interval_ms: config.keepalive_interval.as_millis() as u64,
            keepalive_timeout_ms: config.keepalive_timeout.as_millis() as u64,
            max_message_size: config.max_message_size,
        }
    }
}

impl From<&ConnectionSettings> for ConnectionConfig {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            rx_msg_chan_len: settings.rx_msg_chan_len,
            tx_msg_chan_len: settings.tx_msg_chan_len,
            rx_buf_len: settings.rx_buf_len,
            reply_timeout: Duration::from_millis(settings.reply_timeout_ms),
            keepalive_interval: Duration::from_millis(settings.keepalive_interval_ms),
            keepalive_timeout: Duration::from_millis(settings.keepalive_timeout_ms),
            max_message_size: settings.max_message_size,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the node listens on
    pub bind_addr: String,
    /// Host announced to peers; empty lets peers use the observed address
    pub advertise_host: String,
    /// Identity file; the platform data directory when unset
    pub identity_path: Option<PathBuf>,
    pub local_msg_chan_len: usize,
    pub connection: ConnectionSettings,
}

impl Default for Config {
    fn default() -> Self {
        let node = NodeConfig::default();
        Self {
            bind_addr: node.bind_addr,
            advertise_host: node.advertise_host,
            identity_path: None,
            local_msg_chan_len: node.local_msg_chan_len,
            connection: node.connection.into(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_config_file() -> Result<PathBuf> {
        Ok(storage::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load configuration from the default file, creating it if it doesn't exist
    pub fn load_or_create_default() -> Result<Self> {
        Self::load_or_create(&Self::default_config_file()?)
    }

    /// Load configuration from `path`, writing the defaults there if missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let config = Config::default();
        config.save_to(path)?;
        info!("Created default configuration at {}", path.display());
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        storage::ensure_directory_exists(path).context("Failed to create config directory")?;
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content).context("Failed to write configuration file")?;
        Ok(())
    }

    /// Identity file to use
    pub fn identity_path(&self) -> Result<PathBuf> {
        match &self.identity_path {
            Some(path) => Ok(path.clone()),
            None => storage::default_key_path(),
        }
    }

    /// Validated node configuration
    pub fn to_node_config(&self) -> Result<NodeConfig> {
        let config = NodeConfig {
            bind_addr: self.bind_addr.clone(),
            advertise_host: self.advertise_host.clone(),
            local_msg_chan_len: self.local_msg_chan_len,
            connection: ConnectionConfig::from(&self.connection),
        };
        config
            .validate()
            .map_err(|reason| anyhow::anyhow!("Invalid configuration: {}", reason))?;
        Ok(config)
    }
}

/// Main application state
pub struct App {
    /// Cryptographic identity
    pub identity: Arc<Identity>,
    /// Application configuration
    pub config: Config,
}

impl App {
    /// Load the configuration and identity, creating either if missing
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load_or_create(path),
            None => Config::load_or_create_default(),
        }
        .context("Failed to initialize configuration")?;

        let identity_path = config.identity_path()?;
        let identity = Arc::new(
            Identity::load_or_generate(&identity_path).context("Failed to initialize identity")?,
        );

        Ok(App { identity, config })
    }

    pub fn node_id(&self) -> &str {
        self.identity.node_id().as_str()
    }

    fn build_node(&self, node_config: NodeConfig) -> Result<Arc<LocalNode>> {
        let node = LocalNode::new(self.identity.node_id().clone(), node_config)?;

        node.apply_middleware(Middleware::remote_node_ready(|connection| {
            if let Some(remote) = connection.remote_node() {
                println!("Peer ready: {}", remote);
            }
            true
        }));
        node.apply_middleware(Middleware::remote_node_disconnected(|connection| {
            match connection.disconnect_reason() {
                Some(reason) => println!("Peer disconnected: {} ({})", connection, reason),
                None => println!("Peer disconnected: {}", connection),
            }
            true
        }));

        Ok(node)
    }

    /// Handle the 'serve' command - run a node until Ctrl-C
    pub async fn handle_serve(&self, bind: Option<String>) -> Result<()> {
        let mut node_config = self.config.to_node_config()?;
        if let Some(bind) = bind {
            split_host_port(&bind)?;
            node_config.bind_addr = bind;
        }

        let node = self.build_node(node_config)?;
        let mut data = node.subscribe(RoutingType::Direct)?;
        let addr = node.start().await?;

        println!("Node {} listening on {}", node.id(), addr);
        println!("Press Ctrl-C to stop.");

        loop {
            tokio::select! {
                message = data.recv() => match message {
                    Some(message) => {
                        debug!(
                            session_id = %message.connection.session_id(),
                            message_id = %message.envelope.message_id,
                            "Data message received"
                        );
                        println!(
                            "Data from {}: {} bytes",
                            message.connection,
                            message.envelope.payload.len()
                        );
                    }
                    None => break,
                },
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                    break;
                }
            }
        }

        node.stop();
        println!("Node stopped.");
        Ok(())
    }

    /// Handle the 'ping' command - dial a peer and measure round trips
    pub async fn handle_ping(&self, address: &str, count: u32) -> Result<()> {
        let mut node_config = self.config.to_node_config()?;
        // Listen on an ephemeral port so the peer can resolve us
        let (host, _) = split_host_port(&node_config.bind_addr)?;
        node_config.bind_addr = join_host_port(&host, "0");

        let node = self.build_node(node_config)?;
        node.start().await?;

        let result = ping_peer(&node, address, count).await;
        node.stop();
        result
    }
}

async fn ping_peer(node: &Arc<LocalNode>, address: &str, count: u32) -> Result<()> {
    let connection = node
        .connect(address)
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;

    let ready_timeout = node.config().connection.reply_timeout * 2;
    let remote = tokio::time::timeout(ready_timeout, connection.wait_ready())
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "Peer at {} did not become ready in {:?}",
                address,
                ready_timeout
            )
        })??;
    println!("PING {} ({})", remote.id, address);

    let mut received = 0u32;
    let mut total = Duration::ZERO;
    for seq in 1..=count {
        let started = Instant::now();
        match connection.ping().await {
            Ok(()) => {
                let rtt = started.elapsed();
                received += 1;
                total += rtt;
                println!("reply from {}: seq={} time={:.2?}", remote, seq, rtt);
            }
            Err(e) => println!("no reply from {}: seq={} ({})", remote, seq, e),
        }

        if seq < count {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    println!("--- {} ping statistics ---", address);
    println!("{} sent, {} received", count, received);
    if received > 0 {
        println!("average round trip {:.2?}", total / received);
    }

    if received == 0 && count > 0 {
        anyhow::bail!("No replies from {}", address);
    }
    Ok(())
}
