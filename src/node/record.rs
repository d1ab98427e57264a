use crate::crypto::NodeId;
use crate::node::NodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Self-description a node hands to its peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    /// `host:port`; the host may be empty when the node does not know its
    /// public address, in which case peers substitute the observed one.
    pub addr: String,
    /// Arbitrary application metadata
    pub data: Vec<u8>,
}

impl NodeRecord {
    pub fn new(id: NodeId, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
            data: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }
}

impl fmt::Display for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id.short(), self.addr)
    }
}

/// Split `host:port` into its parts. IPv6 hosts must be bracketed.
///
/// Either part may be empty; callers decide whether that is acceptable.
pub fn split_host_port(addr: &str) -> Result<(String, String), NodeError> {
    let invalid = |reason: &str| NodeError::InvalidAddress {
        addr: addr.to_string(),
        reason: reason.to_string(),
    };

    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| invalid("missing ']'"))?;
        let port = tail.strip_prefix(':').ok_or_else(|| invalid("missing port"))?;
        if port.contains(':') {
            return Err(invalid("too many colons"));
        }
        return Ok((host.to_string(), port.to_string()));
    }

    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.contains(':') {
        return Err(invalid("too many colons"));
    }
    Ok((host.to_string(), port.to_string()))
}

/// Inverse of [`split_host_port`]
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Check the address a peer declared for itself and fill in an empty host
/// with the address observed on the socket.
pub fn resolve_declared_addr(
    mut record: NodeRecord,
    observed: Option<SocketAddr>,
) -> Result<NodeRecord, String> {
    let (host, port) = split_host_port(&record.addr)
        .map_err(|e| format!("Parse node addr {} error: {}", record.addr, e))?;

    if port.is_empty() {
        return Err("Node addr port is empty".to_string());
    }
    if port.parse::<u16>().is_err() {
        return Err(format!("Node addr port {} is malformed", port));
    }

    if host.is_empty() {
        let observed = observed.ok_or_else(|| {
            format!("Node addr {} has no host and the peer address is unknown", record.addr)
        })?;
        record.addr = join_host_port(&observed.ip().to_string(), &port);
    }

    Ok(record)
}
