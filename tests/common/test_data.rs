//! Test data creation utilities

use nodelink::messages::{encode_frame, Envelope, MessageType, RoutingType, MAX_MESSAGE_SIZE};
use nodelink::network::ConnectionConfig;
use nodelink::{Connection, LocalNode, NodeConfig, NodeId};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_SEED: AtomicU8 = AtomicU8::new(1);

/// Node id unique within the test binary
pub fn test_node_id() -> NodeId {
    NodeId::from_bytes(&[NEXT_SEED.fetch_add(1, Ordering::Relaxed); 32])
}

/// Local node with short timeouts, not started
pub fn test_node() -> Arc<LocalNode> {
    test_node_with(ConnectionConfig::for_testing())
}

pub fn test_node_with(connection: ConnectionConfig) -> Arc<LocalNode> {
    LocalNode::new(test_node_id(), NodeConfig::for_testing().with_connection(connection))
        .expect("test config is valid")
}

/// Started local node listening on an ephemeral loopback port
pub async fn started_node() -> Arc<LocalNode> {
    let node = test_node();
    node.start().await.expect("node starts");
    node
}

/// Connect two started nodes over an in-memory pipe
pub fn connect_pair(a: &Arc<LocalNode>, b: &Arc<LocalNode>) -> (Arc<Connection>, Arc<Connection>) {
    let (left, right) = tokio::io::duplex(64 * 1024);
    let a_to_b = a.add_connection(Box::new(left), None, true);
    let b_to_a = b.add_connection(Box::new(right), None, false);
    (a_to_b, b_to_a)
}

/// Length-prefixed bytes of a broadcast data envelope
pub fn broadcast_frame(payload: &[u8]) -> (Envelope, Vec<u8>) {
    let envelope = Envelope::new(RoutingType::Broadcast, MessageType::Data, payload.to_vec());
    let frame = encode_frame(&envelope, MAX_MESSAGE_SIZE).expect("frame encodes");
    (envelope, frame)
}

/// Length-prefixed bytes of a ping request
pub fn ping_frame() -> Vec<u8> {
    encode_frame(&Envelope::new_ping(), MAX_MESSAGE_SIZE).expect("frame encodes")
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Run `future` with a generous upper bound so a hang fails the test
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("operation timed out")
}
