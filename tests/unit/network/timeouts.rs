//! Reply timeouts, idle timeouts and outbound backpressure

use crate::common::mock_streams::SilentStream;
use crate::common::test_data::*;
use nodelink::network::{ConnectionConfig, ConnectionError, DisconnectReason};
use nodelink::{Connection, Envelope, NodeError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn test_sync_send_timeout_releases_reply_slot() {
    let node = test_node();
    // Never started, so nothing is written and no reply can arrive
    let connection = Connection::new(Arc::clone(&node), Box::new(SilentStream), None, true);

    let request = Envelope::new_ping();
    let message_id = request.message_id;

    let err = within(connection.send_message_sync(request)).await.unwrap_err();
    match err {
        ConnectionError::ReplyTimeout { timeout } => {
            assert_eq!(timeout, ConnectionConfig::for_testing().reply_timeout)
        }
        other => panic!("expected ReplyTimeout, got {:?}", other),
    }

    assert_eq!(node.pending_replies(), 0);
    assert!(node.alloc_reply_slot(message_id).is_ok(), "same id is reusable");
}

#[tokio::test]
async fn test_duplicate_reply_slot_is_rejected() {
    let node = test_node();
    let connection = Connection::new(Arc::clone(&node), Box::new(SilentStream), None, true);

    let request = Envelope::new_ping();
    let message_id = request.message_id;
    let slot = connection.send_message(request.clone(), true).unwrap();
    assert!(slot.is_some());

    let err = connection.send_message_sync(request).await.unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Node(NodeError::DuplicateReplySlot(id)) if id == message_id
    ));

    drop(slot);
    assert_eq!(node.pending_replies(), 0);
}

#[tokio::test]
async fn test_full_tx_queue_fails_immediately() {
    let node = test_node_with(ConnectionConfig {
        tx_msg_chan_len: 2,
        ..ConnectionConfig::for_testing()
    });
    let connection = Connection::new(Arc::clone(&node), Box::new(SilentStream), None, true);

    connection.send_message_async(Envelope::new_data(vec![1])).unwrap();
    connection.send_message_async(Envelope::new_data(vec![2])).unwrap();

    let err = connection.send_message_async(Envelope::new_data(vec![3])).unwrap_err();
    assert!(matches!(err, ConnectionError::TxQueueFull));

    // A reply slot taken for a message that could not be queued is given back
    let err = connection.send_message(Envelope::new_ping(), true).unwrap_err();
    assert!(matches!(err, ConnectionError::TxQueueFull));
    assert_eq!(node.pending_replies(), 0);
}

#[tokio::test]
async fn test_silent_peer_hits_idle_timeout() {
    let node = test_node();
    let connection = node.add_connection(Box::new(SilentStream), None, true);

    let stopped = wait_until(Duration::from_secs(3), || connection.is_stopped()).await;
    assert!(stopped, "connection should stop on its own");
    assert_eq!(
        connection.disconnect_reason(),
        Some(&DisconnectReason::KeepaliveTimeout)
    );
    assert!(wait_until(Duration::from_secs(1), || node.connections().is_empty()).await);
}

#[tokio::test]
async fn test_inbound_traffic_resets_idle_timer() {
    // Long reply timeout so only the idle timer can stop the connection
    let node = test_node_with(ConnectionConfig {
        reply_timeout: Duration::from_secs(10),
        ..ConnectionConfig::for_testing()
    });
    let (local, mut peer) = tokio::io::duplex(64 * 1024);
    let connection = node.add_connection(Box::new(local), None, true);

    let keepalive_timeout = ConnectionConfig::for_testing().keepalive_timeout;
    let started = tokio::time::Instant::now();
    while started.elapsed() < keepalive_timeout * 3 {
        peer.write_all(&ping_frame()).await.unwrap();
        tokio::time::sleep(keepalive_timeout / 4).await;
        assert!(!connection.is_stopped(), "traffic should keep the connection alive");
    }

    let stopped = wait_until(keepalive_timeout * 4, || connection.is_stopped()).await;
    assert!(stopped);
    assert_eq!(
        connection.disconnect_reason(),
        Some(&DisconnectReason::KeepaliveTimeout)
    );
}
