//! Malformed, partial and interrupted input on a running connection

use crate::common::mock_streams::ControlledMockStream;
use crate::common::test_data::*;
use nodelink::messages::{decode_envelope, write_frame, FrameDecoder, MAX_MESSAGE_SIZE};
use nodelink::network::DisconnectReason;
use nodelink::{Envelope, RoutingType};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_chunked_reads_deliver_envelope() {
    let (envelope, frame) = broadcast_frame(b"chunked payload");

    let patterns = vec![vec![9, 1], vec![1; frame.len()], vec![2, 2, 3], vec![frame.len()]];
    for read_sizes in patterns {
        let node = test_node();
        let mut inbound = node.subscribe(RoutingType::Broadcast).unwrap();

        let stream = ControlledMockStream::new(frame.clone(), read_sizes.clone()).held_open();
        let connection = node.add_connection(Box::new(stream), None, false);

        let message = within(inbound.recv()).await.expect("message delivered");
        assert_eq!(message.envelope, envelope, "read sizes {:?}", read_sizes);
        assert_eq!(message.connection.session_id(), connection.session_id());

        connection.stop(DisconnectReason::Requested);
    }
}

#[tokio::test]
async fn test_negative_length_terminates_connection() {
    let node = test_node();
    let mut inbound = node.subscribe(RoutingType::Broadcast).unwrap();

    let (_, valid) = broadcast_frame(b"never delivered");
    let mut data = vec![0xff, 0xff, 0xff, 0xff];
    data.extend_from_slice(&valid);

    let stream = ControlledMockStream::new(data, vec![]).held_open();
    let connection = node.add_connection(Box::new(stream), None, false);

    assert!(wait_until(Duration::from_secs(2), || connection.is_stopped()).await);
    assert!(matches!(
        connection.disconnect_reason(),
        Some(DisconnectReason::Protocol(_))
    ));
    assert!(inbound.try_recv().is_err(), "nothing after the bad prefix is delivered");
}

#[tokio::test]
async fn test_oversized_length_terminates_connection() {
    let node = test_node();
    let (local, mut peer) = tokio::io::duplex(1024);
    let connection = node.add_connection(Box::new(local), None, false);

    peer.write_all(&(u32::MAX >> 1).to_be_bytes()).await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || connection.is_stopped()).await);
    assert!(matches!(
        connection.disconnect_reason(),
        Some(DisconnectReason::Protocol(_))
    ));
}

#[tokio::test]
async fn test_garbage_frame_is_dropped_without_disconnect() {
    let node = test_node();
    let mut inbound = node.subscribe(RoutingType::Broadcast).unwrap();

    let (envelope, valid) = broadcast_frame(b"after garbage");
    let mut data = vec![0, 0, 0, 3, 0xde, 0xad, 0xbf];
    data.extend_from_slice(&valid);

    let stream = ControlledMockStream::new(data, vec![]).held_open();
    let connection = node.add_connection(Box::new(stream), None, false);

    let message = within(inbound.recv()).await.expect("valid frame delivered");
    assert_eq!(message.envelope, envelope);
    assert!(!connection.is_stopped());
    connection.stop(DisconnectReason::Requested);
}

#[tokio::test]
async fn test_peer_close_stops_with_eof() {
    let node = test_node();
    let (local, peer) = tokio::io::duplex(1024);
    let connection = node.add_connection(Box::new(local), None, false);

    drop(peer);

    assert!(wait_until(Duration::from_secs(2), || connection.is_stopped()).await);
    assert!(matches!(
        connection.disconnect_reason(),
        Some(DisconnectReason::Eof) | Some(DisconnectReason::WriteFailed(_))
    ));
}

#[tokio::test]
async fn test_connection_asks_peer_for_its_record() {
    let node = test_node();
    let (local, mut peer) = tokio::io::duplex(64 * 1024);
    let _connection = node.add_connection(Box::new(local), None, true);

    let mut decoder = FrameDecoder::default();
    let mut buf = vec![0u8; 1024];
    let first = within(async {
        loop {
            let n = peer.read(&mut buf).await.unwrap();
            if let Some(frame) = decoder.decode(&buf[..n]).unwrap().into_iter().next() {
                return decode_envelope(&frame).unwrap();
            }
        }
    })
    .await;

    assert_eq!(first.message_type, nodelink::MessageType::GetNode);
    assert!(!first.is_reply());
}

#[tokio::test]
async fn test_write_frame_emits_exact_bytes() {
    let envelope = Envelope::new_data(b"exact".to_vec());
    let expected = nodelink::messages::encode_frame(&envelope, MAX_MESSAGE_SIZE).unwrap();

    let mut mock = tokio_test::io::Builder::new().write(&expected).build();
    write_frame(&mut mock, &envelope, MAX_MESSAGE_SIZE).await.unwrap();
}

#[tokio::test]
async fn test_decoder_over_mock_reads() {
    let (envelope, frame) = broadcast_frame(b"mock io");
    let (head, tail) = frame.split_at(9);

    let mut mock = tokio_test::io::Builder::new().read(head).read(tail).build();
    let mut decoder = FrameDecoder::default();
    let mut buf = vec![0u8; 64];
    let mut frames = Vec::new();

    loop {
        let n = mock.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        frames.extend(decoder.decode(&buf[..n]).unwrap());
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(decode_envelope(&frames[0]).unwrap(), envelope);
}
