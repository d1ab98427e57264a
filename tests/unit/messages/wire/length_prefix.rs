//! Tests for length prefix handling

use nodelink::messages::{
    decode_envelope, encode_frame, Envelope, FrameDecoder, WireProtocolError, LENGTH_PREFIX_SIZE,
    MAX_MESSAGE_SIZE,
};

#[test]
fn test_length_prefix_is_big_endian_body_length() {
    let envelope = Envelope::new_data(vec![0xab; 300]);
    let frame = encode_frame(&envelope, MAX_MESSAGE_SIZE).unwrap();

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&frame[..LENGTH_PREFIX_SIZE]);
    let declared = u32::from_be_bytes(prefix) as usize;

    assert_eq!(declared, frame.len() - LENGTH_PREFIX_SIZE);
    assert_eq!(decode_envelope(&frame[LENGTH_PREFIX_SIZE..]).unwrap(), envelope);
}

#[test]
fn test_negative_length_is_fatal() {
    let mut decoder = FrameDecoder::default();
    let err = decoder.decode(&[0x80, 0x00, 0x00, 0x00, 1, 2, 3]).unwrap_err();

    match &err {
        WireProtocolError::InvalidLength { length } => assert_eq!(*length, i32::MIN),
        other => panic!("expected InvalidLength, got {:?}", other),
    }
    assert!(err.is_fatal());
}

#[test]
fn test_all_ones_length_is_negative() {
    let mut decoder = FrameDecoder::default();
    let err = decoder.decode(&[0xff, 0xff, 0xff, 0xff]).unwrap_err();
    assert!(matches!(err, WireProtocolError::InvalidLength { length: -1 }));
}

#[test]
fn test_length_at_limit_is_accepted() {
    let max = 32;
    let mut decoder = FrameDecoder::new(max);

    let mut frame = (max as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(&[7u8; 32]);

    let frames = decoder.decode(&frame).unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len(), max);
}

#[test]
fn test_length_over_limit_is_rejected_before_body_arrives() {
    let mut decoder = FrameDecoder::new(32);
    let err = decoder.decode(&33u32.to_be_bytes()).unwrap_err();

    assert!(matches!(
        err,
        WireProtocolError::MessageTooLarge { size: 33, max_size: 32 }
    ));
}

#[test]
fn test_encode_rejects_envelope_over_limit() {
    let envelope = Envelope::new_data(vec![0u8; 1024]);
    let err = encode_frame(&envelope, 512).unwrap_err();
    assert!(matches!(err, WireProtocolError::MessageTooLarge { max_size: 512, .. }));
}

#[test]
fn test_zero_length_frame_yields_empty_body() {
    let mut decoder = FrameDecoder::default();
    let frames = decoder.decode(&[0, 0, 0, 0]).unwrap();
    assert_eq!(frames, vec![Vec::<u8>::new()]);

    // An empty body is not an envelope; decoding it fails without being fatal
    let err = decode_envelope(&frames[0]).unwrap_err();
    assert!(!err.is_fatal());
}
