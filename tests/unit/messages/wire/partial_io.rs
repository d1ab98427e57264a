//! Tests for frame reassembly across arbitrary read boundaries

use nodelink::messages::{decode_envelope, encode_frame, Envelope, FrameDecoder, MAX_MESSAGE_SIZE};

fn frame_of(body: &[u8]) -> Vec<u8> {
    let mut frame = (body.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(body);
    frame
}

/// Feed `data` split at the given chunk sizes, the last chunk taking the rest
fn decode_in_chunks(data: &[u8], chunk_sizes: &[usize]) -> Vec<Vec<u8>> {
    let mut decoder = FrameDecoder::default();
    let mut frames = Vec::new();
    let mut position = 0;

    for &size in chunk_sizes {
        let end = (position + size).min(data.len());
        frames.extend(decoder.decode(&data[position..end]).unwrap());
        position = end;
    }
    frames.extend(decoder.decode(&data[position..]).unwrap());

    assert!(!decoder.has_partial_frame(), "decoder left with a partial frame");
    frames
}

#[test]
fn test_nine_one_rest_reads_yield_one_frame() {
    let body = b"0123456789";
    let frame = frame_of(body);

    let mut decoder = FrameDecoder::default();
    assert!(decoder.decode(&frame[..9]).unwrap().is_empty());
    assert!(decoder.decode(&frame[9..10]).unwrap().is_empty());
    assert_eq!(decoder.remaining(), 4);

    let frames = decoder.decode(&frame[10..]).unwrap();
    assert_eq!(frames, vec![body.to_vec()]);
}

#[test]
fn test_length_prefix_fragmentation_patterns() {
    let envelope = Envelope::new_data(b"This is a test message for partial read recovery".to_vec());
    let data = encode_frame(&envelope, MAX_MESSAGE_SIZE).unwrap();

    let patterns: Vec<(Vec<usize>, &str)> = vec![
        (vec![1, 1, 1, 1], "1+1+1+1 bytes pattern for length prefix"),
        (vec![2, 2], "2+2 bytes pattern for length prefix"),
        (vec![3, 1], "3+1 bytes pattern for length prefix"),
        (vec![1, 3], "1+3 bytes pattern for length prefix"),
        (vec![4], "whole prefix, then whole body"),
    ];

    for (read_sizes, description) in patterns {
        let frames = decode_in_chunks(&data, &read_sizes);
        assert_eq!(frames.len(), 1, "one frame expected for {}", description);
        assert_eq!(
            decode_envelope(&frames[0]).unwrap(),
            envelope,
            "envelope mismatch for {}",
            description
        );
    }
}

#[test]
fn test_one_byte_reads_of_several_frames() {
    let envelopes: Vec<Envelope> = (0..3u8)
        .map(|i| Envelope::new_data(vec![i; 17 * (i as usize + 1)]))
        .collect();
    let data: Vec<u8> = envelopes
        .iter()
        .flat_map(|e| encode_frame(e, MAX_MESSAGE_SIZE).unwrap())
        .collect();

    let mut decoder = FrameDecoder::default();
    let mut frames = Vec::new();
    for byte in &data {
        frames.extend(decoder.decode(std::slice::from_ref(byte)).unwrap());
    }

    let decoded: Vec<Envelope> = frames.iter().map(|f| decode_envelope(f).unwrap()).collect();
    assert_eq!(decoded, envelopes);
}

#[test]
fn test_read_spanning_frame_tail_and_next_header() {
    let first = frame_of(b"first body");
    let second = frame_of(b"second");
    let data = [first.clone(), second].concat();

    // Ends two bytes into the second frame's header
    let split = first.len() + 2;
    let frames = decode_in_chunks(&data, &[3, split - 3]);

    assert_eq!(frames, vec![b"first body".to_vec(), b"second".to_vec()]);
}

#[test]
fn test_many_frames_in_one_read() {
    let data: Vec<u8> = (0..50u8).flat_map(|i| frame_of(&[i; 5])).collect();

    let mut decoder = FrameDecoder::default();
    let frames = decoder.decode(&data).unwrap();

    assert_eq!(frames.len(), 50);
    assert_eq!(frames[49], vec![49u8; 5]);
}

#[test]
fn test_every_split_point_yields_same_frames() {
    let data = [frame_of(b"alpha"), frame_of(b""), frame_of(b"gamma-delta")].concat();
    let expected = vec![b"alpha".to_vec(), Vec::new(), b"gamma-delta".to_vec()];

    for split in 0..=data.len() {
        let frames = decode_in_chunks(&data, &[split]);
        assert_eq!(frames, expected, "split at {}", split);
    }
}
