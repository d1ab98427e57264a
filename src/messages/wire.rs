use crate::messages::Envelope;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, instrument, trace, warn};

// Wire protocol constants
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB
pub const LENGTH_PREFIX_SIZE: usize = 4; // 4 bytes for u32 length prefix
pub const SUSPICIOUS_MESSAGE_THRESHOLD: usize = 8 * 1024 * 1024; // 8MB threshold for logging

/// Custom error types for wire protocol operations
#[derive(Error, Debug)]
pub enum WireProtocolError {
    #[error("Message too large: {size} bytes exceeds maximum of {max_size} bytes")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Invalid length prefix: {length}")]
    InvalidLength { length: i32 },

    #[error("Corrupted data: {reason}")]
    CorruptedData { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireProtocolError {
    /// Whether the error makes the rest of the byte stream unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WireProtocolError::MessageTooLarge { .. }
                | WireProtocolError::InvalidLength { .. }
                | WireProtocolError::Io(_)
        )
    }
}

/// Incremental reassembly of length-prefixed frames.
///
/// Bytes arrive in arbitrary chunks. The decoder keeps at most one partial
/// frame between calls: either an incomplete 4-byte header, or a decoded
/// length plus the body bytes collected so far.
#[derive(Debug)]
pub struct FrameDecoder {
    max_message_size: usize,
    header: Vec<u8>,
    body: Vec<u8>,
    // Declared length of the frame being collected, None while reading the header
    expected: Option<usize>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl FrameDecoder {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            header: Vec::with_capacity(LENGTH_PREFIX_SIZE),
            body: Vec::new(),
            expected: None,
        }
    }

    /// Bytes still missing before the current frame is complete
    pub fn remaining(&self) -> usize {
        match self.expected {
            Some(expected) => expected - self.body.len(),
            None => LENGTH_PREFIX_SIZE - self.header.len(),
        }
    }

    /// Whether a partial header or body is buffered
    pub fn has_partial_frame(&self) -> bool {
        self.expected.is_some() || !self.header.is_empty()
    }

    /// Feed a chunk read from the socket, returning every frame it completes.
    ///
    /// An error leaves the decoder in an unspecified state; the connection
    /// must be torn down.
    #[instrument(level = "trace", skip(self, buf), fields(len = buf.len()))]
    pub fn decode(&mut self, mut buf: &[u8]) -> Result<Vec<Vec<u8>>, WireProtocolError> {
        let mut frames = Vec::new();

        while !buf.is_empty() {
            let expected = match self.expected {
                Some(expected) => expected,
                None => {
                    let wanted = LENGTH_PREFIX_SIZE - self.header.len();
                    if buf.len() < wanted {
                        self.header.extend_from_slice(buf);
                        trace!(buffered = self.header.len(), "Partial length prefix");
                        break;
                    }

                    self.header.extend_from_slice(&buf[..wanted]);
                    buf = &buf[wanted..];

                    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
                    prefix.copy_from_slice(&self.header);
                    self.header.clear();

                    let length = self.validate_length(u32::from_be_bytes(prefix))?;
                    self.expected = Some(length);
                    length
                }
            };

            let take = (expected - self.body.len()).min(buf.len());
            self.body.extend_from_slice(&buf[..take]);
            buf = &buf[take..];

            if self.body.len() == expected {
                trace!(size = expected, "Frame complete");
                frames.push(std::mem::take(&mut self.body));
                self.expected = None;
            }
        }

        Ok(frames)
    }

    /// Validate a decoded length prefix against protocol and size limits
    fn validate_length(&self, length: u32) -> Result<usize, WireProtocolError> {
        let signed = length as i32;
        if signed < 0 {
            warn!(length = signed, "Negative length prefix, peer is malformed");
            return Err(WireProtocolError::InvalidLength { length: signed });
        }

        let size = length as usize;
        if size > self.max_message_size {
            error!(
                size = size,
                max_size = self.max_message_size,
                "Message size exceeds maximum allowed size"
            );
            return Err(WireProtocolError::MessageTooLarge {
                size,
                max_size: self.max_message_size,
            });
        }

        if size > SUSPICIOUS_MESSAGE_THRESHOLD {
            warn!(
                size = size,
                threshold = SUSPICIOUS_MESSAGE_THRESHOLD,
                "Message size exceeds suspicious threshold but is still allowed"
            );
        }

        Ok(size)
    }
}

/// Serialize an envelope with bincode
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, WireProtocolError> {
    bincode::serialize(envelope).map_err(|e| {
        error!(error = %e, "Failed to serialize Envelope with bincode");
        WireProtocolError::Serialization(e)
    })
}

/// Deserialize one reassembled frame body into an envelope
#[instrument(level = "trace", skip(data), fields(data_size = data.len()))]
pub fn decode_envelope(data: &[u8]) -> Result<Envelope, WireProtocolError> {
    bincode::deserialize(data).map_err(|e| WireProtocolError::CorruptedData {
        reason: format!("Failed to deserialize Envelope: {}", e),
    })
}

/// Serialize an envelope and prepend its 4-byte big-endian length
pub fn encode_frame(
    envelope: &Envelope,
    max_message_size: usize,
) -> Result<Vec<u8>, WireProtocolError> {
    let body = encode_envelope(envelope)?;
    if body.len() > max_message_size {
        return Err(WireProtocolError::MessageTooLarge {
            size: body.len(),
            max_size: max_message_size,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write one framed envelope and flush the writer
#[instrument(level = "trace", skip(writer, envelope), fields(message_id = %envelope.message_id))]
pub async fn write_frame(
    writer: &mut (impl AsyncWrite + Unpin),
    envelope: &Envelope,
    max_message_size: usize,
) -> Result<(), WireProtocolError> {
    let frame = encode_frame(envelope, max_message_size)?;

    writer.write_all(&frame).await?;
    writer.flush().await?;

    debug!(size = frame.len(), "Frame written");
    Ok(())
}
