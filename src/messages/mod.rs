pub mod types;
pub mod wire;

pub use types::{Envelope, GetNodeReply, MessageId, MessageType, RoutingType};
pub use wire::{
    // Core wire protocol types
    FrameDecoder,
    WireProtocolError,

    // Frame helpers
    decode_envelope,
    encode_envelope,
    encode_frame,
    write_frame,

    // Wire protocol constants
    LENGTH_PREFIX_SIZE,
    MAX_MESSAGE_SIZE,
    SUSPICIOUS_MESSAGE_THRESHOLD,
};
