//! Length-prefixed framing and envelope serialization.
//!
//! Every envelope travels as one frame:
//! `magic(4, BE) | version(1) | payload_len(4, BE) | payload`,
//! where the payload is the bincode encoding of the envelope. The frame
//! header lets a receiver reject foreign traffic and truncated buffers
//! before attempting to decode the payload.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtoError, Result};
use crate::messages::{ClientToServerMessage, ServerToClientMessage};

/// Frame magic, "TICL" in ASCII.
pub const FRAME_MAGIC: u32 = 0x5449_434C;

/// Version of the frame layout (not the protocol version).
pub const FRAME_VERSION: u8 = 1;

/// Size of the frame header in bytes (magic:4 + version:1 + length:4).
pub const FRAME_HEADER_SIZE: usize = 9;

/// Maximum frame payload size.
pub const MAX_FRAME_PAYLOAD: usize = 1024 * 1024;

/// Serialize any serde-compatible message to bytes using bincode.
pub fn serialize_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    bincode::serialize(message).map_err(|e| ProtoError::SerializationError(e.to_string()))
}

/// Deserialize bytes to a message using bincode.
pub fn deserialize_message<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    bincode::deserialize(data).map_err(|e| ProtoError::SerializationError(e.to_string()))
}

/// Wrap a payload in a frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ProtoError::PayloadTooLarge {
            size: payload.len(),
            max_size: MAX_FRAME_PAYLOAD,
        });
    }
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    out.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
    out.push(FRAME_VERSION);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Unwrap a frame, returning the payload bytes.
pub fn decode_frame(data: &[u8]) -> Result<&[u8]> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(ProtoError::Truncated {
            needed: FRAME_HEADER_SIZE,
            available: data.len(),
        });
    }
    let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if magic != FRAME_MAGIC {
        return Err(ProtoError::InvalidMagic {
            expected: FRAME_MAGIC,
            got: magic,
        });
    }
    let version = data[4];
    if version != FRAME_VERSION {
        return Err(ProtoError::FrameVersionMismatch {
            expected: FRAME_VERSION,
            got: version,
        });
    }
    let length = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) as usize;
    if length > MAX_FRAME_PAYLOAD {
        return Err(ProtoError::PayloadTooLarge {
            size: length,
            max_size: MAX_FRAME_PAYLOAD,
        });
    }
    let payload = &data[FRAME_HEADER_SIZE..];
    if payload.len() != length {
        return Err(ProtoError::InvalidFrame {
            reason: format!(
                "declared payload length {} does not match {} available bytes",
                length,
                payload.len()
            ),
        });
    }
    Ok(payload)
}

/// Encode a client envelope into a framed byte buffer.
pub fn encode_client_message(message: &ClientToServerMessage) -> Result<Vec<u8>> {
    encode_frame(&serialize_message(message)?)
}

/// Decode a framed byte buffer into a client envelope.
pub fn decode_client_message(data: &[u8]) -> Result<ClientToServerMessage> {
    deserialize_message(decode_frame(data)?)
}

/// Encode a server envelope into a framed byte buffer.
pub fn encode_server_message(message: &ServerToClientMessage) -> Result<Vec<u8>> {
    encode_frame(&serialize_message(message)?)
}

/// Decode a framed byte buffer into a server envelope.
pub fn decode_server_message(data: &[u8]) -> Result<ServerToClientMessage> {
    deserialize_message(decode_frame(data)?)
}
