use thiserror::Error;

use crate::validation::ValidationError;

/// Errors produced while encoding, decoding, or validating wire messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("invalid magic number: expected 0x{expected:08X}, got 0x{got:08X}")]
    InvalidMagic { expected: u32, got: u32 },

    #[error("unsupported frame version: expected {expected}, got {got}")]
    FrameVersionMismatch { expected: u8, got: u8 },

    #[error("frame payload too large: {size} bytes (max {max_size})")]
    PayloadTooLarge { size: usize, max_size: usize },

    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Convenience alias for fallible protocol operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
