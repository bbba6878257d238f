use thiserror::Error;

use ticl_proto::ProtoError;

#[derive(Debug, Error)]
pub enum TiclError {
    #[error("operation already registered: {name}")]
    OperationAlreadyRegistered { name: String },

    #[error("operation not registered: {name}")]
    OperationNotRegistered { name: String },

    #[error("operation {name} requires a positive delay")]
    InvalidOperationDelay { name: String },

    #[error("bad acknowledge handle: {reason}")]
    BadAckHandle { reason: String },

    #[error("failed to start scheduler thread: {reason}")]
    SchedulerStart { reason: String },

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TiclError>;
