#![warn(missing_docs)]

//! Wire protocol for the ticl invalidation client.
//!
//! This crate defines the envelope and sub-message types exchanged between
//! an invalidation client and server, their structural validation rules,
//! and the length-prefixed frame encoding. It contains no engine logic;
//! the `ticl` crate builds the client on top of these types.

pub mod error;
pub mod messages;
pub mod types;
pub mod validation;
pub mod version;
pub mod wire;

pub use error::{ProtoError, Result};
pub use messages::{
    ClientHeader, ClientToServerMessage, ConfigChangeMessage, DigestSerializationType,
    ErrorMessage, InfoMessage, InfoRequestMessage, InitializeMessage, InvalidationMessage,
    RegistrationMessage, RegistrationStatusMessage, RegistrationSyncMessage,
    RegistrationSyncRequestMessage, ServerHeader, ServerToClientMessage, TokenControlMessage,
};
pub use types::{
    AckHandleData, ErrorCode, InfoType, Invalidation, ObjectId, PropertyRecord, Registration,
    RegistrationOpType, RegistrationStatus, RegistrationSubtree, RegistrationSummary, Status,
    StatusCode, INTERNAL_OBJECT_SOURCE, MAX_OBJECT_NAME_LENGTH,
};
pub use validation::ValidationError;
pub use version::{ClientVersion, ProtocolVersion, PROTOCOL_MAJOR_VERSION, PROTOCOL_MINOR_VERSION};
