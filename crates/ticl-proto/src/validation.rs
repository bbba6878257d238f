//! Structural validation of wire messages.
//!
//! Parsing only proves the bytes decode; validation proves the decoded
//! message obeys the protocol's structural rules (name length bounds,
//! non-negative versions, sane prefixes). Invalid inbound envelopes are
//! dropped by the protocol handler, invalid outbound envelopes abort the
//! send.

use thiserror::Error;

use crate::messages::{ClientToServerMessage, ServerToClientMessage};
use crate::types::{
    Invalidation, ObjectId, RegistrationStatus, RegistrationSubtree, RegistrationSummary,
    MAX_OBJECT_NAME_LENGTH,
};
use crate::version::ProtocolVersion;

/// A structural rule violation in a wire message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("object name too long: {length} bytes (max {MAX_OBJECT_NAME_LENGTH})")]
    ObjectNameTooLong { length: usize },

    #[error("negative invalidation version: {version}")]
    NegativeVersion { version: i64 },

    #[error("negative protocol version: {version}")]
    NegativeProtocolVersion { version: i32 },

    #[error("negative timestamp: {field} = {value}")]
    NegativeTimestamp { field: &'static str, value: i64 },

    #[error("invalid next message delay: {delay_ms} ms (must be >= 1)")]
    InvalidNextMessageDelay { delay_ms: i64 },

    #[error("prefix length {prefix_len} exceeds {prefix_bytes} prefix bytes")]
    InvalidPrefixLength { prefix_len: i32, prefix_bytes: usize },

    #[error("negative registration count: {count}")]
    NegativeRegistrationCount { count: i32 },

    #[error("empty registration digest")]
    EmptyRegistrationDigest,

    #[error("empty nonce in initialize message")]
    EmptyNonce,

    #[error("message without client token must carry an initialize message")]
    TokenMissing,
}

/// Result alias for validation checks.
pub type Result<T> = std::result::Result<T, ValidationError>;

fn validate_protocol_version(version: &ProtocolVersion) -> Result<()> {
    if version.major < 0 {
        return Err(ValidationError::NegativeProtocolVersion {
            version: version.major,
        });
    }
    if version.minor < 0 {
        return Err(ValidationError::NegativeProtocolVersion {
            version: version.minor,
        });
    }
    Ok(())
}

fn validate_timestamp(field: &'static str, value: i64) -> Result<()> {
    if value < 0 {
        return Err(ValidationError::NegativeTimestamp { field, value });
    }
    Ok(())
}

/// Validate an object id.
pub fn validate_object_id(object_id: &ObjectId) -> Result<()> {
    if object_id.name.len() > MAX_OBJECT_NAME_LENGTH {
        return Err(ValidationError::ObjectNameTooLong {
            length: object_id.name.len(),
        });
    }
    Ok(())
}

/// Validate an invalidation, including its object id.
pub fn validate_invalidation(invalidation: &Invalidation) -> Result<()> {
    validate_object_id(&invalidation.object_id)?;
    if invalidation.version < 0 {
        return Err(ValidationError::NegativeVersion {
            version: invalidation.version,
        });
    }
    Ok(())
}

/// Validate a registration summary.
pub fn validate_registration_summary(summary: &RegistrationSummary) -> Result<()> {
    if summary.num_registrations < 0 {
        return Err(ValidationError::NegativeRegistrationCount {
            count: summary.num_registrations,
        });
    }
    if summary.registration_digest.is_empty() {
        return Err(ValidationError::EmptyRegistrationDigest);
    }
    Ok(())
}

/// Validate a digest prefix against its declared bit length.
pub fn validate_prefix(prefix: &[u8], prefix_len: i32) -> Result<()> {
    if prefix_len < 0 || prefix_len as usize > prefix.len() * 8 {
        return Err(ValidationError::InvalidPrefixLength {
            prefix_len,
            prefix_bytes: prefix.len(),
        });
    }
    Ok(())
}

fn validate_subtree(subtree: &RegistrationSubtree) -> Result<()> {
    for object_id in &subtree.registered_objects {
        validate_object_id(object_id)?;
    }
    Ok(())
}

fn validate_registration_status(status: &RegistrationStatus) -> Result<()> {
    validate_object_id(&status.registration.object_id)
}

/// Validate a full client-to-server envelope before it is sent.
pub fn validate_client_message(message: &ClientToServerMessage) -> Result<()> {
    let header = &message.header;
    validate_protocol_version(&header.protocol_version)?;
    validate_timestamp("client_time_ms", header.client_time_ms)?;
    validate_timestamp("max_known_server_time_ms", header.max_known_server_time_ms)?;
    if let Some(summary) = &header.registration_summary {
        validate_registration_summary(summary)?;
    }

    if header.client_token.is_none() && message.initialize_message.is_none() {
        return Err(ValidationError::TokenMissing);
    }

    if let Some(init) = &message.initialize_message {
        if init.nonce.is_empty() {
            return Err(ValidationError::EmptyNonce);
        }
    }
    if let Some(reg) = &message.registration_message {
        for registration in &reg.registrations {
            validate_object_id(&registration.object_id)?;
        }
    }
    if let Some(sync) = &message.registration_sync_message {
        for subtree in &sync.subtrees {
            validate_subtree(subtree)?;
        }
    }
    if let Some(acks) = &message.invalidation_ack_message {
        for invalidation in &acks.invalidations {
            validate_invalidation(invalidation)?;
        }
    }
    Ok(())
}

/// Validate a full server-to-client envelope after it is parsed.
pub fn validate_server_message(message: &ServerToClientMessage) -> Result<()> {
    let header = &message.header;
    validate_protocol_version(&header.protocol_version)?;
    validate_timestamp("server_time_ms", header.server_time_ms)?;
    if let Some(summary) = &header.registration_summary {
        validate_registration_summary(summary)?;
    }

    if let Some(config) = &message.config_change_message {
        if let Some(delay_ms) = config.next_message_delay_ms {
            if delay_ms < 1 {
                return Err(ValidationError::InvalidNextMessageDelay { delay_ms });
            }
        }
    }
    if let Some(invalidations) = &message.invalidation_message {
        for invalidation in &invalidations.invalidations {
            validate_invalidation(invalidation)?;
        }
    }
    if let Some(statuses) = &message.registration_status_message {
        for status in &statuses.registration_statuses {
            validate_registration_status(status)?;
        }
    }
    if let Some(sync_request) = &message.registration_sync_request_message {
        validate_prefix(&sync_request.prefix, sync_request.prefix_len)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{
        ClientHeader, ConfigChangeMessage, InitializeMessage, RegistrationSyncRequestMessage,
        ServerHeader,
    };
    use crate::messages::DigestSerializationType;

    fn server_message() -> ServerToClientMessage {
        ServerToClientMessage::with_header(ServerHeader {
            protocol_version: ProtocolVersion::current(),
            client_token: b"tok".to_vec(),
            registration_summary: None,
            server_time_ms: 100,
            message_id: None,
        })
    }

    fn client_message() -> ClientToServerMessage {
        ClientToServerMessage::with_header(ClientHeader {
            protocol_version: ProtocolVersion::current(),
            client_token: Some(b"tok".to_vec()),
            registration_summary: None,
            client_time_ms: 100,
            max_known_server_time_ms: 0,
            message_id: 1,
        })
    }

    #[test]
    fn test_object_name_length_bound() {
        assert!(validate_object_id(&ObjectId::new(4, vec![0u8; 64])).is_ok());
        let err = validate_object_id(&ObjectId::new(4, vec![0u8; 65])).unwrap_err();
        assert_eq!(err, ValidationError::ObjectNameTooLong { length: 65 });
    }

    #[test]
    fn test_negative_version_rejected() {
        let mut inv = Invalidation::new(ObjectId::new(4, b"x".to_vec()), 3);
        assert!(validate_invalidation(&inv).is_ok());
        inv.version = -1;
        assert!(validate_invalidation(&inv).is_err());
    }

    #[test]
    fn test_client_message_without_token_needs_initialize() {
        let mut msg = client_message();
        msg.header.client_token = None;
        assert_eq!(
            validate_client_message(&msg).unwrap_err(),
            ValidationError::TokenMissing
        );

        msg.initialize_message = Some(InitializeMessage {
            client_type: 4,
            nonce: b"1000".to_vec(),
            application_client_id: b"app".to_vec(),
            digest_serialization_type: DigestSerializationType::ByteBased,
        });
        assert!(validate_client_message(&msg).is_ok());
    }

    #[test]
    fn test_empty_nonce_rejected() {
        let mut msg = client_message();
        msg.header.client_token = None;
        msg.initialize_message = Some(InitializeMessage {
            client_type: 4,
            nonce: Vec::new(),
            application_client_id: b"app".to_vec(),
            digest_serialization_type: DigestSerializationType::ByteBased,
        });
        assert_eq!(
            validate_client_message(&msg).unwrap_err(),
            ValidationError::EmptyNonce
        );
    }

    #[test]
    fn test_config_change_delay_bounds() {
        let mut msg = server_message();
        msg.config_change_message = Some(ConfigChangeMessage {
            next_message_delay_ms: Some(1),
        });
        assert!(validate_server_message(&msg).is_ok());

        msg.config_change_message = Some(ConfigChangeMessage {
            next_message_delay_ms: Some(0),
        });
        assert!(validate_server_message(&msg).is_err());

        msg.config_change_message = Some(ConfigChangeMessage {
            next_message_delay_ms: None,
        });
        assert!(validate_server_message(&msg).is_ok());
    }

    #[test]
    fn test_sync_request_prefix_bounds() {
        let mut msg = server_message();
        msg.registration_sync_request_message = Some(RegistrationSyncRequestMessage {
            prefix: vec![0xAB],
            prefix_len: 8,
        });
        assert!(validate_server_message(&msg).is_ok());

        msg.registration_sync_request_message = Some(RegistrationSyncRequestMessage {
            prefix: vec![0xAB],
            prefix_len: 9,
        });
        assert!(validate_server_message(&msg).is_err());

        msg.registration_sync_request_message = Some(RegistrationSyncRequestMessage {
            prefix: Vec::new(),
            prefix_len: -1,
        });
        assert!(validate_server_message(&msg).is_err());
    }

    #[test]
    fn test_negative_server_time_rejected() {
        let mut msg = server_message();
        msg.header.server_time_ms = -5;
        assert!(validate_server_message(&msg).is_err());
    }

    #[test]
    fn test_empty_summary_digest_rejected() {
        let mut msg = server_message();
        msg.header.registration_summary = Some(RegistrationSummary {
            num_registrations: 0,
            registration_digest: Vec::new(),
        });
        assert!(validate_server_message(&msg).is_err());
    }
}
