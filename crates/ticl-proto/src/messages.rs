//! Client/server envelopes and their sub-messages.
//!
//! The wire protocol has exactly one client-to-server envelope shape and
//! one server-to-client envelope shape. Each envelope carries a required
//! header plus any subset of the optional sub-messages, so several logical
//! operations batch into a single send.

use serde::{Deserialize, Serialize};

use crate::types::{
    ErrorCode, InfoType, Invalidation, ObjectId, PropertyRecord, Registration, RegistrationStatus,
    RegistrationSubtree, RegistrationSummary,
};
use crate::version::{ClientVersion, ProtocolVersion};

/// How the client serializes object digests in registration summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestSerializationType {
    /// Digests are raw bytes. The only variant this library produces.
    ByteBased,
    /// Digests are encoded as numbers. Accepted but never produced.
    NumberBased,
}

/// Header present on every client-to-server envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHeader {
    /// Protocol version spoken by the client.
    pub protocol_version: ProtocolVersion,
    /// Session token, absent only until the server has assigned one.
    pub client_token: Option<Vec<u8>>,
    /// Summary of the client's desired registrations.
    pub registration_summary: Option<RegistrationSummary>,
    /// Client wall-clock time when the envelope was built, in ms.
    pub client_time_ms: i64,
    /// Highest server timestamp the client has observed, in ms.
    pub max_known_server_time_ms: i64,
    /// Strictly increasing per-client message id.
    pub message_id: u64,
}

/// Requests a fresh client token from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeMessage {
    /// Client type code assigned by the invalidation service backend.
    pub client_type: i32,
    /// Locally-generated bytes correlating the token reply with this
    /// request.
    pub nonce: Vec<u8>,
    /// Application identifier used for server-side squelching.
    pub application_client_id: Vec<u8>,
    /// Digest encoding the client will use in summaries.
    pub digest_serialization_type: DigestSerializationType,
}

/// A batch of registration operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationMessage {
    /// Operations in enqueue order; at most one per object.
    pub registrations: Vec<Registration>,
}

/// Registration subtrees answering a registration sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSyncMessage {
    /// The subtrees being reported.
    pub subtrees: Vec<RegistrationSubtree>,
}

/// A set of invalidations. Server-to-client this is a delivery; inside a
/// client envelope it acknowledges previously delivered invalidations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    /// The invalidations being delivered or acknowledged.
    pub invalidations: Vec<Invalidation>,
}

/// Client self-description: version, configuration, and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoMessage {
    /// The client library build.
    pub client_version: ClientVersion,
    /// Configuration parameters, included when counters are.
    pub config_params: Vec<PropertyRecord>,
    /// Non-zero performance counters, included when requested or stale.
    pub performance_counters: Vec<PropertyRecord>,
    /// Asks the server to echo back its registration summary.
    pub server_registration_summary_requested: bool,
}

/// The full client-to-server envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientToServerMessage {
    /// Required header.
    pub header: ClientHeader,
    /// Token acquisition request, if any.
    pub initialize_message: Option<InitializeMessage>,
    /// Registration operations, if any.
    pub registration_message: Option<RegistrationMessage>,
    /// Registration sync subtrees, if any.
    pub registration_sync_message: Option<RegistrationSyncMessage>,
    /// Acknowledged invalidations, if any.
    pub invalidation_ack_message: Option<InvalidationMessage>,
    /// Client info, if any.
    pub info_message: Option<InfoMessage>,
}

/// Header present on every server-to-client envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHeader {
    /// Protocol version spoken by the server.
    pub protocol_version: ProtocolVersion,
    /// The session token (or, while a token is being assigned, the nonce
    /// from the initialize request this envelope answers).
    pub client_token: Vec<u8>,
    /// The server's view of the client's registrations.
    pub registration_summary: Option<RegistrationSummary>,
    /// Server time when the envelope was built, in ms.
    pub server_time_ms: i64,
    /// Server-side message id for debugging, if any.
    pub message_id: Option<u64>,
}

/// Assigns or destroys the client token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenControlMessage {
    /// The new token, or `None` to destroy the current one and force the
    /// client to reacquire.
    pub new_token: Option<Vec<u8>>,
}

/// Server-reported outcomes of registration operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatusMessage {
    /// One status per processed operation.
    pub registration_statuses: Vec<RegistrationStatus>,
}

/// Asks the client to report registrations under a digest prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSyncRequestMessage {
    /// Digest prefix bytes; empty means everything.
    pub prefix: Vec<u8>,
    /// Number of significant bits in `prefix`.
    pub prefix_len: i32,
}

/// Tells the client to hold off sending for a while.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChangeMessage {
    /// Quiet period: the client must not send for this many ms.
    pub next_message_delay_ms: Option<i64>,
}

/// Asks the client for information, e.g. performance counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRequestMessage {
    /// What the server wants reported.
    pub info_types: Vec<InfoType>,
}

/// Reports a server-side error to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error classification.
    pub code: ErrorCode,
    /// Human-readable description.
    pub description: String,
}

/// The full server-to-client envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerToClientMessage {
    /// Required header.
    pub header: ServerHeader,
    /// Token assignment or destruction, if any.
    pub token_control_message: Option<TokenControlMessage>,
    /// Invalidation deliveries, if any.
    pub invalidation_message: Option<InvalidationMessage>,
    /// Registration operation outcomes, if any.
    pub registration_status_message: Option<RegistrationStatusMessage>,
    /// Registration sync request, if any.
    pub registration_sync_request_message: Option<RegistrationSyncRequestMessage>,
    /// Quiet period directive, if any.
    pub config_change_message: Option<ConfigChangeMessage>,
    /// Info request, if any.
    pub info_request_message: Option<InfoRequestMessage>,
    /// Error report, if any.
    pub error_message: Option<ErrorMessage>,
}

impl ClientToServerMessage {
    /// An envelope holding only the given header.
    pub fn with_header(header: ClientHeader) -> Self {
        ClientToServerMessage {
            header,
            initialize_message: None,
            registration_message: None,
            registration_sync_message: None,
            invalidation_ack_message: None,
            info_message: None,
        }
    }
}

impl ServerToClientMessage {
    /// An envelope holding only the given header.
    pub fn with_header(header: ServerHeader) -> Self {
        ServerToClientMessage {
            header,
            token_control_message: None,
            invalidation_message: None,
            registration_status_message: None,
            registration_sync_request_message: None,
            config_change_message: None,
            info_request_message: None,
            error_message: None,
        }
    }
}
