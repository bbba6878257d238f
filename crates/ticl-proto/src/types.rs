//! Core data types shared by client and server envelopes.
//!
//! Object identifiers, invalidations, registration records, and status
//! codes. All types are plain data with structural equality; bincode
//! handles the wire encoding.

use serde::{Deserialize, Serialize};

/// Maximum length of an object name in bytes.
pub const MAX_OBJECT_NAME_LENGTH: usize = 64;

/// Object source reserved for protocol-internal objects.
pub const INTERNAL_OBJECT_SOURCE: i32 = 1;

/// An application object identifier: a `(source, name)` pair.
///
/// Equality and hashing are structural. The ordering is only used to keep
/// collections deterministic; it has no protocol meaning.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Source id assigned by the invalidation service backend.
    pub source: i32,
    /// Application-chosen name, at most [`MAX_OBJECT_NAME_LENGTH`] bytes.
    pub name: Vec<u8>,
}

impl ObjectId {
    /// Create an object id.
    pub fn new(source: i32, name: impl Into<Vec<u8>>) -> Self {
        ObjectId {
            source,
            name: name.into(),
        }
    }

    /// Returns the distinguished identifier standing for every registered
    /// object. An invalidation carrying it drops all cached objects.
    pub fn all_objects() -> Self {
        ObjectId::new(INTERNAL_OBJECT_SOURCE, Vec::new())
    }

    /// True if this is the all-objects identifier.
    pub fn is_all_objects(&self) -> bool {
        self.source == INTERNAL_OBJECT_SOURCE && self.name.is_empty()
    }
}

/// A versioned invalidation for a single object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Invalidation {
    /// The object being invalidated.
    pub object_id: ObjectId,
    /// Whether `version` is a real version number. When false the server
    /// only knows the object changed, not to which version.
    pub is_known_version: bool,
    /// Version of the object, non-negative.
    pub version: i64,
    /// Optional application payload. Not retained across restart.
    pub payload: Option<Vec<u8>>,
}

impl Invalidation {
    /// Create a known-version invalidation without payload.
    pub fn new(object_id: ObjectId, version: i64) -> Self {
        Invalidation {
            object_id,
            is_known_version: true,
            version,
            payload: None,
        }
    }

    /// Create an unknown-version invalidation for an object.
    pub fn unknown_version(object_id: ObjectId) -> Self {
        Invalidation {
            object_id,
            is_known_version: false,
            version: 0,
            payload: None,
        }
    }
}

/// Data embedded in an acknowledgement handle.
///
/// The handle round-trips the full invalidation so that an ack can be
/// matched to what the server delivered without any client-side table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckHandleData {
    /// The invalidation being acknowledged.
    pub invalidation: Invalidation,
}

/// Whether a registration operation registers or unregisters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegistrationOpType {
    /// Start delivering invalidations for the object.
    Register,
    /// Stop delivering invalidations for the object.
    Unregister,
}

/// A single registration operation on the wire.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Registration {
    /// Object the operation applies to.
    pub object_id: ObjectId,
    /// Register or unregister.
    pub op_type: RegistrationOpType,
}

/// Result code for a server-processed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// The operation succeeded.
    Success,
    /// The operation failed but may be retried.
    TransientFailure,
    /// The operation failed and retrying will not help.
    PermanentFailure,
}

/// Status of a server-processed operation with optional detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Result code.
    pub code: StatusCode,
    /// Human-readable description, mainly for logs.
    pub description: Option<String>,
}

impl Status {
    /// A bare success status.
    pub fn success() -> Self {
        Status {
            code: StatusCode::Success,
            description: None,
        }
    }

    /// True when the code is [`StatusCode::Success`].
    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }
}

/// Outcome of one registration operation, reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatus {
    /// The operation this status refers to.
    pub registration: Registration,
    /// How the server processed it.
    pub status: Status,
}

/// Compact summary of a registration set: count plus set digest.
///
/// Client and server exchange summaries to cheaply detect divergent
/// registration views without shipping the whole set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSummary {
    /// Number of registered objects.
    pub num_registrations: i32,
    /// Digest over the registered set, per the object digest scheme.
    pub registration_digest: Vec<u8>,
}

/// A set of registered objects sent in response to a registration sync
/// request. The simple store always answers with a single subtree
/// holding every registration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationSubtree {
    /// Objects registered under the requested digest prefix.
    pub registered_objects: Vec<ObjectId>,
}

/// Error codes a server may send in an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The client's credentials were rejected; the client must stop.
    AuthFailure,
    /// Any other failure; informational.
    UnknownFailure,
}

/// Kinds of information a server may request from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfoType {
    /// Ask the client to report its performance counters.
    GetPerformanceCounters,
}

/// A named integer datum inside an info message (a counter or a
/// configuration parameter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Property name, e.g. `"sent_message_type.total"`.
    pub name: String,
    /// Property value.
    pub value: i64,
}

impl PropertyRecord {
    /// Create a property record.
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        PropertyRecord {
            name: name.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_equality_is_structural() {
        let a = ObjectId::new(7, b"feed".to_vec());
        let b = ObjectId::new(7, b"feed".to_vec());
        let c = ObjectId::new(8, b"feed".to_vec());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_all_objects_id() {
        let all = ObjectId::all_objects();
        assert!(all.is_all_objects());
        assert!(!ObjectId::new(INTERNAL_OBJECT_SOURCE, b"x".to_vec()).is_all_objects());
        assert!(!ObjectId::new(4, Vec::new()).is_all_objects());
    }

    #[test]
    fn test_unknown_version_invalidation() {
        let inv = Invalidation::unknown_version(ObjectId::new(4, b"obj".to_vec()));
        assert!(!inv.is_known_version);
        assert_eq!(inv.version, 0);
        assert!(inv.payload.is_none());
    }

    #[test]
    fn test_status_is_success() {
        assert!(Status::success().is_success());
        let failed = Status {
            code: StatusCode::PermanentFailure,
            description: Some("no".to_string()),
        };
        assert!(!failed.is_success());
    }
}
