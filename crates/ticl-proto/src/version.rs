//! Protocol and client version types.
//!
//! Every envelope on the wire carries a `ProtocolVersion`. Receivers drop
//! messages whose major version differs from their own; the minor version
//! is informational only and ends up in logs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Major version of the client/server wire protocol.
pub const PROTOCOL_MAJOR_VERSION: i32 = 3;

/// Minor version of the client/server wire protocol.
pub const PROTOCOL_MINOR_VERSION: i32 = 0;

/// Major version of this client library.
pub const CLIENT_MAJOR_VERSION: i32 = 3;

/// Minor version of this client library.
pub const CLIENT_MINOR_VERSION: i32 = 0;

/// A `(major, minor)` protocol version pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Major version - incompatible changes.
    pub major: i32,
    /// Minor version - informational only.
    pub minor: i32,
}

impl ProtocolVersion {
    /// Create a new protocol version.
    pub fn new(major: i32, minor: i32) -> Self {
        ProtocolVersion { major, minor }
    }

    /// Returns the protocol version spoken by this library.
    pub fn current() -> Self {
        ProtocolVersion::new(PROTOCOL_MAJOR_VERSION, PROTOCOL_MINOR_VERSION)
    }

    /// Check whether this version is compatible with another.
    /// Versions are compatible if they have the same major version.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Identifies the client library build inside info messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientVersion {
    /// Version of the client library.
    pub version: ProtocolVersion,
    /// Host platform description, e.g. "linux-x86_64".
    pub platform: String,
    /// Implementation language of the library.
    pub language: String,
    /// Free-form application identifier for monitoring.
    pub application_info: String,
}

impl ClientVersion {
    /// Create a client version record for this library build.
    pub fn new(platform: impl Into<String>, application_info: impl Into<String>) -> Self {
        ClientVersion {
            version: ProtocolVersion::new(CLIENT_MAJOR_VERSION, CLIENT_MINOR_VERSION),
            platform: platform.into(),
            language: "Rust".to_string(),
            application_info: application_info.into(),
        }
    }
}
