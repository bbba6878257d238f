//! Persistent session state with an integrity code.
//!
//! Only the client token survives restart. The blob pairs the serialized
//! state with an authentication code computed by the digest function over
//! a fixed keyword plus the state bytes; a blob whose code does not
//! verify is treated as absent and the client starts fresh.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::digest::DigestFunction;

/// The single storage key under which client state is persisted.
pub const CLIENT_TOKEN_KEY: &str = "ClientToken";

/// Keyword mixed into the authentication code so that arbitrary stored
/// bytes do not verify.
const AUTHENTICATION_KEYWORD: &[u8] = b"ticl-persistent-state";

/// The state that survives restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    /// The server-assigned session token.
    pub client_token: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateBlob {
    state: PersistentState,
    authentication_code: Vec<u8>,
}

fn authentication_code(state_bytes: &[u8], digest_fn: &mut dyn DigestFunction) -> Vec<u8> {
    digest_fn.reset();
    digest_fn.update(AUTHENTICATION_KEYWORD);
    digest_fn.update(state_bytes);
    digest_fn.digest()
}

/// Serialize `state` with its authentication code.
pub fn serialize_state(state: &PersistentState, digest_fn: &mut dyn DigestFunction) -> Vec<u8> {
    let state_bytes =
        bincode::serialize(state).expect("persistent state serialization should never fail");
    let blob = StateBlob {
        state: state.clone(),
        authentication_code: authentication_code(&state_bytes, digest_fn),
    };
    bincode::serialize(&blob).expect("state blob serialization should never fail")
}

/// Deserialize and verify a state blob. Returns `None` when the bytes do
/// not parse or the authentication code does not match.
pub fn deserialize_state(
    bytes: &[u8],
    digest_fn: &mut dyn DigestFunction,
) -> Option<PersistentState> {
    let blob: StateBlob = match bincode::deserialize(bytes) {
        Ok(blob) => blob,
        Err(e) => {
            warn!(error = %e, "persistent state blob failed to parse");
            return None;
        }
    };
    let state_bytes = bincode::serialize(&blob.state)
        .expect("persistent state serialization should never fail");
    if authentication_code(&state_bytes, digest_fn) != blob.authentication_code {
        warn!("persistent state blob failed authentication");
        return None;
    }
    Some(blob.state)
}
