//! Desired-registration tracking and server reconciliation.
//!
//! The registration manager owns the single source of truth for what the
//! application wants registered. The server's view arrives as summaries
//! in message headers and as per-operation statuses; divergence is
//! detected by comparing summaries and repaired through registration
//! sync.

use std::sync::Arc;

use tracing::{debug, warn};

use ticl_proto::{
    ObjectId, RegistrationOpType, RegistrationStatus, RegistrationSubtree, RegistrationSummary,
};

use crate::digest::{DigestFunction, SimpleRegistrationStore};
use crate::statistics::{ClientErrorType, Statistics};

/// The empty digest prefix, matching every object.
pub const EMPTY_PREFIX: &[u8] = b"";

/// Tracks the application's desired registrations and the last summary
/// the server reported.
pub struct RegistrationManager {
    desired_registrations: SimpleRegistrationStore,
    last_known_server_summary: RegistrationSummary,
    statistics: Arc<Statistics>,
}

impl RegistrationManager {
    /// Create a manager with no registrations. The server summary starts
    /// as the empty-set summary, so a fresh client is in sync.
    pub fn new(digest_fn: Box<dyn DigestFunction>, statistics: Arc<Statistics>) -> Self {
        let desired_registrations = SimpleRegistrationStore::new(digest_fn);
        let last_known_server_summary = RegistrationSummary {
            num_registrations: 0,
            registration_digest: desired_registrations.digest().to_vec(),
        };
        RegistrationManager {
            desired_registrations,
            last_known_server_summary,
            statistics,
        }
    }

    /// Apply (un)registration intents from the application.
    pub fn perform_operations(&mut self, object_ids: &[ObjectId], op_type: RegistrationOpType) {
        for object_id in object_ids {
            match op_type {
                RegistrationOpType::Register => {
                    self.desired_registrations.add(object_id.clone());
                }
                RegistrationOpType::Unregister => {
                    self.desired_registrations.remove(object_id);
                }
            }
        }
    }

    /// Process per-operation statuses from the server.
    ///
    /// An item succeeds iff its status code is success and its operation
    /// type agrees with the current desired state of the object. Any
    /// failed or discrepant item drops the object from the desired set;
    /// the application is told and may re-register. The returned booleans
    /// pair up with the input statuses.
    pub fn handle_registration_status(
        &mut self,
        registration_statuses: &[RegistrationStatus],
    ) -> Vec<bool> {
        let mut results = Vec::with_capacity(registration_statuses.len());
        for status in registration_statuses {
            let object_id = &status.registration.object_id;
            let mut success = status.status.is_success();
            if success {
                let app_wants_registration = self.desired_registrations.contains(object_id);
                let is_register = status.registration.op_type == RegistrationOpType::Register;
                if is_register != app_wants_registration {
                    warn!(
                        ?object_id,
                        op_type = ?status.registration.op_type,
                        "registration status disagrees with desired state"
                    );
                    self.statistics
                        .record_client_error(ClientErrorType::RegistrationDiscrepancy);
                    self.desired_registrations.remove(object_id);
                    success = false;
                }
            } else {
                debug!(?object_id, status = ?status.status.code, "registration failed at server");
                self.desired_registrations.remove(object_id);
            }
            results.push(success);
        }
        results
    }

    /// Record the server's registration summary from a message header.
    pub fn inform_server_summary(&mut self, summary: &RegistrationSummary) {
        self.last_known_server_summary = summary.clone();
    }

    /// True when the last server summary matches the local summary.
    pub fn is_in_sync_with_server(&self) -> bool {
        let local = self.summary();
        self.last_known_server_summary.num_registrations == local.num_registrations
            && self.last_known_server_summary.registration_digest == local.registration_digest
    }

    /// Summary over the current desired registrations.
    pub fn summary(&self) -> RegistrationSummary {
        RegistrationSummary {
            num_registrations: self.desired_registrations.len() as i32,
            registration_digest: self.desired_registrations.digest().to_vec(),
        }
    }

    /// Registrations under a digest prefix, for answering a registration
    /// sync request.
    pub fn registrations(&self, prefix: &[u8], prefix_len: i32) -> RegistrationSubtree {
        RegistrationSubtree {
            registered_objects: self
                .desired_registrations
                .elements_with_prefix(prefix, prefix_len),
        }
    }

    /// Drop every registration, returning the dropped objects. Used on
    /// auth failure.
    pub fn remove_registered_objects(&mut self) -> Vec<ObjectId> {
        self.desired_registrations.remove_all()
    }

    /// True if `object_id` is currently desired-registered.
    pub fn is_registered(&mut self, object_id: &ObjectId) -> bool {
        self.desired_registrations.contains(object_id)
    }

    /// Number of desired registrations.
    pub fn registration_count(&self) -> usize {
        self.desired_registrations.len()
    }
}
