//! The application-facing listener and acknowledgement handles.
//!
//! The engine never calls the application directly: every upcall is
//! posted onto the listener scheduler, and each invalidation delivery
//! carries an opaque [`AckHandle`] the application hands back through
//! `acknowledge` once its caches are updated.

use std::sync::Arc;

use ticl_proto::wire::{deserialize_message, serialize_message};
use ticl_proto::{AckHandleData, Invalidation, ObjectId};

use crate::resources::{Scheduler, NO_DELAY};
use crate::statistics::{ListenerEventType, Statistics};

/// Registration state of an object, as reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// The server is delivering invalidations for the object.
    Registered,
    /// The server is not delivering invalidations for the object.
    Unregistered,
}

/// Why the engine reported an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    /// The server rejected the client's credentials.
    AuthFailure,
    /// Any other failure.
    UnknownFailure,
}

/// An error surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error classification.
    pub reason: ErrorReason,
    /// Whether retrying could help.
    pub is_transient: bool,
    /// Human-readable description.
    pub description: String,
}

impl ErrorInfo {
    /// Create an error info record.
    pub fn new(reason: ErrorReason, is_transient: bool, description: impl Into<String>) -> Self {
        ErrorInfo {
            reason,
            is_transient,
            description: description.into(),
        }
    }
}

/// Opaque token the application returns to acknowledge an invalidation.
///
/// The handle embeds the full invalidation it refers to, so it survives
/// application-side persistence and can be honored after a restart of
/// the application process (though not of the engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle {
    data: Vec<u8>,
}

impl AckHandle {
    /// Build a handle embedding `invalidation`.
    pub(crate) fn for_invalidation(invalidation: &Invalidation) -> Self {
        let data = serialize_message(&AckHandleData {
            invalidation: invalidation.clone(),
        })
        .expect("ack handle serialization should never fail");
        AckHandle { data }
    }

    /// Reconstruct a handle from bytes previously obtained via
    /// [`AckHandle::into_bytes`].
    pub fn from_bytes(data: Vec<u8>) -> Self {
        AckHandle { data }
    }

    /// The handle's opaque byte form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the handle, yielding its opaque byte form.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Decode the embedded invalidation.
    pub(crate) fn decode(&self) -> Option<Invalidation> {
        deserialize_message::<AckHandleData>(&self.data)
            .ok()
            .map(|d| d.invalidation)
    }
}

/// The capability set through which the engine talks to the application.
///
/// Implementations must be cheap to call; the engine invokes them on the
/// listener scheduler, never on its internal thread.
pub trait InvalidationListener: Send + Sync {
    /// The engine holds a session token and is ready for registrations.
    fn ready(&self);

    /// An object changed to a known version.
    fn invalidate(&self, invalidation: Invalidation, ack_handle: AckHandle);

    /// An object changed but the server does not know to which version.
    fn invalidate_unknown_version(&self, object_id: ObjectId, ack_handle: AckHandle);

    /// Every registered object may be stale; drop all caches.
    fn invalidate_all(&self, ack_handle: AckHandle);

    /// A registration operation settled with the given state.
    fn inform_registration_status(&self, object_id: ObjectId, state: RegistrationState);

    /// A registration operation failed.
    fn inform_registration_failure(
        &self,
        object_id: ObjectId,
        is_transient: bool,
        description: String,
    );

    /// The engine lost its registration state; the application must
    /// re-issue registrations for objects whose digest matches the
    /// prefix.
    fn reissue_registrations(&self, prefix: Vec<u8>, prefix_len: i32);

    /// An error occurred; terminal when `is_transient` is false and the
    /// reason is an auth failure.
    fn inform_error(&self, error: ErrorInfo);
}

/// Proxies listener calls onto the listener scheduler and counts them.
pub(crate) struct ListenerProxy {
    listener: Arc<dyn InvalidationListener>,
    scheduler: Arc<dyn Scheduler>,
    statistics: Arc<Statistics>,
}

impl ListenerProxy {
    pub fn new(
        listener: Arc<dyn InvalidationListener>,
        scheduler: Arc<dyn Scheduler>,
        statistics: Arc<Statistics>,
    ) -> Self {
        ListenerProxy {
            listener,
            scheduler,
            statistics,
        }
    }

    fn post(&self, call: impl FnOnce(&dyn InvalidationListener) + Send + 'static) {
        let listener = Arc::clone(&self.listener);
        self.scheduler
            .schedule(NO_DELAY, Box::new(move || call(listener.as_ref())));
    }

    pub fn ready(&self) {
        self.post(|l| l.ready());
    }

    pub fn invalidate(&self, invalidation: Invalidation, ack_handle: AckHandle) {
        self.statistics
            .record_listener_event(ListenerEventType::Invalidate);
        self.post(move |l| l.invalidate(invalidation, ack_handle));
    }

    pub fn invalidate_unknown_version(&self, object_id: ObjectId, ack_handle: AckHandle) {
        self.statistics
            .record_listener_event(ListenerEventType::InvalidateUnknown);
        self.post(move |l| l.invalidate_unknown_version(object_id, ack_handle));
    }

    pub fn invalidate_all(&self, ack_handle: AckHandle) {
        self.statistics
            .record_listener_event(ListenerEventType::InvalidateAll);
        self.post(move |l| l.invalidate_all(ack_handle));
    }

    pub fn inform_registration_status(&self, object_id: ObjectId, state: RegistrationState) {
        self.statistics
            .record_listener_event(ListenerEventType::InformRegistrationStatus);
        self.post(move |l| l.inform_registration_status(object_id, state));
    }

    pub fn inform_registration_failure(
        &self,
        object_id: ObjectId,
        is_transient: bool,
        description: String,
    ) {
        self.statistics
            .record_listener_event(ListenerEventType::InformRegistrationFailure);
        self.post(move |l| l.inform_registration_failure(object_id, is_transient, description));
    }

    pub fn reissue_registrations(&self, prefix: Vec<u8>, prefix_len: i32) {
        self.statistics
            .record_listener_event(ListenerEventType::ReissueRegistrations);
        self.post(move |l| l.reissue_registrations(prefix, prefix_len));
    }

    pub fn inform_error(&self, error: ErrorInfo) {
        self.statistics
            .record_listener_event(ListenerEventType::InformError);
        self.post(move |l| l.inform_error(error));
    }
}
