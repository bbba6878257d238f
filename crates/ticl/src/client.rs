//! The invalidation client engine.
//!
//! Drives the token/session state machine, wires the registration manager
//! to the protocol handler, delivers invalidations to the application
//! listener, and persists the session token. Between start and stop,
//! exactly one of the client token and the nonce is set: the nonce while
//! a token acquisition is in flight, the token once the server has
//! assigned one.
//!
//! All state lives behind one mutex and is only touched from tasks
//! running on the internal scheduler; the public entry points post
//! themselves there before doing anything.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, trace, warn};

use ticl_proto::validation::validate_invalidation;
use ticl_proto::{
    ClientVersion, ErrorCode, InfoType, Invalidation, ObjectId, RegistrationOpType,
    RegistrationStatus,
};

use crate::config::ClientConfig;
use crate::digest::{DigestFunction, Sha1DigestFunction};
use crate::error::Result;
use crate::listener::{
    AckHandle, ErrorInfo, ErrorReason, InvalidationListener, ListenerProxy, RegistrationState,
};
use crate::operations::{OperationId, OperationScheduler};
use crate::persistence::{deserialize_state, serialize_state, PersistentState, CLIENT_TOKEN_KEY};
use crate::protocol::{ProtocolHandler, ServerMessageHeader, BATCHING_TASK};
use crate::registration::RegistrationManager;
use crate::resources::{StorageError, SystemResources, NO_DELAY};
use crate::smear::{ExponentialBackoff, Smearer};
use crate::statistics::{ClientErrorType, IncomingOperationType, ReceivedMessageType, Statistics};

/// Operation id of the periodic heartbeat task.
pub const HEARTBEAT_TASK: OperationId = OperationId("heartbeat");

/// Operation id of the network timeout task.
pub const TIMEOUT_TASK: OperationId = OperationId("network-timeout");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    /// Constructed; `ready` has not been delivered yet.
    NotStarted,
    /// Token in hand, listener informed.
    Started,
    /// Terminal.
    Stopped,
}

struct ClientCore {
    resources: SystemResources,
    config: ClientConfig,
    statistics: Arc<Statistics>,
    listener: ListenerProxy,
    client_type: i32,
    application_client_id: Vec<u8>,
    /// Digest function for the persistent-state authentication code.
    persistence_digest_fn: Box<dyn DigestFunction>,
    registration_manager: RegistrationManager,
    protocol: ProtocolHandler,
    operations: OperationScheduler,
    run_state: RunState,
    /// Guards against double start.
    start_requested: bool,
    client_token: Option<Vec<u8>>,
    nonce: Option<Vec<u8>>,
    token_backoff: ExponentialBackoff,
    persistence_backoff: ExponentialBackoff,
    perf_smearer: Smearer,
    last_performance_send_ms: i64,
    weak_self: Weak<Mutex<ClientCore>>,
}

impl ClientCore {
    fn now_ms(&self) -> i64 {
        self.resources.internal_scheduler.now_ms()
    }

    /// Post `work` onto the internal scheduler after `delay`.
    fn post(&self, delay: Duration, work: impl FnOnce(&mut ClientCore) + Send + 'static) {
        let weak = self.weak_self.clone();
        self.resources.internal_scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    work(&mut core.lock().unwrap());
                }
            }),
        );
    }

    fn assert_internal_thread(&self) {
        debug_assert!(
            self.resources.internal_scheduler.is_on_thread(),
            "not on internal thread"
        );
    }

    // ---- Start / stop ----

    fn start_internal(&mut self) {
        self.assert_internal_thread();
        if self.start_requested {
            warn!("start called twice; ignoring");
            return;
        }
        self.start_requested = true;
        info!(client_type = self.client_type, "starting invalidation client");

        // Read the state blob, then pick up in finish_start once the
        // value is in.
        let weak = self.weak_self.clone();
        let internal = Arc::clone(&self.resources.internal_scheduler);
        self.resources.storage.read_key(
            CLIENT_TOKEN_KEY,
            Box::new(move |result| {
                internal.schedule(
                    NO_DELAY,
                    Box::new(move || {
                        if let Some(core) = weak.upgrade() {
                            core.lock().unwrap().finish_start(result);
                        }
                    }),
                );
            }),
        );
    }

    fn finish_start(&mut self, read_result: std::result::Result<Option<Vec<u8>>, StorageError>) {
        self.assert_internal_thread();
        if self.run_state == RunState::Stopped {
            return;
        }

        let blob = match read_result {
            Ok(blob) => blob,
            Err(e) => {
                warn!(error = %e, "could not read state blob");
                self.statistics
                    .record_client_error(ClientErrorType::PersistentReadFailure);
                None
            }
        };

        let persisted = blob.and_then(|bytes| {
            let state = deserialize_state(&bytes, self.persistence_digest_fn.as_mut());
            if state.is_none() {
                error!("failed deserializing persistent state");
                self.statistics
                    .record_client_error(ClientErrorType::PersistentDeserializationFailure);
            }
            state
        });

        match persisted {
            Some(state) => {
                // Use the stored token and announce the restart with a
                // heartbeat; the server may have marked us offline.
                info!("restarting from persistent state");
                self.set_client_token(Some(state.client_token));
                self.send_info_message(false);
            }
            None => {
                info!("starting with no previous state");
                self.acquire_token("startup");
            }
        }
    }

    fn stop_internal(&mut self) {
        self.assert_internal_thread();
        if self.run_state == RunState::Stopped {
            return;
        }
        warn!("invalidation client stopped");
        self.run_state = RunState::Stopped;
    }

    // ---- Token state machine ----

    fn set_nonce(&mut self, new_nonce: Option<Vec<u8>>) {
        debug_assert!(
            new_nonce.is_none() || self.client_token.is_none(),
            "tried to set nonce with existing token"
        );
        self.nonce = new_nonce;
    }

    fn set_client_token(&mut self, new_token: Option<Vec<u8>>) {
        debug_assert!(
            new_token.is_none() || self.nonce.is_none(),
            "tried to set token with existing nonce"
        );
        let finish_starting = self.run_state == RunState::NotStarted
            && self.client_token.is_none()
            && new_token.is_some();
        self.client_token = new_token;

        if self.client_token.is_some() {
            // Token acquired: future acquisitions restart from the
            // initial backoff delay, and regular heartbeats begin.
            self.token_backoff.reset();
            self.operations.schedule(HEARTBEAT_TASK);
        }
        if finish_starting {
            self.finish_starting();
        }
    }

    fn finish_starting(&mut self) {
        self.run_state = RunState::Started;
        info!("invalidation client ready");
        self.listener.ready();
        // The registration digest is not persisted, so the application
        // re-issues all registrations on every (re)start.
        self.listener
            .reissue_registrations(crate::registration::EMPTY_PREFIX.to_vec(), 0);
    }

    /// Request a fresh token now. No-op if a token is already held.
    fn acquire_token(&mut self, debug_string: &'static str) {
        self.assert_internal_thread();
        if self.run_state == RunState::Stopped || self.client_token.is_some() {
            return;
        }
        let nonce = self.now_ms().to_string().into_bytes();
        debug!(reason = debug_string, "requesting new client token");
        self.set_nonce(Some(nonce.clone()));
        self.protocol
            .queue_initialize(self.client_type, self.application_client_id.clone(), nonce);
        self.operations.schedule(TIMEOUT_TASK);
    }

    /// Drop the current token and request a fresh one after the next
    /// backoff delay.
    fn schedule_acquire_token(&mut self, debug_string: &'static str) {
        self.assert_internal_thread();
        self.set_client_token(None);
        let delay = self.token_backoff.next_delay();
        debug!(
            reason = debug_string,
            delay_ms = delay.as_millis() as u64,
            "token acquisition scheduled"
        );
        self.post(delay, move |core| core.acquire_token(debug_string));
    }

    fn handle_token_changed(&mut self, header: &ServerMessageHeader, new_token: Option<Vec<u8>>) {
        self.assert_internal_thread();
        // A valid client token was already checked in the protocol
        // handler. With a nonce outstanding, the envelope must carry that
        // nonce.
        if let Some(nonce) = &self.nonce {
            if header.token == *nonce {
                debug!("accepting server message with matching nonce");
                self.set_nonce(None);
            } else {
                self.statistics
                    .record_client_error(ClientErrorType::NonceMismatch);
                info!("rejecting server message with mismatched nonce");
                return;
            }
        }

        self.process_server_header(header);

        match new_token {
            None => {
                info!("server destroyed existing token");
                self.schedule_acquire_token("destroy");
            }
            Some(token) => {
                info!("new token assigned by server");
                self.set_client_token(Some(token));
                self.write_state_blob();
            }
        }
    }

    fn process_server_header(&mut self, header: &ServerMessageHeader) {
        self.assert_internal_thread();
        debug_assert!(
            self.nonce.is_none(),
            "cannot process server header with non-empty nonce"
        );
        if let Some(summary) = &header.registration_summary {
            self.registration_manager.inform_server_summary(summary);
        }
    }

    // ---- Inbound dispatch ----

    fn handle_incoming_message(&mut self, bytes: Vec<u8>) {
        self.assert_internal_thread();
        if self.run_state == RunState::Stopped {
            return;
        }
        let now_ms = self.now_ms();
        let Some(message) =
            self.protocol
                .handle_inbound(&bytes, now_ms, self.client_token.as_deref())
        else {
            return;
        };

        let header = ServerMessageHeader {
            token: message.header.client_token.clone(),
            registration_summary: message.header.registration_summary.clone(),
        };

        if let Some(token_control) = message.token_control_message {
            self.statistics
                .record_received_message(ReceivedMessageType::TokenControl);
            self.handle_token_changed(&header, token_control.new_token);
        }

        // Whether we hold a valid token is only known after the token
        // control upcall: it may have assigned one or destroyed ours.
        if self.client_token.is_none() {
            return;
        }

        self.process_server_header(&header);

        if let Some(invalidations) = message.invalidation_message {
            self.statistics
                .record_received_message(ReceivedMessageType::Invalidation);
            self.handle_invalidations(invalidations.invalidations);
        }
        if let Some(statuses) = message.registration_status_message {
            self.statistics
                .record_received_message(ReceivedMessageType::RegistrationStatus);
            self.handle_registration_statuses(&statuses.registration_statuses);
        }
        if let Some(sync_request) = message.registration_sync_request_message {
            self.statistics
                .record_received_message(ReceivedMessageType::RegistrationSyncRequest);
            self.handle_registration_sync_request(&sync_request.prefix, sync_request.prefix_len);
        }
        if let Some(info_request) = message.info_request_message {
            self.statistics
                .record_received_message(ReceivedMessageType::InfoRequest);
            self.handle_info_request(&info_request.info_types);
        }
        if let Some(error_message) = message.error_message {
            self.statistics
                .record_received_message(ReceivedMessageType::Error);
            self.handle_error_message(error_message.code, error_message.description);
        }
    }

    fn handle_invalidations(&mut self, invalidations: Vec<Invalidation>) {
        for invalidation in invalidations {
            let ack_handle = AckHandle::for_invalidation(&invalidation);
            if invalidation.object_id.is_all_objects() {
                info!("issuing invalidate-all");
                self.listener.invalidate_all(ack_handle);
            } else if invalidation.is_known_version {
                trace!(object_id = ?invalidation.object_id, version = invalidation.version, "issuing invalidate");
                self.listener.invalidate(invalidation, ack_handle);
            } else {
                self.listener
                    .invalidate_unknown_version(invalidation.object_id, ack_handle);
            }
        }
    }

    fn handle_registration_statuses(&mut self, statuses: &[RegistrationStatus]) {
        let outcomes = self.registration_manager.handle_registration_status(statuses);
        for (status, was_success) in statuses.iter().zip(outcomes) {
            let object_id = status.registration.object_id.clone();
            if was_success {
                let state = match status.registration.op_type {
                    RegistrationOpType::Register => RegistrationState::Registered,
                    RegistrationOpType::Unregister => RegistrationState::Unregistered,
                };
                self.listener.inform_registration_status(object_id, state);
            } else {
                let is_permanent =
                    status.status.code == ticl_proto::StatusCode::PermanentFailure;
                let description = status.status.description.clone().unwrap_or_default();
                self.listener
                    .inform_registration_failure(object_id, !is_permanent, description);
            }
        }
    }

    fn handle_registration_sync_request(&mut self, prefix: &[u8], prefix_len: i32) {
        let subtree = self.registration_manager.registrations(prefix, prefix_len);
        self.protocol.queue_subtree(subtree);
    }

    fn handle_info_request(&mut self, info_types: &[InfoType]) {
        let must_send_performance_counters = info_types
            .iter()
            .any(|t| *t == InfoType::GetPerformanceCounters);
        self.send_info_message(must_send_performance_counters);
    }

    fn handle_error_message(&mut self, code: ErrorCode, description: String) {
        error!(?code, %description, "received error message from server");

        if code != ErrorCode::AuthFailure {
            // Informational; the engine keeps running.
            self.listener.inform_error(ErrorInfo::new(
                ErrorReason::UnknownFailure,
                false,
                description,
            ));
            return;
        }

        // Auth failure: every registration is dead, then the terminal
        // error, then stop - in that order on the listener scheduler.
        let removed = self.registration_manager.remove_registered_objects();
        warn!(count = removed.len(), "auth failure: dropping registrations and stopping");
        let failure_description = format!("Auth error: {description}");
        for object_id in removed {
            self.listener.inform_registration_failure(
                object_id,
                false,
                failure_description.clone(),
            );
        }
        self.listener.inform_error(ErrorInfo::new(
            ErrorReason::AuthFailure,
            false,
            failure_description,
        ));

        let weak = self.weak_self.clone();
        let internal = Arc::clone(&self.resources.internal_scheduler);
        self.resources.listener_scheduler.schedule(
            NO_DELAY,
            Box::new(move || {
                internal.schedule(
                    NO_DELAY,
                    Box::new(move || {
                        if let Some(core) = weak.upgrade() {
                            core.lock().unwrap().stop_internal();
                        }
                    }),
                );
            }),
        );
    }

    // ---- Periodic tasks ----

    fn run_batching_task(&mut self) {
        self.assert_internal_thread();
        if self.run_state == RunState::Stopped {
            return;
        }
        let now_ms = self.now_ms();
        let summary = self.registration_manager.summary();
        let token = self.client_token.clone();
        self.protocol.send_batched_message(
            now_ms,
            token.as_deref(),
            summary,
            self.resources.network.as_ref(),
        );
    }

    fn heartbeat_task(&mut self) {
        self.assert_internal_thread();
        if self.run_state == RunState::Stopped {
            return;
        }
        debug!("sending heartbeat to server");
        self.send_info_message(false);
        self.operations.schedule(HEARTBEAT_TASK);
    }

    /// Timeouts cover two conditions: a token request without a reply,
    /// and registration state that drifted out of sync with the server.
    fn check_network_timeouts(&mut self) {
        self.assert_internal_thread();
        if self.run_state == RunState::Stopped {
            return;
        }
        if self.client_token.is_none() {
            info!("request for token timed out");
            self.schedule_acquire_token("network timeout");
            return;
        }
        if !self.registration_manager.is_in_sync_with_server() {
            info!("registration state not in sync with server");
            self.send_info_message(false);
            self.operations.schedule(TIMEOUT_TASK);
        }
    }

    fn send_info_message(&mut self, must_send_performance_counters: bool) {
        self.assert_internal_thread();
        let now_ms = self.now_ms();
        let mut performance_counters = Vec::new();
        let mut config_params = Vec::new();

        let counters_due = {
            let threshold = self.perf_smearer.smear(self.config.perf_counter_delay);
            now_ms - self.last_performance_send_ms >= threshold.as_millis() as i64
        };
        if must_send_performance_counters || counters_due {
            performance_counters = self.statistics.non_zero_counters();
            config_params = self.config.config_params();
            self.last_performance_send_ms = now_ms;
        }

        let request_summary = !self.registration_manager.is_in_sync_with_server();
        self.protocol
            .queue_info(config_params, performance_counters, request_summary);
    }

    // ---- Application operations ----

    fn perform_register_operations(
        &mut self,
        object_ids: Vec<ObjectId>,
        op_type: RegistrationOpType,
    ) {
        self.assert_internal_thread();
        match self.run_state {
            RunState::Stopped => {
                warn!(
                    count = object_ids.len(),
                    "client stopped: registration operations ignored"
                );
                return;
            }
            RunState::NotStarted => {
                warn!(
                    count = object_ids.len(),
                    "client not ready: registration operations ignored"
                );
                return;
            }
            RunState::Started => {}
        }

        for object_id in &object_ids {
            let kind = match op_type {
                RegistrationOpType::Register => IncomingOperationType::Registration,
                RegistrationOpType::Unregister => IncomingOperationType::Unregistration,
            };
            self.statistics.record_incoming_operation(kind);
            debug!(?object_id, ?op_type, "registration operation");
        }

        self.registration_manager
            .perform_operations(&object_ids, op_type);
        self.protocol.queue_registrations(&object_ids, op_type);
        self.operations.schedule(TIMEOUT_TASK);
    }

    fn acknowledge_internal(&mut self, ack_handle: AckHandle) {
        self.assert_internal_thread();
        if self.run_state == RunState::Stopped {
            return;
        }
        match ack_handle.decode() {
            Some(invalidation) if validate_invalidation(&invalidation).is_ok() => {
                self.statistics
                    .record_incoming_operation(IncomingOperationType::Acknowledge);
                self.protocol.queue_ack(invalidation);
            }
            _ => {
                warn!("bad acknowledge handle");
                self.statistics
                    .record_client_error(ClientErrorType::AcknowledgeHandleFailure);
            }
        }
    }

    // ---- Persistence ----

    fn write_state_blob(&mut self) {
        self.assert_internal_thread();
        let Some(token) = self.client_token.clone() else {
            return;
        };
        let state = PersistentState {
            client_token: token,
        };
        let blob = serialize_state(&state, self.persistence_digest_fn.as_mut());

        let weak = self.weak_self.clone();
        let internal = Arc::clone(&self.resources.internal_scheduler);
        self.resources.storage.write_key(
            CLIENT_TOKEN_KEY,
            blob,
            Box::new(move |result| {
                internal.schedule(
                    NO_DELAY,
                    Box::new(move || {
                        if let Some(core) = weak.upgrade() {
                            core.lock().unwrap().write_callback(result);
                        }
                    }),
                );
            }),
        );
    }

    fn write_callback(&mut self, result: std::result::Result<(), StorageError>) {
        self.assert_internal_thread();
        match result {
            Ok(()) => {
                debug!("state blob written");
                self.persistence_backoff.reset();
            }
            Err(e) => {
                warn!(error = %e, "state blob write failed; retrying");
                self.statistics
                    .record_client_error(ClientErrorType::PersistentWriteFailure);
                let delay = self.persistence_backoff.next_delay();
                self.post(delay, |core| {
                    if core.run_state != RunState::Stopped {
                        core.write_state_blob();
                    }
                });
            }
        }
    }
}

/// Handle to a running invalidation client. Cloneable and thread-safe;
/// every method posts onto the internal scheduler before touching state.
#[derive(Clone)]
pub struct InvalidationClient {
    core: Arc<Mutex<ClientCore>>,
}

impl InvalidationClient {
    /// Construct a client.
    ///
    /// `client_type` is the code assigned by the invalidation service
    /// backend; `application_client_id` identifies this client instance
    /// for server-side squelching; `application_name` labels info
    /// messages. The client does nothing until [`start`](Self::start).
    pub fn new(
        resources: SystemResources,
        client_type: i32,
        application_client_id: Vec<u8>,
        application_name: &str,
        config: ClientConfig,
        listener: Arc<dyn InvalidationListener>,
    ) -> Result<Self> {
        let statistics = Arc::new(Statistics::new());
        let seed = resources.internal_scheduler.now_ms() as u64;
        let smear_fraction = config.smear_fraction;
        let smearer_for = |offset: u64| {
            Smearer::new(StdRng::seed_from_u64(seed.wrapping_add(offset)), smear_fraction)
        };

        let operations = OperationScheduler::new(
            Arc::clone(&resources.internal_scheduler),
            smearer_for(0),
        );
        let client_version = ClientVersion::new(resources.platform.clone(), application_name);
        let protocol = ProtocolHandler::new(
            client_version,
            operations.clone(),
            Arc::clone(&statistics),
        );
        let listener_proxy = ListenerProxy::new(
            listener,
            Arc::clone(&resources.listener_scheduler),
            Arc::clone(&statistics),
        );
        let registration_manager = RegistrationManager::new(
            Box::new(Sha1DigestFunction::new()),
            Arc::clone(&statistics),
        );

        let token_backoff = ExponentialBackoff::new(
            smearer_for(1),
            config.network_timeout_delay,
            config.network_timeout_delay * config.max_exponential_backoff_factor,
        );
        let persistence_backoff = ExponentialBackoff::new(
            smearer_for(2),
            config.write_retry_delay,
            config.write_retry_delay * config.max_exponential_backoff_factor,
        );
        let perf_smearer = smearer_for(3);

        let core = Arc::new(Mutex::new(ClientCore {
            resources: resources.clone(),
            config,
            statistics,
            listener: listener_proxy,
            client_type,
            application_client_id,
            persistence_digest_fn: Box::new(Sha1DigestFunction::new()),
            registration_manager,
            protocol,
            operations,
            run_state: RunState::NotStarted,
            start_requested: false,
            client_token: None,
            nonce: None,
            token_backoff,
            persistence_backoff,
            perf_smearer,
            last_performance_send_ms: 0,
            weak_self: Weak::new(),
        }));
        core.lock().unwrap().weak_self = Arc::downgrade(&core);

        let client = InvalidationClient { core };
        client.register_operations()?;
        client.install_network_receivers(&resources);
        Ok(client)
    }

    fn register_operations(&self) -> Result<()> {
        let guard = self.core.lock().unwrap();
        let batching_delay = guard.config.protocol_handler.batching_delay;
        let heartbeat_interval = guard.config.heartbeat_interval;
        let network_timeout = guard.config.network_timeout_delay;
        let operations = guard.operations.clone();
        drop(guard);

        let task = |work: fn(&mut ClientCore)| {
            let weak = Arc::downgrade(&self.core);
            let closure: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                if let Some(core) = weak.upgrade() {
                    work(&mut core.lock().unwrap());
                }
            });
            closure
        };

        operations.register(BATCHING_TASK, batching_delay, task(ClientCore::run_batching_task))?;
        operations.register(HEARTBEAT_TASK, heartbeat_interval, task(ClientCore::heartbeat_task))?;
        operations.register(TIMEOUT_TASK, network_timeout, task(ClientCore::check_network_timeouts))?;
        Ok(())
    }

    fn install_network_receivers(&self, resources: &SystemResources) {
        let weak = Arc::downgrade(&self.core);
        let internal = Arc::clone(&resources.internal_scheduler);
        resources.network.set_message_receiver(Box::new(move |bytes| {
            let weak = weak.clone();
            internal.schedule(
                NO_DELAY,
                Box::new(move || {
                    if let Some(core) = weak.upgrade() {
                        core.lock().unwrap().handle_incoming_message(bytes);
                    }
                }),
            );
        }));
        resources
            .network
            .add_network_status_receiver(Box::new(|online| {
                trace!(online, "network status changed");
            }));
    }

    fn post(&self, work: impl FnOnce(&mut ClientCore) + Send + 'static) {
        self.core.lock().unwrap().post(NO_DELAY, work);
    }

    /// Start the client: load persisted state, then either resume the
    /// stored session or acquire a fresh token. `ready` is delivered on
    /// the listener once a token is in hand.
    pub fn start(&self) {
        self.post(ClientCore::start_internal);
    }

    /// Stop the client. Pending work is abandoned; in-flight completions
    /// become no-ops.
    pub fn stop(&self) {
        self.post(ClientCore::stop_internal);
    }

    /// Register for invalidations on one object.
    pub fn register(&self, object_id: ObjectId) {
        self.register_objects(vec![object_id]);
    }

    /// Register for invalidations on several objects.
    pub fn register_objects(&self, object_ids: Vec<ObjectId>) {
        self.post(move |core| {
            core.perform_register_operations(object_ids, RegistrationOpType::Register)
        });
    }

    /// Unregister one object.
    pub fn unregister(&self, object_id: ObjectId) {
        self.unregister_objects(vec![object_id]);
    }

    /// Unregister several objects.
    pub fn unregister_objects(&self, object_ids: Vec<ObjectId>) {
        self.post(move |core| {
            core.perform_register_operations(object_ids, RegistrationOpType::Unregister)
        });
    }

    /// Acknowledge an invalidation previously delivered to the listener.
    pub fn acknowledge(&self, ack_handle: AckHandle) {
        self.post(move |core| core.acknowledge_internal(ack_handle));
    }

    /// The client's performance counters.
    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.core.lock().unwrap().statistics)
    }

    /// True once `ready` has been issued and the client is not stopped.
    pub fn is_started(&self) -> bool {
        self.core.lock().unwrap().run_state == RunState::Started
    }

    /// True after `stop`.
    pub fn is_stopped(&self) -> bool {
        self.core.lock().unwrap().run_state == RunState::Stopped
    }

    /// The current session token, if one is held.
    pub fn client_token(&self) -> Option<Vec<u8>> {
        self.core.lock().unwrap().client_token.clone()
    }

    /// Number of objects the client currently wants registered.
    pub fn registration_count(&self) -> usize {
        self.core.lock().unwrap().registration_manager.registration_count()
    }

    /// Earliest time the next message may be sent (quiet-period floor).
    pub fn next_message_send_time_ms(&self) -> i64 {
        self.core.lock().unwrap().protocol.next_message_send_time_ms()
    }

    /// Change the base delay of one of the periodic operations. Intended
    /// for tests.
    pub fn change_operation_delay(&self, id: OperationId, delay: Duration) {
        self.core.lock().unwrap().operations.change_delay(id, delay);
    }
}
