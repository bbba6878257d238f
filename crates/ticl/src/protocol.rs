//! Low-level wire interactions: outbound batching and inbound validation.
//!
//! Outbound operations accumulate in per-kind buckets and are flushed by
//! a single batching task into one envelope. Inbound bytes run through a
//! fixed pipeline - parse, structural validation, protocol version check,
//! quiet-period handling, token check, server-time update - before the
//! engine dispatches the surviving envelope.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use ticl_proto::validation::{validate_client_message, validate_server_message};
use ticl_proto::wire::{decode_server_message, encode_client_message};
use ticl_proto::{
    ClientHeader, ClientToServerMessage, ClientVersion, DigestSerializationType, InfoMessage,
    InitializeMessage, Invalidation, InvalidationMessage, ObjectId, PropertyRecord, ProtocolVersion,
    Registration, RegistrationMessage, RegistrationOpType, RegistrationSubtree,
    RegistrationSummary, RegistrationSyncMessage, ServerToClientMessage,
};

use crate::operations::{OperationId, OperationScheduler};
use crate::resources::Network;
use crate::statistics::{ClientErrorType, ReceivedMessageType, SentMessageType, Statistics};

/// Operation id of the outbound batching task.
pub const BATCHING_TASK: OperationId = OperationId("batching");

/// The parts of a server header the engine dispatches on.
#[derive(Debug, Clone)]
pub struct ServerMessageHeader {
    /// Token (or in-flight nonce) the envelope was addressed with.
    pub token: Vec<u8>,
    /// The server's registration summary, if it sent one.
    pub registration_summary: Option<RegistrationSummary>,
}

/// Collects outbound operations, stamps headers, and validates inbound
/// envelopes. Owned by the client engine; never calls back into it.
pub struct ProtocolHandler {
    client_version: ClientVersion,
    operations: OperationScheduler,
    statistics: Arc<Statistics>,
    /// Strictly increasing id stamped on each outbound envelope.
    message_id: u64,
    last_known_server_time_ms: i64,
    /// Quiet-period floor: no sends before this time.
    next_message_send_time_ms: i64,
    pending_initialize: Option<InitializeMessage>,
    pending_info: Option<InfoMessage>,
    /// In enqueue order; a later operation for an object overrides the
    /// earlier one in place.
    pending_registrations: Vec<Registration>,
    pending_acks: BTreeSet<Invalidation>,
    pending_subtrees: BTreeSet<RegistrationSubtree>,
}

impl ProtocolHandler {
    /// Create a handler. The batching task itself is registered by the
    /// engine, which owns the task closure and its delay.
    pub fn new(
        client_version: ClientVersion,
        operations: OperationScheduler,
        statistics: Arc<Statistics>,
    ) -> Self {
        ProtocolHandler {
            client_version,
            operations,
            statistics,
            message_id: 0,
            last_known_server_time_ms: 0,
            next_message_send_time_ms: 0,
            pending_initialize: None,
            pending_info: None,
            pending_registrations: Vec::new(),
            pending_acks: BTreeSet::new(),
            pending_subtrees: BTreeSet::new(),
        }
    }

    /// Queue an initialize message requesting a fresh token.
    pub fn queue_initialize(
        &mut self,
        client_type: i32,
        application_client_id: Vec<u8>,
        nonce: Vec<u8>,
    ) {
        self.pending_initialize = Some(InitializeMessage {
            client_type,
            nonce,
            application_client_id,
            digest_serialization_type: DigestSerializationType::ByteBased,
        });
        debug!("initialize message batched");
        self.operations.schedule(BATCHING_TASK);
    }

    /// Queue an info message. Replaces any earlier pending info message.
    pub fn queue_info(
        &mut self,
        config_params: Vec<PropertyRecord>,
        performance_counters: Vec<PropertyRecord>,
        server_registration_summary_requested: bool,
    ) {
        self.pending_info = Some(InfoMessage {
            client_version: self.client_version.clone(),
            config_params,
            performance_counters,
            server_registration_summary_requested,
        });
        debug!("info message batched");
        self.operations.schedule(BATCHING_TASK);
    }

    /// Queue registration operations. A later operation for an object
    /// subsumes an earlier pending one, keeping its enqueue position.
    pub fn queue_registrations(&mut self, object_ids: &[ObjectId], op_type: RegistrationOpType) {
        for object_id in object_ids {
            match self
                .pending_registrations
                .iter_mut()
                .find(|r| r.object_id == *object_id)
            {
                Some(pending) => pending.op_type = op_type,
                None => self.pending_registrations.push(Registration {
                    object_id: object_id.clone(),
                    op_type,
                }),
            }
        }
        self.operations.schedule(BATCHING_TASK);
    }

    /// Queue an invalidation acknowledgement.
    pub fn queue_ack(&mut self, invalidation: Invalidation) {
        self.pending_acks.insert(invalidation);
        self.operations.schedule(BATCHING_TASK);
    }

    /// Queue a registration sync subtree.
    pub fn queue_subtree(&mut self, subtree: RegistrationSubtree) {
        debug!(objects = subtree.registered_objects.len(), "sync subtree batched");
        self.pending_subtrees.insert(subtree);
        self.operations.schedule(BATCHING_TASK);
    }

    /// Flush the pending buckets into one envelope and hand it to the
    /// network. Called by the batching task.
    ///
    /// During a quiet period nothing is sent and the buckets survive for
    /// a later flush. An envelope with no token context must carry an
    /// initialize message; otherwise the send aborts.
    pub fn send_batched_message(
        &mut self,
        now_ms: i64,
        client_token: Option<&[u8]>,
        summary: RegistrationSummary,
        network: &dyn Network,
    ) {
        if self.next_message_send_time_ms > now_ms {
            info!(
                until_ms = self.next_message_send_time_ms,
                now_ms, "in quiet period: not sending to server"
            );
            return;
        }

        if client_token.is_none() && self.pending_initialize.is_none() {
            warn!("cannot send message: no token and no initialize message");
            self.statistics
                .record_client_error(ClientErrorType::TokenMissingFailure);
            return;
        }

        self.message_id += 1;
        let header = ClientHeader {
            protocol_version: ProtocolVersion::current(),
            client_token: client_token.map(|t| t.to_vec()),
            registration_summary: Some(summary),
            client_time_ms: now_ms,
            max_known_server_time_ms: self.last_known_server_time_ms,
            message_id: self.message_id,
        };
        let mut message = ClientToServerMessage::with_header(header);

        if let Some(initialize) = self.pending_initialize.take() {
            self.statistics
                .record_sent_message(SentMessageType::Initialize);
            message.initialize_message = Some(initialize);
        }
        if !self.pending_acks.is_empty() {
            self.statistics
                .record_sent_message(SentMessageType::InvalidationAck);
            message.invalidation_ack_message = Some(InvalidationMessage {
                invalidations: std::mem::take(&mut self.pending_acks).into_iter().collect(),
            });
        }
        if !self.pending_registrations.is_empty() {
            self.statistics
                .record_sent_message(SentMessageType::Registration);
            message.registration_message = Some(RegistrationMessage {
                registrations: std::mem::take(&mut self.pending_registrations),
            });
        }
        if !self.pending_subtrees.is_empty() {
            self.statistics
                .record_sent_message(SentMessageType::RegistrationSync);
            message.registration_sync_message = Some(RegistrationSyncMessage {
                subtrees: std::mem::take(&mut self.pending_subtrees).into_iter().collect(),
            });
        }
        if let Some(info) = self.pending_info.take() {
            self.statistics.record_sent_message(SentMessageType::Info);
            message.info_message = Some(info);
        }

        if let Err(e) = validate_client_message(&message) {
            warn!(error = %e, "tried to send invalid message");
            self.statistics
                .record_client_error(ClientErrorType::OutgoingMessageFailure);
            return;
        }

        match encode_client_message(&message) {
            Ok(bytes) => {
                debug!(message_id = message.header.message_id, "sending message to server");
                self.statistics.record_sent_message(SentMessageType::Total);
                network.send_message(bytes);
            }
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message");
                self.statistics
                    .record_client_error(ClientErrorType::OutgoingMessageFailure);
            }
        }
    }

    /// Run the inbound pipeline over raw bytes.
    ///
    /// Returns the envelope for dispatch when it survives parsing,
    /// validation, the version check, quiet-period interception, and the
    /// token check. A `None` means the bytes were fully handled (dropped
    /// or config-change-only).
    pub fn handle_inbound(
        &mut self,
        bytes: &[u8],
        now_ms: i64,
        client_token: Option<&[u8]>,
    ) -> Option<ServerToClientMessage> {
        let message = match decode_server_message(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "incoming message is unparseable");
                self.statistics
                    .record_client_error(ClientErrorType::IncomingMessageFailure);
                return None;
            }
        };

        if let Err(e) = validate_server_message(&message) {
            warn!(error = %e, "received invalid message");
            self.statistics
                .record_client_error(ClientErrorType::IncomingMessageFailure);
            return None;
        }

        self.statistics
            .record_received_message(ReceivedMessageType::Total);

        let version = &message.header.protocol_version;
        if !version.is_compatible_with(&ProtocolVersion::current()) {
            warn!(%version, "dropping message with incompatible protocol version");
            self.statistics
                .record_client_error(ClientErrorType::ProtocolVersionFailure);
            return None;
        }

        // A config change is honored before any token comparison, and the
        // rest of the envelope is dropped.
        if let Some(config_change) = &message.config_change_message {
            if let Some(delay_ms) = config_change.next_message_delay_ms {
                self.next_message_send_time_ms = now_ms + delay_ms;
                info!(delay_ms, "quiet period set by server");
            }
            return None;
        }

        if let Some(token) = client_token {
            if message.header.client_token != token {
                warn!("incoming message has bad token");
                self.statistics
                    .record_client_error(ClientErrorType::TokenMismatch);
                return None;
            }
        }
        // With no local token there is nothing to compare; the envelope is
        // accepted tentatively so a token control message can be
        // delivered, and the engine rejects mismatched nonces.

        if message.header.server_time_ms > self.last_known_server_time_ms {
            self.last_known_server_time_ms = message.header.server_time_ms;
        }

        Some(message)
    }

    /// Earliest time a message may be sent (quiet-period floor).
    pub fn next_message_send_time_ms(&self) -> i64 {
        self.next_message_send_time_ms
    }

    /// Highest server timestamp observed so far.
    pub fn last_known_server_time_ms(&self) -> i64 {
        self.last_known_server_time_ms
    }

    /// True when any outbound bucket is non-empty.
    pub fn has_pending_data(&self) -> bool {
        self.pending_initialize.is_some()
            || self.pending_info.is_some()
            || !self.pending_registrations.is_empty()
            || !self.pending_acks.is_empty()
            || !self.pending_subtrees.is_empty()
    }
}
