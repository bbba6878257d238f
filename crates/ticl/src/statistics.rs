//! Performance counters for the client engine.
//!
//! Counters are grouped into five families mirroring the protocol's
//! observable events: messages sent, messages received, operations coming
//! in from the application, listener upcalls, and client-side errors.
//! Non-zero counters are reported to the server inside info messages.

use std::sync::atomic::{AtomicU64, Ordering};

use ticl_proto::PropertyRecord;

/// Kinds of outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentMessageType {
    Info,
    Initialize,
    InvalidationAck,
    Registration,
    RegistrationSync,
    Total,
}

impl SentMessageType {
    const ALL: [SentMessageType; 6] = [
        SentMessageType::Info,
        SentMessageType::Initialize,
        SentMessageType::InvalidationAck,
        SentMessageType::Registration,
        SentMessageType::RegistrationSync,
        SentMessageType::Total,
    ];

    fn name(self) -> &'static str {
        match self {
            SentMessageType::Info => "info",
            SentMessageType::Initialize => "initialize",
            SentMessageType::InvalidationAck => "invalidation_ack",
            SentMessageType::Registration => "registration",
            SentMessageType::RegistrationSync => "registration_sync",
            SentMessageType::Total => "total",
        }
    }
}

/// Kinds of inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivedMessageType {
    InfoRequest,
    Invalidation,
    RegistrationStatus,
    RegistrationSyncRequest,
    TokenControl,
    Error,
    Total,
}

impl ReceivedMessageType {
    const ALL: [ReceivedMessageType; 7] = [
        ReceivedMessageType::InfoRequest,
        ReceivedMessageType::Invalidation,
        ReceivedMessageType::RegistrationStatus,
        ReceivedMessageType::RegistrationSyncRequest,
        ReceivedMessageType::TokenControl,
        ReceivedMessageType::Error,
        ReceivedMessageType::Total,
    ];

    fn name(self) -> &'static str {
        match self {
            ReceivedMessageType::InfoRequest => "info_request",
            ReceivedMessageType::Invalidation => "invalidation",
            ReceivedMessageType::RegistrationStatus => "registration_status",
            ReceivedMessageType::RegistrationSyncRequest => "registration_sync_request",
            ReceivedMessageType::TokenControl => "token_control",
            ReceivedMessageType::Error => "error",
            ReceivedMessageType::Total => "total",
        }
    }
}

/// Kinds of operations arriving from the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingOperationType {
    Acknowledge,
    Registration,
    Unregistration,
}

impl IncomingOperationType {
    const ALL: [IncomingOperationType; 3] = [
        IncomingOperationType::Acknowledge,
        IncomingOperationType::Registration,
        IncomingOperationType::Unregistration,
    ];

    fn name(self) -> &'static str {
        match self {
            IncomingOperationType::Acknowledge => "acknowledge",
            IncomingOperationType::Registration => "registration",
            IncomingOperationType::Unregistration => "unregistration",
        }
    }
}

/// Kinds of listener upcalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEventType {
    InformError,
    InformRegistrationFailure,
    InformRegistrationStatus,
    Invalidate,
    InvalidateAll,
    InvalidateUnknown,
    ReissueRegistrations,
}

impl ListenerEventType {
    const ALL: [ListenerEventType; 7] = [
        ListenerEventType::InformError,
        ListenerEventType::InformRegistrationFailure,
        ListenerEventType::InformRegistrationStatus,
        ListenerEventType::Invalidate,
        ListenerEventType::InvalidateAll,
        ListenerEventType::InvalidateUnknown,
        ListenerEventType::ReissueRegistrations,
    ];

    fn name(self) -> &'static str {
        match self {
            ListenerEventType::InformError => "inform_error",
            ListenerEventType::InformRegistrationFailure => "inform_registration_failure",
            ListenerEventType::InformRegistrationStatus => "inform_registration_status",
            ListenerEventType::Invalidate => "invalidate",
            ListenerEventType::InvalidateAll => "invalidate_all",
            ListenerEventType::InvalidateUnknown => "invalidate_unknown",
            ListenerEventType::ReissueRegistrations => "reissue_registrations",
        }
    }
}

/// Kinds of client-side errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorType {
    AcknowledgeHandleFailure,
    IncomingMessageFailure,
    OutgoingMessageFailure,
    PersistentDeserializationFailure,
    PersistentReadFailure,
    PersistentWriteFailure,
    ProtocolVersionFailure,
    RegistrationDiscrepancy,
    NonceMismatch,
    TokenMismatch,
    TokenMissingFailure,
}

impl ClientErrorType {
    const ALL: [ClientErrorType; 11] = [
        ClientErrorType::AcknowledgeHandleFailure,
        ClientErrorType::IncomingMessageFailure,
        ClientErrorType::OutgoingMessageFailure,
        ClientErrorType::PersistentDeserializationFailure,
        ClientErrorType::PersistentReadFailure,
        ClientErrorType::PersistentWriteFailure,
        ClientErrorType::ProtocolVersionFailure,
        ClientErrorType::RegistrationDiscrepancy,
        ClientErrorType::NonceMismatch,
        ClientErrorType::TokenMismatch,
        ClientErrorType::TokenMissingFailure,
    ];

    fn name(self) -> &'static str {
        match self {
            ClientErrorType::AcknowledgeHandleFailure => "acknowledge_handle_failure",
            ClientErrorType::IncomingMessageFailure => "incoming_message_failure",
            ClientErrorType::OutgoingMessageFailure => "outgoing_message_failure",
            ClientErrorType::PersistentDeserializationFailure => {
                "persistent_deserialization_failure"
            }
            ClientErrorType::PersistentReadFailure => "persistent_read_failure",
            ClientErrorType::PersistentWriteFailure => "persistent_write_failure",
            ClientErrorType::ProtocolVersionFailure => "protocol_version_failure",
            ClientErrorType::RegistrationDiscrepancy => "registration_discrepancy",
            ClientErrorType::NonceMismatch => "nonce_mismatch",
            ClientErrorType::TokenMismatch => "token_mismatch",
            ClientErrorType::TokenMissingFailure => "token_missing_failure",
        }
    }
}

/// Counter set for one client instance. Shared via `Arc`; all counters
/// are atomic so recording never needs a lock.
pub struct Statistics {
    sent: [AtomicU64; 6],
    received: [AtomicU64; 7],
    incoming: [AtomicU64; 3],
    listener: [AtomicU64; 7],
    errors: [AtomicU64; 11],
}

impl Statistics {
    /// Create a zeroed counter set.
    pub fn new() -> Self {
        Statistics {
            sent: Default::default(),
            received: Default::default(),
            incoming: Default::default(),
            listener: Default::default(),
            errors: Default::default(),
        }
    }

    pub fn record_sent_message(&self, kind: SentMessageType) {
        self.sent[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received_message(&self, kind: ReceivedMessageType) {
        self.received[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incoming_operation(&self, kind: IncomingOperationType) {
        self.incoming[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listener_event(&self, kind: ListenerEventType) {
        self.listener[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_client_error(&self, kind: ClientErrorType) {
        self.errors[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent_count(&self, kind: SentMessageType) -> u64 {
        self.sent[kind as usize].load(Ordering::Relaxed)
    }

    pub fn received_count(&self, kind: ReceivedMessageType) -> u64 {
        self.received[kind as usize].load(Ordering::Relaxed)
    }

    pub fn incoming_operation_count(&self, kind: IncomingOperationType) -> u64 {
        self.incoming[kind as usize].load(Ordering::Relaxed)
    }

    pub fn listener_event_count(&self, kind: ListenerEventType) -> u64 {
        self.listener[kind as usize].load(Ordering::Relaxed)
    }

    pub fn client_error_count(&self, kind: ClientErrorType) -> u64 {
        self.errors[kind as usize].load(Ordering::Relaxed)
    }

    /// Returns every non-zero counter as a named property, prefixed by
    /// its family, for inclusion in an info message.
    pub fn non_zero_counters(&self) -> Vec<PropertyRecord> {
        let mut out = Vec::new();
        for kind in SentMessageType::ALL {
            push_non_zero(&mut out, "sent_message_type.", kind.name(), &self.sent[kind as usize]);
        }
        for kind in ReceivedMessageType::ALL {
            push_non_zero(
                &mut out,
                "received_message_type.",
                kind.name(),
                &self.received[kind as usize],
            );
        }
        for kind in IncomingOperationType::ALL {
            push_non_zero(
                &mut out,
                "incoming_operation_type.",
                kind.name(),
                &self.incoming[kind as usize],
            );
        }
        for kind in ListenerEventType::ALL {
            push_non_zero(
                &mut out,
                "listener_event_type.",
                kind.name(),
                &self.listener[kind as usize],
            );
        }
        for kind in ClientErrorType::ALL {
            push_non_zero(
                &mut out,
                "client_error_type.",
                kind.name(),
                &self.errors[kind as usize],
            );
        }
        out
    }
}

fn push_non_zero(out: &mut Vec<PropertyRecord>, prefix: &str, name: &str, counter: &AtomicU64) {
    let value = counter.load(Ordering::Relaxed);
    if value > 0 {
        out.push(PropertyRecord::new(format!("{prefix}{name}"), value as i64));
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}
