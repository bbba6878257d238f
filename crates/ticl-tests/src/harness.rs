//! Test harness: deterministic scheduler, fake collaborators, and a
//! pre-wired client.
//!
//! The deterministic scheduler owns a virtual clock and an ordered task
//! queue; tests advance time explicitly and every task - including the
//! engine's own re-posts - runs synchronously inside `advance_to`. The
//! fake network records outbound envelopes and injects inbound ones, the
//! fake storage is an in-memory map with programmable failures, and the
//! recording listener appends every upcall to an event log.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use ticl::{
    AckHandle, ClientConfig, ErrorInfo, InvalidationClient, InvalidationListener, MessageReceiver,
    Network, NetworkStatusReceiver, ReadCallback, RegistrationState, Scheduler, Storage,
    StorageError, SystemResources, Task, WriteCallback,
};
use ticl_proto::wire::{decode_client_message, encode_server_message};
use ticl_proto::{
    ClientToServerMessage, ErrorCode, ErrorMessage, Invalidation, InvalidationMessage, ObjectId,
    ProtocolVersion, RegistrationStatus, RegistrationStatusMessage, ServerHeader,
    ServerToClientMessage, TokenControlMessage,
};

// ---------------------------------------------------------------------
// Deterministic scheduler
// ---------------------------------------------------------------------

struct ScheduledEntry {
    run_at_ms: i64,
    seq: u64,
    task: Task,
}

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.run_at_ms == other.run_at_ms && self.seq == other.seq
    }
}

impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.run_at_ms, self.seq).cmp(&(other.run_at_ms, other.seq))
    }
}

struct SchedulerState {
    now_ms: i64,
    next_seq: u64,
    queue: BinaryHeap<Reverse<ScheduledEntry>>,
}

/// A scheduler with a virtual clock. Tasks run only inside `advance_to`
/// (and friends), in time-then-submission order, on the calling thread.
#[derive(Clone)]
pub struct DeterministicScheduler {
    state: Arc<Mutex<SchedulerState>>,
    running_thread: Arc<Mutex<Option<ThreadId>>>,
}

impl DeterministicScheduler {
    /// Create a scheduler with the clock set to `start_ms`.
    pub fn new(start_ms: i64) -> Self {
        DeterministicScheduler {
            state: Arc::new(Mutex::new(SchedulerState {
                now_ms: start_ms,
                next_seq: 0,
                queue: BinaryHeap::new(),
            })),
            running_thread: Arc::new(Mutex::new(None)),
        }
    }

    /// Run every task due up to and including `target_ms`, advancing the
    /// clock as tasks execute. Tasks posted while draining (with a due
    /// time inside the window) run in the same call.
    pub fn advance_to(&self, target_ms: i64) {
        loop {
            let entry = {
                let mut state = self.state.lock().unwrap();
                match state.queue.peek() {
                    Some(Reverse(next)) if next.run_at_ms <= target_ms => {
                        let Reverse(entry) = state.queue.pop().unwrap();
                        state.now_ms = state.now_ms.max(entry.run_at_ms);
                        Some(entry)
                    }
                    _ => None,
                }
            };
            match entry {
                Some(entry) => {
                    *self.running_thread.lock().unwrap() = Some(thread::current().id());
                    (entry.task)();
                    *self.running_thread.lock().unwrap() = None;
                }
                None => break,
            }
        }
        let mut state = self.state.lock().unwrap();
        state.now_ms = state.now_ms.max(target_ms);
    }

    /// Advance the clock by `delta_ms`, running everything due.
    pub fn advance_by(&self, delta_ms: i64) {
        let target = self.now_ms() + delta_ms;
        self.advance_to(target);
    }

    /// Run everything due at the current time without advancing it.
    pub fn run_due(&self) {
        let now = self.now_ms();
        self.advance_to(now);
    }

    /// Number of tasks waiting in the queue.
    pub fn pending_task_count(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }
}

impl Scheduler for DeterministicScheduler {
    fn now_ms(&self) -> i64 {
        self.state.lock().unwrap().now_ms
    }

    fn schedule(&self, delay: Duration, task: Task) {
        let mut state = self.state.lock().unwrap();
        let run_at_ms = state.now_ms + delay.as_millis() as i64;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Reverse(ScheduledEntry {
            run_at_ms,
            seq,
            task,
        }));
    }

    fn is_on_thread(&self) -> bool {
        *self.running_thread.lock().unwrap() == Some(thread::current().id())
    }
}

// ---------------------------------------------------------------------
// Fake network
// ---------------------------------------------------------------------

struct NetworkInner {
    sent: Vec<Vec<u8>>,
    receiver: Option<MessageReceiver>,
    status_receivers: Vec<NetworkStatusReceiver>,
}

/// Records outbound envelopes and injects inbound ones.
#[derive(Clone)]
pub struct FakeNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        FakeNetwork {
            inner: Arc::new(Mutex::new(NetworkInner {
                sent: Vec::new(),
                receiver: None,
                status_receivers: Vec::new(),
            })),
        }
    }

    /// Decoded copies of everything sent so far.
    pub fn sent_messages(&self) -> Vec<ClientToServerMessage> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|bytes| decode_client_message(bytes).expect("client sent an undecodable frame"))
            .collect()
    }

    /// Drain and decode everything sent so far.
    pub fn take_sent_messages(&self) -> Vec<ClientToServerMessage> {
        let bytes: Vec<Vec<u8>> = std::mem::take(&mut self.inner.lock().unwrap().sent);
        bytes
            .iter()
            .map(|b| decode_client_message(b).expect("client sent an undecodable frame"))
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().unwrap().sent.len()
    }

    /// Deliver a server envelope to the client.
    pub fn deliver(&self, message: &ServerToClientMessage) {
        let bytes = encode_server_message(message).expect("test server message must encode");
        self.deliver_raw(bytes);
    }

    /// Deliver raw bytes (possibly garbage) to the client.
    pub fn deliver_raw(&self, bytes: Vec<u8>) {
        let receiver = self.inner.lock().unwrap().receiver.take();
        if let Some(receiver) = receiver {
            receiver(bytes);
            self.inner.lock().unwrap().receiver = Some(receiver);
        } else {
            panic!("no message receiver installed");
        }
    }

    /// Announce a connectivity change to all status receivers.
    pub fn set_online(&self, online: bool) {
        let inner = self.inner.lock().unwrap();
        for receiver in &inner.status_receivers {
            receiver(online);
        }
    }
}

impl Default for FakeNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Network for FakeNetwork {
    fn send_message(&self, bytes: Vec<u8>) {
        self.inner.lock().unwrap().sent.push(bytes);
    }

    fn set_message_receiver(&self, receiver: MessageReceiver) {
        self.inner.lock().unwrap().receiver = Some(receiver);
    }

    fn add_network_status_receiver(&self, receiver: NetworkStatusReceiver) {
        self.inner.lock().unwrap().status_receivers.push(receiver);
    }
}

// ---------------------------------------------------------------------
// Fake storage
// ---------------------------------------------------------------------

struct StorageInner {
    map: HashMap<String, Vec<u8>>,
    write_failures_remaining: u32,
    fail_reads: bool,
    write_attempts: u32,
}

/// In-memory storage with programmable failures. Completions run inline
/// on the calling thread.
#[derive(Clone)]
pub struct FakeStorage {
    inner: Arc<Mutex<StorageInner>>,
}

impl FakeStorage {
    pub fn new() -> Self {
        FakeStorage {
            inner: Arc::new(Mutex::new(StorageInner {
                map: HashMap::new(),
                write_failures_remaining: 0,
                fail_reads: false,
                write_attempts: 0,
            })),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().map.get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: Vec<u8>) {
        self.inner.lock().unwrap().map.insert(key.to_string(), value);
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.lock().unwrap().write_failures_remaining = count;
    }

    /// Make every read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }

    pub fn write_attempts(&self) -> u32 {
        self.inner.lock().unwrap().write_attempts
    }
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for FakeStorage {
    fn read_key(&self, key: &str, done: ReadCallback) {
        let result = {
            let inner = self.inner.lock().unwrap();
            if inner.fail_reads {
                Err(StorageError::ReadFailed {
                    reason: "injected read failure".to_string(),
                })
            } else {
                Ok(inner.map.get(key).cloned())
            }
        };
        done(result);
    }

    fn write_key(&self, key: &str, value: Vec<u8>, done: WriteCallback) {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.write_attempts += 1;
            if inner.write_failures_remaining > 0 {
                inner.write_failures_remaining -= 1;
                Err(StorageError::WriteFailed {
                    reason: "injected write failure".to_string(),
                })
            } else {
                inner.map.insert(key.to_string(), value);
                Ok(())
            }
        };
        done(result);
    }
}

// ---------------------------------------------------------------------
// Recording listener
// ---------------------------------------------------------------------

/// One listener upcall, as observed by the application.
#[derive(Debug, Clone)]
pub enum ListenerEvent {
    Ready,
    Invalidate {
        invalidation: Invalidation,
        ack_handle: AckHandle,
    },
    InvalidateUnknownVersion {
        object_id: ObjectId,
        ack_handle: AckHandle,
    },
    InvalidateAll {
        ack_handle: AckHandle,
    },
    RegistrationStatus {
        object_id: ObjectId,
        state: RegistrationState,
    },
    RegistrationFailure {
        object_id: ObjectId,
        is_transient: bool,
        description: String,
    },
    ReissueRegistrations {
        prefix: Vec<u8>,
        prefix_len: i32,
    },
    Error {
        error: ErrorInfo,
    },
}

/// Appends every upcall to a shared log.
#[derive(Clone)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<ListenerEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        RecordingListener {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn take_events(&self) -> Vec<ListenerEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl Default for RecordingListener {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationListener for RecordingListener {
    fn ready(&self) {
        self.events.lock().unwrap().push(ListenerEvent::Ready);
    }

    fn invalidate(&self, invalidation: Invalidation, ack_handle: AckHandle) {
        self.events.lock().unwrap().push(ListenerEvent::Invalidate {
            invalidation,
            ack_handle,
        });
    }

    fn invalidate_unknown_version(&self, object_id: ObjectId, ack_handle: AckHandle) {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::InvalidateUnknownVersion {
                object_id,
                ack_handle,
            });
    }

    fn invalidate_all(&self, ack_handle: AckHandle) {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::InvalidateAll { ack_handle });
    }

    fn inform_registration_status(&self, object_id: ObjectId, state: RegistrationState) {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::RegistrationStatus { object_id, state });
    }

    fn inform_registration_failure(
        &self,
        object_id: ObjectId,
        is_transient: bool,
        description: String,
    ) {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::RegistrationFailure {
                object_id,
                is_transient,
                description,
            });
    }

    fn reissue_registrations(&self, prefix: Vec<u8>, prefix_len: i32) {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::ReissueRegistrations { prefix, prefix_len });
    }

    fn inform_error(&self, error: ErrorInfo) {
        self.events.lock().unwrap().push(ListenerEvent::Error { error });
    }
}

// ---------------------------------------------------------------------
// Pre-wired client
// ---------------------------------------------------------------------

/// Client type code used throughout the tests.
pub const TEST_CLIENT_TYPE: i32 = 4;

/// Application client id used throughout the tests.
pub const TEST_APPLICATION_ID: &[u8] = b"test-client-id";

/// A config whose smear is negligible, so scheduled times are exact to
/// the millisecond.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        smear_fraction: 1e-9,
        ..ClientConfig::default()
    }
}

/// An invalidation client wired to a deterministic scheduler and fakes.
pub struct TestClient {
    pub scheduler: DeterministicScheduler,
    pub network: FakeNetwork,
    pub storage: FakeStorage,
    pub listener: RecordingListener,
    pub client: InvalidationClient,
}

impl TestClient {
    /// Build a client with the virtual clock at `start_ms`.
    pub fn new(start_ms: i64) -> Self {
        Self::with_config(start_ms, test_config())
    }

    /// Build a client with a custom config.
    pub fn with_config(start_ms: i64, config: ClientConfig) -> Self {
        let scheduler = DeterministicScheduler::new(start_ms);
        let network = FakeNetwork::new();
        let storage = FakeStorage::new();
        let listener = RecordingListener::new();

        let resources = SystemResources {
            network: Arc::new(network.clone()),
            storage: Arc::new(storage.clone()),
            internal_scheduler: Arc::new(scheduler.clone()),
            listener_scheduler: Arc::new(scheduler.clone()),
            platform: "test".to_string(),
        };
        let client = InvalidationClient::new(
            resources,
            TEST_CLIENT_TYPE,
            TEST_APPLICATION_ID.to_vec(),
            "ticl-tests",
            config,
            Arc::new(listener.clone()),
        )
        .expect("client construction must succeed");

        TestClient {
            scheduler,
            network,
            storage,
            listener,
            client,
        }
    }

    /// Start the client, let it send its initialize message, and answer
    /// with `token`. Drains the resulting listener events.
    pub fn start_with_token(&self, token: &[u8]) {
        self.client.start();
        self.scheduler.run_due();
        // Batching delay, with headroom for the (negligible) smear.
        self.scheduler.advance_by(600);

        let sent = self.take_sent();
        let initialize = sent
            .iter()
            .find_map(|m| m.initialize_message.as_ref())
            .expect("no initialize message sent");
        let nonce = initialize.nonce.clone();

        self.network
            .deliver(&token_control_message(&nonce, Some(token), self.scheduler.now_ms()));
        self.scheduler.run_due();
        assert_eq!(self.client.client_token(), Some(token.to_vec()));
        self.listener.take_events();
    }

    /// Drain everything sent so far.
    pub fn take_sent(&self) -> Vec<ClientToServerMessage> {
        self.network.take_sent_messages()
    }
}

// ---------------------------------------------------------------------
// Server message builders
// ---------------------------------------------------------------------

/// A server header addressed with `token`.
pub fn server_header(token: &[u8], server_time_ms: i64) -> ServerHeader {
    ServerHeader {
        protocol_version: ProtocolVersion::current(),
        client_token: token.to_vec(),
        registration_summary: None,
        server_time_ms,
        message_id: None,
    }
}

/// A token control envelope assigning (or destroying) a token.
pub fn token_control_message(
    header_token: &[u8],
    new_token: Option<&[u8]>,
    server_time_ms: i64,
) -> ServerToClientMessage {
    let mut message = ServerToClientMessage::with_header(server_header(header_token, server_time_ms));
    message.token_control_message = Some(TokenControlMessage {
        new_token: new_token.map(|t| t.to_vec()),
    });
    message
}

/// An invalidation delivery envelope.
pub fn invalidation_message(
    token: &[u8],
    invalidations: Vec<Invalidation>,
    server_time_ms: i64,
) -> ServerToClientMessage {
    let mut message = ServerToClientMessage::with_header(server_header(token, server_time_ms));
    message.invalidation_message = Some(InvalidationMessage { invalidations });
    message
}

/// A registration status envelope.
pub fn registration_status_message(
    token: &[u8],
    statuses: Vec<RegistrationStatus>,
    server_time_ms: i64,
) -> ServerToClientMessage {
    let mut message = ServerToClientMessage::with_header(server_header(token, server_time_ms));
    message.registration_status_message = Some(RegistrationStatusMessage {
        registration_statuses: statuses,
    });
    message
}

/// An error envelope.
pub fn error_message(
    token: &[u8],
    code: ErrorCode,
    description: &str,
    server_time_ms: i64,
) -> ServerToClientMessage {
    let mut message = ServerToClientMessage::with_header(server_header(token, server_time_ms));
    message.error_message = Some(ErrorMessage {
        code,
        description: description.to_string(),
    });
    message
}
