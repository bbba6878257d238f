//! Cache-invalidation client engine.
//!
//! A long-lived client that keeps a session with an invalidation server,
//! tracks per-object registrations on behalf of an application, and
//! delivers versioned invalidations with at-least-once semantics and
//! explicit acknowledgement. The host supplies the network channel,
//! persistent storage, and schedulers; the application supplies an
//! [`InvalidationListener`] and receives every event through it.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use ticl::{ClientConfig, FileStorage, InvalidationClient, SystemResources, TokioScheduler};
//! # use ticl::{InvalidationListener, Invalidation, AckHandle, ObjectId, RegistrationState, ErrorInfo};
//! # struct App;
//! # impl InvalidationListener for App {
//! #     fn ready(&self) {}
//! #     fn invalidate(&self, _: Invalidation, _: AckHandle) {}
//! #     fn invalidate_unknown_version(&self, _: ObjectId, _: AckHandle) {}
//! #     fn invalidate_all(&self, _: AckHandle) {}
//! #     fn inform_registration_status(&self, _: ObjectId, _: RegistrationState) {}
//! #     fn inform_registration_failure(&self, _: ObjectId, _: bool, _: String) {}
//! #     fn reissue_registrations(&self, _: Vec<u8>, _: i32) {}
//! #     fn inform_error(&self, _: ErrorInfo) {}
//! # }
//! # fn network() -> Arc<dyn ticl::Network> { unimplemented!() }
//! let scheduler = TokioScheduler::new("ticl-internal")?;
//! let listener_scheduler = TokioScheduler::new("ticl-listener")?;
//! let resources = SystemResources {
//!     network: network(),
//!     storage: Arc::new(FileStorage::new("/var/lib/myapp/ticl")),
//!     internal_scheduler: scheduler,
//!     listener_scheduler,
//!     platform: "linux".to_string(),
//! };
//! let client = InvalidationClient::new(
//!     resources,
//!     4,
//!     b"my-client".to_vec(),
//!     "my-app",
//!     ClientConfig::default(),
//!     Arc::new(App),
//! )?;
//! client.start();
//! # Ok::<(), ticl::TiclError>(())
//! ```

pub mod client;
pub mod config;
pub mod digest;
pub mod error;
pub mod listener;
pub mod operations;
pub mod persistence;
pub mod protocol;
pub mod registration;
pub mod resources;
pub mod smear;
pub mod statistics;

pub use client::{InvalidationClient, HEARTBEAT_TASK, TIMEOUT_TASK};
pub use config::{ClientConfig, ProtocolHandlerConfig};
pub use digest::{DigestFunction, Sha1DigestFunction, SimpleRegistrationStore};
pub use error::{Result, TiclError};
pub use listener::{
    AckHandle, ErrorInfo, ErrorReason, InvalidationListener, RegistrationState,
};
pub use operations::{OperationId, OperationScheduler};
pub use protocol::BATCHING_TASK;
pub use resources::{
    FileStorage, MessageReceiver, Network, NetworkStatusReceiver, ReadCallback, Scheduler, Storage,
    StorageError, SystemResources, Task, TokioScheduler, WriteCallback, NO_DELAY,
};
pub use smear::{ExponentialBackoff, Smearer, DEFAULT_SMEAR_FRACTION};
pub use statistics::{
    ClientErrorType, IncomingOperationType, ListenerEventType, ReceivedMessageType,
    SentMessageType, Statistics,
};

// Re-export the wire types that appear in the public API.
pub use ticl_proto::{Invalidation, ObjectId, RegistrationOpType};
