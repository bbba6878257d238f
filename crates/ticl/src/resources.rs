//! Host-supplied collaborators: scheduler, network, and storage.
//!
//! The engine never talks to the outside world directly. The host injects
//! a network channel, a persistent key-value store, and two schedulers
//! (one internal thread where all engine state lives, one for delivering
//! application callbacks). Production implementations for the scheduler
//! (Tokio-backed) and storage (file-backed) live here; the network is
//! always host-specific.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::warn;

use crate::error::{Result, TiclError};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Delay for "run as soon as possible".
pub const NO_DELAY: Duration = Duration::ZERO;

/// Executes tasks after a delay on a single logical thread.
///
/// All engine state is mutated only from tasks running on the internal
/// scheduler; `is_on_thread` backs the engine's thread assertions.
pub trait Scheduler: Send + Sync {
    /// Current time in milliseconds since the epoch.
    fn now_ms(&self) -> i64;

    /// Run `task` after `delay`. Must not run the task synchronously.
    fn schedule(&self, delay: Duration, task: Task);

    /// True when called from this scheduler's execution thread.
    fn is_on_thread(&self) -> bool;
}

/// Callback invoked with the raw bytes of an inbound server envelope.
pub type MessageReceiver = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Callback invoked when network connectivity changes.
pub type NetworkStatusReceiver = Box<dyn Fn(bool) + Send + Sync>;

/// Message channel to the invalidation server.
pub trait Network: Send + Sync {
    /// Hand one framed envelope to the channel. Must not block.
    fn send_message(&self, bytes: Vec<u8>);

    /// Install the receiver for inbound envelopes. The receiver may be
    /// invoked on any thread; the engine re-posts onto its scheduler.
    fn set_message_receiver(&self, receiver: MessageReceiver);

    /// Add a receiver for connectivity up/down events.
    fn add_network_status_receiver(&self, receiver: NetworkStatusReceiver);
}

/// Errors surfaced by a storage implementation.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("storage read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("storage write failed: {reason}")]
    WriteFailed { reason: String },
}

/// Completion callback for a read: the value if the key exists.
pub type ReadCallback = Box<dyn FnOnce(std::result::Result<Option<Vec<u8>>, StorageError>) + Send>;

/// Completion callback for a write.
pub type WriteCallback = Box<dyn FnOnce(std::result::Result<(), StorageError>) + Send>;

/// Persistent key-value storage.
///
/// Completions may be delivered on any thread, including inline from the
/// calling thread; the engine re-posts them onto the internal scheduler
/// before touching state.
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`.
    fn read_key(&self, key: &str, done: ReadCallback);

    /// Write `value` under `key`.
    fn write_key(&self, key: &str, value: Vec<u8>, done: WriteCallback);
}

/// The bundle of collaborators handed to the engine at construction.
#[derive(Clone)]
pub struct SystemResources {
    /// Channel to the server.
    pub network: Arc<dyn Network>,
    /// Persistent storage for the session token.
    pub storage: Arc<dyn Storage>,
    /// Scheduler on which all engine state is mutated.
    pub internal_scheduler: Arc<dyn Scheduler>,
    /// Scheduler on which application callbacks are delivered.
    pub listener_scheduler: Arc<dyn Scheduler>,
    /// Host platform description, reported in info messages.
    pub platform: String,
}

/// A [`Scheduler`] backed by a dedicated thread running a current-thread
/// Tokio runtime. Tasks are spawned as sleep-then-run futures, so every
/// task executes on the runtime thread.
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
    thread_id: thread::ThreadId,
    shutdown: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl TokioScheduler {
    /// Spawn the scheduler thread. `name` labels the thread for debugging.
    pub fn new(name: &str) -> Result<Arc<Self>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| TiclError::SchedulerStart {
                reason: e.to_string(),
            })?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let (thread_id_tx, thread_id_rx) = std::sync::mpsc::channel();

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = thread_id_tx.send(thread::current().id());
                // Park until shutdown; spawned tasks run on this thread.
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })
            .map_err(|e| TiclError::SchedulerStart {
                reason: e.to_string(),
            })?;

        let thread_id = thread_id_rx
            .recv()
            .map_err(|e| TiclError::SchedulerStart {
                reason: e.to_string(),
            })?;

        Ok(Arc::new(TokioScheduler {
            handle,
            thread_id,
            shutdown: Mutex::new(Some(shutdown_tx)),
        }))
    }

    /// Stop the scheduler thread. Pending sleeps are abandoned.
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }
}

impl Scheduler for TokioScheduler {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn schedule(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task();
        });
    }

    fn is_on_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A [`Storage`] keeping one file per key under a root directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous value intact. I/O happens inline
/// on the calling thread; hosts that need fully asynchronous storage
/// should supply their own implementation.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `root`. The directory is created on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStorage { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.root.join(safe)
    }
}

impl Storage for FileStorage {
    fn read_key(&self, key: &str, done: ReadCallback) {
        let path = self.path_for(key);
        let result = match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed {
                reason: e.to_string(),
            }),
        };
        done(result);
    }

    fn write_key(&self, key: &str, value: Vec<u8>, done: WriteCallback) {
        let path = self.path_for(key);
        let temp = path.with_extension("tmp");
        let result = std::fs::create_dir_all(&self.root)
            .and_then(|_| std::fs::write(&temp, &value))
            .and_then(|_| std::fs::rename(&temp, &path))
            .map_err(|e| {
                warn!(key, error = %e, "file storage write failed");
                StorageError::WriteFailed {
                    reason: e.to_string(),
                }
            });
        done(result);
    }
}
