//! Coalescing scheduler for named recurring operations.
//!
//! "Run operation X after its delay, but never have two instances of X
//! pending at once." Operations are registered once with a stable id and
//! a task; `schedule` is a no-op while an instance is already pending.
//! Delays are smeared so that independent clients do not synchronize.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TiclError};
use crate::resources::Scheduler;
use crate::smear::Smearer;

/// Stable identifier for a registered operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(pub &'static str);

struct OperationEntry {
    delay: Duration,
    name: &'static str,
    task: Arc<dyn Fn() + Send + Sync>,
    pending: bool,
}

struct Inner {
    operations: HashMap<OperationId, OperationEntry>,
    smearer: Smearer,
}

/// Schedules registered operations with at most one pending instance
/// per operation. Cloneable; clones share the same operation table.
#[derive(Clone)]
pub struct OperationScheduler {
    scheduler: Arc<dyn Scheduler>,
    inner: Arc<Mutex<Inner>>,
}

impl OperationScheduler {
    /// Create an operation scheduler posting onto `scheduler`.
    pub fn new(scheduler: Arc<dyn Scheduler>, smearer: Smearer) -> Self {
        OperationScheduler {
            scheduler,
            inner: Arc::new(Mutex::new(Inner {
                operations: HashMap::new(),
                smearer,
            })),
        }
    }

    /// Register `task` under `id` with the given base delay.
    ///
    /// Fails if `id` is already registered or `delay` is zero.
    pub fn register(
        &self,
        id: OperationId,
        delay: Duration,
        task: Arc<dyn Fn() + Send + Sync>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if delay.is_zero() {
            return Err(TiclError::InvalidOperationDelay {
                name: id.0.to_string(),
            });
        }
        if inner.operations.contains_key(&id) {
            return Err(TiclError::OperationAlreadyRegistered {
                name: id.0.to_string(),
            });
        }
        debug!(operation = id.0, delay_ms = delay.as_millis() as u64, "operation registered");
        inner.operations.insert(
            id,
            OperationEntry {
                delay,
                name: id.0,
                task,
                pending: false,
            },
        );
        Ok(())
    }

    /// Schedule one instance of `id` after its smeared delay. A no-op if
    /// an instance is already pending or `id` was never registered.
    pub fn schedule(&self, id: OperationId) {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.operations.get(&id) else {
            debug!(operation = id.0, "schedule for unregistered operation ignored");
            return;
        };
        if entry.pending {
            return;
        }
        let delay = entry.delay;
        let name = entry.name;
        let smeared = inner.smearer.smear(delay);
        if let Some(entry) = inner.operations.get_mut(&id) {
            entry.pending = true;
        }
        drop(inner);

        debug!(operation = name, delay_ms = smeared.as_millis() as u64, "operation scheduled");
        let shared = Arc::clone(&self.inner);
        self.scheduler.schedule(
            smeared,
            Box::new(move || {
                let task = {
                    let mut inner = shared.lock().unwrap();
                    match inner.operations.get_mut(&id) {
                        Some(entry) => {
                            entry.pending = false;
                            Arc::clone(&entry.task)
                        }
                        None => return,
                    }
                };
                task();
            }),
        );
    }

    /// Change the base delay for `id`. Intended for tests.
    pub fn change_delay(&self, id: OperationId, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.operations.get_mut(&id) {
            debug!(operation = entry.name, delay_ms = delay.as_millis() as u64, "delay changed");
            entry.delay = delay;
        }
    }

    /// True if an instance of `id` is currently pending.
    pub fn is_pending(&self, id: OperationId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .operations
            .get(&id)
            .map(|e| e.pending)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Captures scheduled tasks so tests can run them by hand.
    struct ManualScheduler {
        tasks: Mutex<Vec<crate::resources::Task>>,
    }

    impl ManualScheduler {
        fn new() -> Arc<Self> {
            Arc::new(ManualScheduler {
                tasks: Mutex::new(Vec::new()),
            })
        }

        fn run_all(&self) {
            let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock().unwrap());
            for task in tasks {
                task();
            }
        }

        fn task_count(&self) -> usize {
            self.tasks.lock().unwrap().len()
        }
    }

    impl Scheduler for ManualScheduler {
        fn now_ms(&self) -> i64 {
            0
        }

        fn schedule(&self, _delay: Duration, task: crate::resources::Task) {
            self.tasks.lock().unwrap().push(task);
        }

        fn is_on_thread(&self) -> bool {
            true
        }
    }

    fn operation_scheduler(scheduler: Arc<ManualScheduler>) -> OperationScheduler {
        let smearer = Smearer::new(StdRng::seed_from_u64(7), 0.2);
        OperationScheduler::new(scheduler, smearer)
    }

    const OP: OperationId = OperationId("test-op");

    #[test]
    fn test_register_rejects_duplicate() {
        let ops = operation_scheduler(ManualScheduler::new());
        let task: Arc<dyn Fn() + Send + Sync> = Arc::new(|| {});
        ops.register(OP, Duration::from_millis(10), Arc::clone(&task))
            .unwrap();
        let err = ops
            .register(OP, Duration::from_millis(10), task)
            .unwrap_err();
        assert!(matches!(err, TiclError::OperationAlreadyRegistered { .. }));
    }

    #[test]
    fn test_register_rejects_zero_delay() {
        let ops = operation_scheduler(ManualScheduler::new());
        let err = ops
            .register(OP, Duration::ZERO, Arc::new(|| {}))
            .unwrap_err();
        assert!(matches!(err, TiclError::InvalidOperationDelay { .. }));
    }

    #[test]
    fn test_schedule_coalesces_while_pending() {
        let scheduler = ManualScheduler::new();
        let ops = operation_scheduler(Arc::clone(&scheduler));
        let runs = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&runs);
        ops.register(
            OP,
            Duration::from_millis(10),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        ops.schedule(OP);
        ops.schedule(OP);
        ops.schedule(OP);
        assert_eq!(scheduler.task_count(), 1);

        scheduler.run_all();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!ops.is_pending(OP));
    }

    #[test]
    fn test_schedule_again_after_run() {
        let scheduler = ManualScheduler::new();
        let ops = operation_scheduler(Arc::clone(&scheduler));
        let runs = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&runs);
        ops.register(
            OP,
            Duration::from_millis(10),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        ops.schedule(OP);
        scheduler.run_all();
        ops.schedule(OP);
        scheduler.run_all();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_schedule_unregistered_is_ignored() {
        let scheduler = ManualScheduler::new();
        let ops = operation_scheduler(Arc::clone(&scheduler));
        ops.schedule(OperationId("nobody"));
        assert_eq!(scheduler.task_count(), 0);
    }
}
