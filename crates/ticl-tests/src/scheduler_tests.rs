//! Tests for the deterministic scheduler itself.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ticl::Scheduler;

use crate::harness::DeterministicScheduler;

#[test]
fn test_tasks_run_in_time_order() {
    let scheduler = DeterministicScheduler::new(0);
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    for (delay_ms, label) in [(50i64, "b"), (10, "a"), (100, "c")] {
        let log = Arc::clone(&log);
        scheduler.schedule(
            Duration::from_millis(delay_ms as u64),
            Box::new(move || log.lock().unwrap().push(label)),
        );
    }

    scheduler.advance_by(200);
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn test_same_time_tasks_run_in_submission_order() {
    let scheduler = DeterministicScheduler::new(0);
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let log = Arc::clone(&log);
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || log.lock().unwrap().push(label)),
        );
    }

    scheduler.advance_by(10);
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn test_tasks_scheduled_while_draining_run_in_same_window() {
    let scheduler = DeterministicScheduler::new(0);
    let count = Arc::new(AtomicU32::new(0));

    let inner_count = Arc::clone(&count);
    let inner_scheduler = scheduler.clone();
    scheduler.schedule(
        Duration::from_millis(10),
        Box::new(move || {
            let count = Arc::clone(&inner_count);
            inner_scheduler.schedule(
                Duration::ZERO,
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }),
    );

    scheduler.advance_by(10);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_tasks_beyond_target_stay_queued() {
    let scheduler = DeterministicScheduler::new(0);
    let count = Arc::new(AtomicU32::new(0));

    let inner = Arc::clone(&count);
    scheduler.schedule(
        Duration::from_millis(100),
        Box::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        }),
    );

    scheduler.advance_by(99);
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.pending_task_count(), 1);

    scheduler.advance_by(1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_clock_advances_to_target() {
    let scheduler = DeterministicScheduler::new(1000);
    assert_eq!(scheduler.now_ms(), 1000);
    scheduler.advance_by(500);
    assert_eq!(scheduler.now_ms(), 1500);
    scheduler.advance_to(1500);
    assert_eq!(scheduler.now_ms(), 1500);
}

#[test]
fn test_is_on_thread_only_inside_tasks() {
    let scheduler = DeterministicScheduler::new(0);
    assert!(!scheduler.is_on_thread());

    let probe = scheduler.clone();
    let observed = Arc::new(std::sync::Mutex::new(None));
    let observed_inner = Arc::clone(&observed);
    scheduler.schedule(
        Duration::ZERO,
        Box::new(move || {
            *observed_inner.lock().unwrap() = Some(probe.is_on_thread());
        }),
    );
    scheduler.run_due();

    assert_eq!(*observed.lock().unwrap(), Some(true));
    assert!(!scheduler.is_on_thread());
}
