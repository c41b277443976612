// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the background thread pool

use sensor_recorder::errors::{PoolError, TaskError};
use sensor_recorder::threading::ThreadPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_tasks_run_in_parallel() {
    let pool = ThreadPool::with_name("parallel", 3).unwrap();
    // Only completes if all three tasks are running at once
    let barrier = Arc::new(Barrier::new(3));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            pool.add_task(move || {
                barrier.wait();
                i * 10
            })
            .unwrap()
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
    assert_eq!(results, vec![0, 10, 20]);
    assert_eq!(pool.thread_count(), 3);
}

#[test]
fn test_concurrent_submitters() {
    let pool = Arc::new(ThreadPool::new(2).unwrap());
    let counter = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..50 {
                    let counter = Arc::clone(&counter);
                    pool.add_task(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }

    pool.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 200);
    assert_eq!(pool.pending(), 0);
    assert_eq!(pool.active(), 0);
}

#[test]
fn test_handles_can_be_awaited_together() {
    let pool = ThreadPool::new(2).unwrap();
    let handles: Vec<_> = (1..=5u64)
        .map(|n| pool.add_task(move || n * n).unwrap())
        .collect();

    let results = pollster::block_on(futures::future::join_all(handles));
    let squares: Vec<u64> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(squares, vec![1, 4, 9, 16, 25]);
}

#[test]
fn test_panic_does_not_poison_other_tasks() {
    let pool = ThreadPool::new(1).unwrap();

    let bad = pool.add_task(|| -> u32 { panic!("broken preview") }).unwrap();
    let good = pool.add_task(|| 7u32).unwrap();

    match bad.wait() {
        Err(TaskError::Panicked(msg)) => assert!(msg.contains("broken preview")),
        other => panic!("expected a panic report, got {:?}", other),
    }
    assert_eq!(good.wait().unwrap(), 7);
}

#[test]
fn test_stopped_pool_rejects_work() {
    let pool = ThreadPool::new(2).unwrap();
    pool.stop();
    pool.stop();

    assert!(pool.is_stopped());
    assert!(matches!(pool.add_task(|| ()), Err(PoolError::Stopped)));
    // Nothing to wait for once stopped
    pool.wait();
}
