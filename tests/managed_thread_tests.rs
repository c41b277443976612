// SPDX-License-Identifier: MPL-2.0

//! Integration tests for managed threads

use sensor_recorder::threading::{
    BoundedJobQueue, CallbackSlot, ManagedThread, ThreadContext, ThreadState, Worker,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Log file stand-in opened and closed by lifecycle callbacks
#[derive(Default)]
struct Sentinel {
    open: AtomicBool,
    opened: AtomicU32,
    closed: AtomicU32,
    writes: AtomicU32,
    writes_while_closed: AtomicU32,
}

impl Sentinel {
    fn write(&self) {
        if self.open.load(Ordering::SeqCst) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.writes_while_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn test_lifecycle_callbacks_bracket_the_work_loop() {
    let sentinel = Arc::new(Sentinel::default());

    let writer = Arc::clone(&sentinel);
    let mut managed = ManagedThread::from_fn("sentinel", move |ctx| {
        while !ctx.is_stop() {
            writer.write();
            thread::sleep(Duration::from_millis(1));
        }
        // One last write after the stop request, still before Finished
        writer.write();
    });

    let opener = Arc::clone(&sentinel);
    managed.add_callback(CallbackSlot::Started, move || {
        opener.open.store(true, Ordering::SeqCst);
        opener.opened.fetch_add(1, Ordering::SeqCst);
    });
    let closer = Arc::clone(&sentinel);
    managed.add_callback(CallbackSlot::Finished, move || {
        closer.open.store(false, Ordering::SeqCst);
        closer.closed.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(managed.state(), ThreadState::Idle);
    managed.start().unwrap();
    assert!(managed.is_start());

    while sentinel.writes.load(Ordering::SeqCst) < 5 {
        thread::sleep(Duration::from_millis(1));
    }
    managed.stop();
    managed.wait();

    assert!(managed.is_finish());
    assert_eq!(sentinel.opened.load(Ordering::SeqCst), 1);
    assert_eq!(sentinel.closed.load(Ordering::SeqCst), 1);
    assert_eq!(sentinel.writes_while_closed.load(Ordering::SeqCst), 0);
    assert!(!sentinel.open.load(Ordering::SeqCst));
}

#[test]
fn test_stop_and_wait_are_idempotent() {
    let finished = Arc::new(AtomicU32::new(0));
    let mut managed = ManagedThread::from_fn("idle-loop", |ctx| {
        while !ctx.is_stop() {
            thread::sleep(Duration::from_millis(1));
        }
    });
    let counter = Arc::clone(&finished);
    managed.add_callback(CallbackSlot::Finished, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    managed.start().unwrap();
    managed.stop();
    managed.stop();
    managed.wait();
    managed.wait();
    managed.stop();

    assert!(managed.is_stop());
    assert!(managed.is_finish());
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_handle_from_another_thread() {
    let mut managed = ManagedThread::from_fn("remote-stop", |ctx| {
        while !ctx.is_stop() {
            thread::sleep(Duration::from_millis(1));
        }
    });
    managed.start().unwrap();

    let handle = managed.stop_handle();
    thread::spawn(move || handle.request_stop()).join().unwrap();

    managed.wait();
    assert!(managed.is_finish());
    assert!(managed.thread_id().is_some());
}

/// Consumer draining a shared queue, as the saver stage does
struct Drain {
    queue: Arc<BoundedJobQueue<usize>>,
    total: Arc<AtomicUsize>,
}

impl Worker for Drain {
    fn run(&mut self, _ctx: &ThreadContext) {
        for item in self.queue.jobs() {
            self.total.fetch_add(item, Ordering::SeqCst);
        }
    }
}

#[test]
fn test_consumers_exit_on_queue_stop() {
    let queue = Arc::new(BoundedJobQueue::new(4));
    let total = Arc::new(AtomicUsize::new(0));

    let mut consumers: Vec<_> = (0..3)
        .map(|i| {
            ManagedThread::new(
                &format!("drain-{}", i),
                Drain {
                    queue: Arc::clone(&queue),
                    total: Arc::clone(&total),
                },
            )
        })
        .collect();
    for consumer in &mut consumers {
        consumer.start().unwrap();
    }

    for item in 1..=100 {
        assert!(queue.push(item));
    }
    queue.wait();
    queue.stop();
    for consumer in &mut consumers {
        consumer.wait();
        assert!(consumer.is_finish());
    }

    assert_eq!(total.load(Ordering::SeqCst), 5050);
}
