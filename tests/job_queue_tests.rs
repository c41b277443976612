// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the bounded job queue

use proptest::prelude::*;
use sensor_recorder::threading::{BoundedJobQueue, OverflowPolicy};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Push `0..count` through a blocking queue drained by `consumers` threads
fn run_blocking(count: u32, capacity: usize, consumers: usize) -> Vec<Vec<u32>> {
    let queue = BoundedJobQueue::new(capacity);
    thread::scope(|scope| {
        let handles: Vec<_> = (0..consumers)
            .map(|_| scope.spawn(|| queue.jobs().collect::<Vec<u32>>()))
            .collect();

        for item in 0..count {
            assert!(queue.push(item));
            assert!(queue.size() <= capacity);
        }
        queue.wait();
        queue.stop();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_blocking_queue_loses_nothing(
        count in 0u32..300,
        capacity in 1usize..8,
        consumers in 1usize..4,
    ) {
        let received = run_blocking(count, capacity, consumers);

        let mut all: Vec<u32> = received.iter().flatten().copied().collect();
        all.sort_unstable();
        prop_assert_eq!(all, (0..count).collect::<Vec<_>>());

        // Every consumer sees its share in push order
        for items in &received {
            prop_assert!(items.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn prop_drop_policies_respect_capacity(
        count in 0u64..100,
        capacity in 1usize..10,
        drop_oldest in any::<bool>(),
    ) {
        let policy = if drop_oldest {
            OverflowPolicy::DropOldest
        } else {
            OverflowPolicy::DropNewest
        };
        let queue = BoundedJobQueue::with_policy(capacity, policy);

        for item in 0..count {
            prop_assert!(queue.push(item));
            prop_assert!(queue.size() <= capacity);
        }

        let kept = count.min(capacity as u64);
        let stats = queue.stats();
        prop_assert_eq!(queue.size() as u64, kept);
        prop_assert_eq!(stats.dropped, count - kept);
        prop_assert_eq!(stats.stalled, 0);

        queue.stop();
        let remaining: Vec<u64> = queue.jobs().collect();
        let expected: Vec<u64> = if drop_oldest {
            (count - kept..count).collect()
        } else {
            (0..kept).collect()
        };
        prop_assert_eq!(remaining, expected);
    }
}

#[test]
fn test_drop_oldest_keeps_last_two() {
    let queue = BoundedJobQueue::with_policy(2, OverflowPolicy::DropOldest);
    for item in 1..=5 {
        assert!(queue.push(item));
    }
    queue.stop();
    assert_eq!(queue.jobs().collect::<Vec<_>>(), vec![4, 5]);
    assert_eq!(queue.stats().dropped, 3);
}

#[test]
fn test_stop_releases_every_idle_consumer() {
    let queue = Arc::new(BoundedJobQueue::<u32>::new(4));
    let (tx, rx) = mpsc::channel();

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            thread::spawn(move || {
                let count = queue.jobs().count();
                tx.send(count).unwrap();
            })
        })
        .collect();
    drop(tx);

    // Nobody leaves while the queue is running
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    queue.stop();
    for _ in 0..4 {
        let count = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(count, 0);
    }
    for consumer in consumers {
        consumer.join().unwrap();
    }
}

#[test]
fn test_blocked_producer_counts_stall_once() {
    let queue = Arc::new(BoundedJobQueue::new(1));
    assert!(queue.push(0));

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.push(1))
    };
    while queue.stats().stalled == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(queue.pop().into_data(), Some(0));
    assert!(producer.join().unwrap());
    assert_eq!(queue.pop().into_data(), Some(1));

    let stats = queue.stats();
    assert_eq!(stats.stalled, 1);
    assert_eq!(stats.pushed, 2);
    assert_eq!(stats.popped, 2);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn test_stop_releases_every_blocked_producer() {
    let queue = Arc::new(BoundedJobQueue::new(1));
    assert!(queue.push(0u32));
    let (tx, rx) = mpsc::channel();

    let producers: Vec<_> = (1..=3)
        .map(|item| {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            thread::spawn(move || {
                tx.send(queue.push(item)).unwrap();
            })
        })
        .collect();
    drop(tx);

    while queue.stats().stalled < 3 {
        thread::sleep(Duration::from_millis(1));
    }
    queue.stop();

    for _ in 0..3 {
        let accepted = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!accepted, "push into a stopped queue must be rejected");
    }
    for producer in producers {
        producer.join().unwrap();
    }

    // The item buffered before the stop is still handed out
    assert_eq!(queue.jobs().collect::<Vec<_>>(), vec![0]);
}
