// SPDX-License-Identifier: GPL-3.0-only

//! Channel descriptors and statistics

use crate::backends::types::ChannelId;
use crate::constants::{DEFAULT_SAVER_THREADS, queue};
use crate::threading::{OverflowPolicy, QueueStats};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Queue and worker settings of one output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Maximum buffered records
    pub capacity: usize,
    /// Behaviour when the queue is full
    pub overflow: OverflowPolicy,
    /// Saver threads draining the queue
    pub workers: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            capacity: queue::DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::Block,
            workers: DEFAULT_SAVER_THREADS,
        }
    }
}

impl ChannelSettings {
    /// Settings sized for a camera stream
    pub fn image() -> Self {
        Self {
            capacity: queue::IMAGE_QUEUE_CAPACITY,
            ..Self::default()
        }
    }

    /// Settings sized for an IMU stream
    ///
    /// A single worker keeps IMU rows in capture order.
    pub fn imu() -> Self {
        Self {
            capacity: queue::IMU_QUEUE_CAPACITY,
            workers: 1,
            ..Self::default()
        }
    }

    /// Describe the first unusable value, if any
    pub fn check(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("queue capacity must be at least 1".to_string());
        }
        if self.workers == 0 {
            return Err("at least one worker is required".to_string());
        }
        Ok(())
    }
}

/// Per-channel worker counters
#[derive(Debug, Default)]
pub(crate) struct ChannelCounters {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl ChannelCounters {
    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Snapshot of one channel's traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub id: ChannelId,
    pub name: String,
    pub settings: ChannelSettings,
    /// Queue counters, zero before `init()`
    pub queue: QueueStats,
    /// Records currently buffered
    pub pending: usize,
    /// Records transformed and handed to the sink
    pub processed: u64,
    /// Records whose transform or sink failed
    pub failed: u64,
}

impl ChannelStats {
    /// Records lost to the overflow policy
    pub fn dropped(&self) -> u64 {
        self.queue.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sizes() {
        assert_eq!(ChannelSettings::default().capacity, queue::DEFAULT_QUEUE_CAPACITY);
        assert_eq!(ChannelSettings::image().capacity, queue::IMAGE_QUEUE_CAPACITY);
        assert_eq!(ChannelSettings::imu().capacity, queue::IMU_QUEUE_CAPACITY);
        assert_eq!(ChannelSettings::imu().workers, 1);
    }

    #[test]
    fn test_check_rejects_zero_values() {
        let zero_capacity = ChannelSettings {
            capacity: 0,
            ..Default::default()
        };
        let zero_workers = ChannelSettings {
            workers: 0,
            ..Default::default()
        };
        assert!(zero_capacity.check().is_err());
        assert!(zero_workers.check().is_err());
        assert!(ChannelSettings::default().check().is_ok());
    }

    #[test]
    fn test_settings_missing_fields_use_defaults() {
        let settings: ChannelSettings =
            serde_json::from_str(r#"{"overflow":"DropOldest"}"#).expect("parse");
        assert_eq!(settings.overflow, OverflowPolicy::DropOldest);
        assert_eq!(settings.capacity, queue::DEFAULT_QUEUE_CAPACITY);
    }
}
