// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// JPEG quality presets for saved camera frames
///
/// Higher presets produce larger files with fewer compression artifacts.
/// Calibration datasets usually want `High` or better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JpegQuality {
    /// Small files, visible artifacts
    Low,
    /// Balanced quality and file size
    Medium,
    /// Good quality (default)
    #[default]
    High,
    /// Near-lossless
    Maximum,
}

impl JpegQuality {
    /// Get all preset variants for iteration
    pub const ALL: [JpegQuality; 4] = [
        JpegQuality::Low,
        JpegQuality::Medium,
        JpegQuality::High,
        JpegQuality::Maximum,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            JpegQuality::Low => "Low",
            JpegQuality::Medium => "Medium",
            JpegQuality::High => "High",
            JpegQuality::Maximum => "Maximum",
        }
    }

    /// Encoder quality factor (1-100)
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            JpegQuality::Low => 60,
            JpegQuality::Medium => 80,
            JpegQuality::High => 92,
            JpegQuality::Maximum => 98,
        }
    }
}

/// Queue sizing
///
/// Capacities hold roughly one second of data at the nominal rate, enough to
/// absorb a hiccup in the savers without letting memory grow unbounded.
pub mod queue {
    /// Camera frame queue capacity (about 1 s at 30 fps)
    pub const IMAGE_QUEUE_CAPACITY: usize = 30;

    /// IMU sample queue capacity (about 1 s at 300 Hz)
    pub const IMU_QUEUE_CAPACITY: usize = 300;

    /// Capacity used when a channel does not specify one
    pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

    /// Drops between two `warn!` lines on a drop-policy queue
    pub const DROP_LOG_INTERVAL: u64 = 100;
}

/// Saver worker threads per channel
pub const DEFAULT_SAVER_THREADS: usize = 2;

/// Worker threads in the background pool
pub const DEFAULT_POOL_THREADS: usize = 2;

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Pause after a failed device read before retrying
    pub const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

    /// How often the CLI checks for Ctrl-C, duration and end of stream
    pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(100);
}

/// Sensor defaults
pub mod defaults {
    /// Camera frame rate (fps)
    pub const FRAME_RATE: u32 = 30;

    /// IMU sample rate (Hz)
    pub const IMU_RATE: u32 = 200;

    /// Frame width in pixels
    pub const FRAME_WIDTH: u32 = 640;

    /// Frame height in pixels
    pub const FRAME_HEIGHT: u32 = 480;

    /// Every Nth left frame becomes a preview thumbnail
    pub const PREVIEW_INTERVAL: u32 = 10;

    /// Longest edge of a preview thumbnail in pixels
    pub const PREVIEW_MAX_EDGE: u32 = 160;
}
