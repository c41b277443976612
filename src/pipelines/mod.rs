// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines for sensor recording
//!
//! Every sensor recorder is built from the same composition: a producer
//! thread reading the device, one bounded queue per output channel and a
//! group of saver threads per queue.
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Stereo + IMU │ ──▶ │ Capture Pipeline  │ ──▶ │ Storage Sink │
//! │   (device)   │     │  - bounded queues │     │  - left/*.jpg│
//! │              │     │  - saver threads  │     │  - right/    │
//! │              │     │  - JPEG transform │     │  - imu.csv   │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Design Principles
//!
//! 1. **Bounded memory**: queues block or drop instead of growing
//! 2. **No silent loss on shutdown**: queues drain before they stop
//! 3. **Contained failures**: a bad frame is logged and skipped
//!
//! # Modules
//!
//! - [`capture`]: Producer/queue/saver composition with ordered shutdown

pub mod capture;

pub use capture::{CapturePipeline, ChannelSettings, ChannelStats, PipelineState};
