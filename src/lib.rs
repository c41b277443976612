// SPDX-License-Identifier: GPL-3.0-only

//! Sensor Recorder - multi-threaded capture of stereo cameras and IMUs
//!
//! This library provides the concurrency substrate shared by every sensor
//! recorder together with the pieces needed to turn it into a dataset
//! recorder: JPEG compression, session storage and configuration.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`threading`]: Bounded job queue, managed threads and thread pool
//! - [`pipelines`]: Producer → queue → saver capture pipeline
//! - [`backends`]: Capture source abstraction and a virtual stereo IMU
//! - [`media`]: Pixel format conversion and JPEG compression
//! - [`storage`]: Session directories, image/IMU writers and manifests
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! let mut pipeline = CapturePipeline::new("stereo", VirtualStereoImu::new(config));
//! pipeline.set_transform(|record| compress(record))?;
//! pipeline.set_sink(|channel, output| save(channel, output))?;
//! pipeline.init()?;
//! pipeline.start()?;
//! pipeline.stop();
//! pipeline.wait();
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod storage;
pub mod threading;

// Re-export commonly used types
pub use backends::{CaptureSource, ChannelId, Record, Sample, TimestampSource};
pub use config::Config;
pub use constants::JpegQuality;
pub use errors::{AppError, AppResult};
pub use pipelines::{CapturePipeline, ChannelSettings, PipelineState};
pub use threading::{BoundedJobQueue, CallbackSlot, ManagedThread, OverflowPolicy, ThreadPool};
