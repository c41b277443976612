// SPDX-License-Identifier: GPL-3.0-only

//! Capture source abstraction
//!
//! A capture source wraps one physical (or simulated) device that delivers
//! readings on one or more output channels, e.g. a stereo camera with an IMU:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        CaptureSource         │
//! │  open() → read()* → release()│
//! └───────┬───────┬───────┬──────┘
//!         │       │       │
//!       left    right    imu      (channels)
//! ```
//!
//! The producer thread of a capture pipeline is the only caller of `read()`.
//! `release()` is the device handle release point: it is called once on the
//! producer thread after the capture loop exits and before any queue is
//! drained, so vendor watchdogs shut down in a defined order.
//!
//! # Modules
//!
//! - [`types`]: Records, readings and channel identifiers
//! - [`virtual_sensor`]: Synthetic stereo camera with IMU

pub mod types;
pub mod virtual_sensor;

pub use types::{
    ChannelId, ImuReading, PixelFormat, RawImage, Record, Sample, SensorReading, TimestampSource,
};
pub use virtual_sensor::{VirtualSensorConfig, VirtualStereoImu};

use crate::errors::SourceError;

/// A device delivering readings to a capture pipeline
pub trait CaptureSource: Send + 'static {
    /// Reading type shared by all channels
    type Reading: Send + 'static;

    /// Human readable device name used in logs
    fn name(&self) -> &str;

    /// Names of the output channels; `ChannelId(i)` refers to entry `i`
    fn channels(&self) -> Vec<String>;

    /// Acquire the device
    fn open(&mut self) -> Result<(), SourceError>;

    /// Read the next batch of samples
    ///
    /// May block, but must return within a bounded time so the producer can
    /// observe stop requests. [`SourceError::EndOfStream`] ends the capture.
    fn read(&mut self) -> Result<Vec<Sample<Self::Reading>>, SourceError>;

    /// Release the device handle
    fn release(&mut self);
}
