// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for capture sources

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an output channel of a capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub usize);

impl ChannelId {
    /// Position of the channel in the source's channel list
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the timestamp of a record comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimestampSource {
    /// Device clock; host time is kept alongside as `system_timestamp`
    #[default]
    Sensor,
    /// Host clock at the moment the sample was read
    Host,
}

/// One reading as returned by a source, before it is stamped
#[derive(Debug, Clone)]
pub struct Sample<R> {
    /// Output channel this reading belongs to
    pub channel: ChannelId,
    /// Device clock in seconds, if the device provides one
    pub sensor_timestamp: Option<f64>,
    /// The reading itself
    pub reading: R,
}

impl<R> Sample<R> {
    pub fn new(channel: ChannelId, sensor_timestamp: Option<f64>, reading: R) -> Self {
        Self {
            channel,
            sensor_timestamp,
            reading,
        }
    }
}

/// A timestamped reading flowing through a capture pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<R> {
    /// Capture time in seconds
    pub timestamp: f64,
    /// Host time in seconds when `timestamp` comes from the device clock
    pub system_timestamp: Option<f64>,
    /// Per-channel capture counter starting at 0
    pub sequence: u64,
    pub reading: R,
}

impl<R> Record<R> {
    /// Capture time in whole nanoseconds
    pub fn timestamp_ns(&self) -> u64 {
        seconds_to_ns(self.timestamp)
    }

    /// Replace the reading, keeping the timing information
    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> Record<U> {
        Record {
            timestamp: self.timestamp,
            system_timestamp: self.system_timestamp,
            sequence: self.sequence,
            reading: f(self.reading),
        }
    }
}

/// Convert seconds to whole nanoseconds, clamping negatives to zero
pub fn seconds_to_ns(seconds: f64) -> u64 {
    (seconds * 1.0e9).round().max(0.0) as u64
}

/// Current host time in seconds since the Unix epoch
pub fn host_timestamp() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) * 1.0e-9
}

/// Pixel layout of a raw camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 8-bit RGB
    Rgb8,
    /// 8-bit grayscale
    Gray8,
    /// YUV 4:2:2, Y0 U Y1 V byte order
    Yuyv,
}

impl PixelFormat {
    /// Bytes needed for a frame of the given size
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgb8 => pixels * 3,
            PixelFormat::Gray8 => pixels,
            PixelFormat::Yuyv => pixels * 2,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgb8 => write!(f, "RGB8"),
            PixelFormat::Gray8 => write!(f, "GRAY8"),
            PixelFormat::Yuyv => write!(f, "YUYV"),
        }
    }
}

/// Uncompressed camera frame
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Byte length implied by width, height and format
    pub fn expected_len(&self) -> usize {
        self.format.frame_size(self.width, self.height)
    }

    /// Whether the buffer matches the header
    pub fn is_consistent(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }
}

impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("data", &format_args!("{} bytes", self.data.len()))
            .finish()
    }
}

/// Inertial measurement
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuReading {
    /// Linear acceleration (m/s^2)
    pub acc: [f64; 3],
    /// Angular velocity (rad/s)
    pub gyro: [f64; 3],
}

/// Any reading produced by a stereo camera with IMU
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    Image(RawImage),
    Imu(ImuReading),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_per_format() {
        assert_eq!(PixelFormat::Rgb8.frame_size(4, 2), 24);
        assert_eq!(PixelFormat::Gray8.frame_size(4, 2), 8);
        assert_eq!(PixelFormat::Yuyv.frame_size(4, 2), 16);
    }

    #[test]
    fn test_raw_image_consistency() {
        assert!(RawImage::new(2, 2, PixelFormat::Gray8, vec![0; 4]).is_consistent());
        assert!(!RawImage::new(2, 2, PixelFormat::Rgb8, vec![0; 4]).is_consistent());
        assert!(!RawImage::new(0, 2, PixelFormat::Gray8, Vec::new()).is_consistent());
    }

    #[test]
    fn test_timestamp_ns_rounds() {
        let record = Record {
            timestamp: 1.5,
            system_timestamp: None,
            sequence: 0,
            reading: (),
        };
        assert_eq!(record.timestamp_ns(), 1_500_000_000);
        assert_eq!(seconds_to_ns(-1.0), 0);
    }

    #[test]
    fn test_record_map_keeps_timing() {
        let record = Record {
            timestamp: 2.0,
            system_timestamp: Some(100.0),
            sequence: 7,
            reading: 21,
        };
        let doubled = record.map(|v| v * 2);
        assert_eq!(doubled.reading, 42);
        assert_eq!(doubled.sequence, 7);
        assert_eq!(doubled.system_timestamp, Some(100.0));
    }

    #[test]
    fn test_host_timestamp_is_recent() {
        // Any time after 2020-01-01
        assert!(host_timestamp() > 1_577_836_800.0);
    }
}
