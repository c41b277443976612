// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic stereo camera with IMU
//!
//! Produces moving gradient frames on a left and optional right channel plus
//! IMU samples on a third channel, paced in real time. Each `read()` blocks
//! for at most one frame period and returns one frame per camera together
//! with every IMU sample that became due since the previous frame.

use super::types::{ChannelId, ImuReading, PixelFormat, RawImage, Sample, SensorReading};
use super::CaptureSource;
use crate::constants::defaults;
use crate::errors::SourceError;
use std::f64::consts::PI;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Horizontal shift of the right image in pixels
const STEREO_DISPARITY: u32 = 8;

/// Standard gravity (m/s^2)
const GRAVITY: f64 = 9.81;

/// Settings of the virtual device
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualSensorConfig {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Camera frames per second
    pub frame_rate: u32,
    /// IMU samples per second, 0 disables the IMU channel
    pub imu_rate: u32,
    pub right_camera: bool,
    /// Report end of stream after this many frames
    pub frame_limit: Option<u64>,
}

impl Default for VirtualSensorConfig {
    fn default() -> Self {
        Self {
            width: defaults::FRAME_WIDTH,
            height: defaults::FRAME_HEIGHT,
            pixel_format: PixelFormat::Gray8,
            frame_rate: defaults::FRAME_RATE,
            imu_rate: defaults::IMU_RATE,
            right_camera: true,
            frame_limit: None,
        }
    }
}

/// Virtual stereo camera with IMU
#[derive(Debug)]
pub struct VirtualStereoImu {
    config: VirtualSensorConfig,
    started_at: Option<Instant>,
    frame_index: u64,
    imu_index: u64,
}

impl VirtualStereoImu {
    pub fn new(config: VirtualSensorConfig) -> Self {
        Self {
            config,
            started_at: None,
            frame_index: 0,
            imu_index: 0,
        }
    }

    pub fn config(&self) -> &VirtualSensorConfig {
        &self.config
    }

    /// Channel carrying left camera frames
    pub fn left_channel(&self) -> ChannelId {
        ChannelId(0)
    }

    /// Channel carrying right camera frames, if enabled
    pub fn right_channel(&self) -> Option<ChannelId> {
        self.config.right_camera.then_some(ChannelId(1))
    }

    /// Channel carrying IMU samples, if enabled
    pub fn imu_channel(&self) -> Option<ChannelId> {
        if self.config.imu_rate == 0 {
            return None;
        }
        Some(ChannelId(if self.config.right_camera { 2 } else { 1 }))
    }

    /// Frames delivered since `open()`
    pub fn frames_delivered(&self) -> u64 {
        self.frame_index
    }

    fn frame_period(&self) -> f64 {
        1.0 / f64::from(self.config.frame_rate.max(1))
    }

    fn render_frame(&self, shift: u32) -> RawImage {
        let VirtualSensorConfig {
            width,
            height,
            pixel_format,
            ..
        } = self.config;
        let phase = (self.frame_index * 4) as u32;
        let luma = |x: u32, y: u32| (x.wrapping_add(shift).wrapping_add(y).wrapping_add(phase) & 0xFF) as u8;

        let mut data = Vec::with_capacity(pixel_format.frame_size(width, height));
        for y in 0..height {
            for x in 0..width {
                match pixel_format {
                    PixelFormat::Gray8 => data.push(luma(x, y)),
                    PixelFormat::Rgb8 => {
                        data.push(luma(x, y));
                        data.push((y & 0xFF) as u8);
                        data.push((self.frame_index & 0xFF) as u8);
                    }
                    // Y0 U Y1 V, neutral chroma
                    PixelFormat::Yuyv => {
                        data.push(luma(x, y));
                        data.push(128);
                    }
                }
            }
        }

        RawImage::new(width, height, pixel_format, data)
    }

    fn imu_sample(t: f64) -> ImuReading {
        let w = 2.0 * PI * 0.5 * t;
        ImuReading {
            acc: [0.2 * w.sin(), 0.1 * w.cos(), GRAVITY],
            gyro: [0.1 * w.sin(), 0.1 * w.cos(), 0.01],
        }
    }
}

impl CaptureSource for VirtualStereoImu {
    type Reading = SensorReading;

    fn name(&self) -> &str {
        "virtual-stereo-imu"
    }

    fn channels(&self) -> Vec<String> {
        let mut channels = vec!["left".to_string()];
        if self.config.right_camera {
            channels.push("right".to_string());
        }
        if self.config.imu_rate > 0 {
            channels.push("imu".to_string());
        }
        channels
    }

    fn open(&mut self) -> Result<(), SourceError> {
        if self.config.width == 0 || self.config.height == 0 || self.config.frame_rate == 0 {
            return Err(SourceError::NotAvailable(format!(
                "unsupported stream mode {}x{}@{}",
                self.config.width, self.config.height, self.config.frame_rate
            )));
        }
        info!(
            width = self.config.width,
            height = self.config.height,
            fps = self.config.frame_rate,
            imu_rate = self.config.imu_rate,
            right = self.config.right_camera,
            "Opening virtual stereo camera"
        );
        self.started_at = Some(Instant::now());
        self.frame_index = 0;
        self.imu_index = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<Sample<SensorReading>>, SourceError> {
        let Some(started_at) = self.started_at else {
            return Err(SourceError::ReadFailed("device not opened".to_string()));
        };
        if self.config.frame_limit.is_some_and(|limit| self.frame_index >= limit) {
            return Err(SourceError::EndOfStream);
        }

        let period = self.frame_period();
        let frame_time = self.frame_index as f64 * period;
        let deadline = started_at + Duration::from_secs_f64(frame_time);
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }

        let mut samples = Vec::new();

        if let Some(imu) = self.imu_channel() {
            let imu_period = 1.0 / f64::from(self.config.imu_rate);
            loop {
                let t = self.imu_index as f64 * imu_period;
                if t > frame_time {
                    break;
                }
                samples.push(Sample::new(imu, Some(t), SensorReading::Imu(Self::imu_sample(t))));
                self.imu_index += 1;
            }
        }

        samples.push(Sample::new(
            self.left_channel(),
            Some(frame_time),
            SensorReading::Image(self.render_frame(0)),
        ));
        if let Some(right) = self.right_channel() {
            samples.push(Sample::new(
                right,
                Some(frame_time),
                SensorReading::Image(self.render_frame(STEREO_DISPARITY)),
            ));
        }

        self.frame_index += 1;
        Ok(samples)
    }

    fn release(&mut self) {
        if self.started_at.take().is_some() {
            debug!(frames = self.frame_index, "Virtual stereo camera released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> VirtualSensorConfig {
        VirtualSensorConfig {
            width: 8,
            height: 4,
            frame_rate: 1000,
            imu_rate: 4000,
            frame_limit: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn test_channel_layout() {
        let stereo = VirtualStereoImu::new(fast_config());
        assert_eq!(stereo.channels(), vec!["left", "right", "imu"]);
        assert_eq!(stereo.right_channel(), Some(ChannelId(1)));
        assert_eq!(stereo.imu_channel(), Some(ChannelId(2)));

        let mono = VirtualStereoImu::new(VirtualSensorConfig {
            right_camera: false,
            ..fast_config()
        });
        assert_eq!(mono.channels(), vec!["left", "imu"]);
        assert_eq!(mono.right_channel(), None);
        assert_eq!(mono.imu_channel(), Some(ChannelId(1)));
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut source = VirtualStereoImu::new(fast_config());
        assert!(matches!(source.read(), Err(SourceError::ReadFailed(_))));
    }

    #[test]
    fn test_frame_limit_ends_stream() {
        let mut source = VirtualStereoImu::new(fast_config());
        source.open().expect("open");

        for _ in 0..3 {
            let samples = source.read().expect("read");
            let frames = samples
                .iter()
                .filter(|s| matches!(s.reading, SensorReading::Image(_)))
                .count();
            assert_eq!(frames, 2);
        }
        assert_eq!(source.read().unwrap_err(), SourceError::EndOfStream);
        source.release();
    }

    #[test]
    fn test_imu_samples_precede_frame_and_are_ordered() {
        let mut source = VirtualStereoImu::new(fast_config());
        source.open().expect("open");
        source.read().expect("first");
        let samples = source.read().expect("second");

        let imu_times: Vec<f64> = samples
            .iter()
            .filter(|s| matches!(s.reading, SensorReading::Imu(_)))
            .filter_map(|s| s.sensor_timestamp)
            .collect();
        // 4 IMU samples per frame at 4 kHz / 1 kHz
        assert_eq!(imu_times.len(), 4);
        assert!(imu_times.windows(2).all(|w| w[0] < w[1]));
        assert!(matches!(samples[0].reading, SensorReading::Imu(_)));
    }

    #[test]
    fn test_frames_are_consistent_for_every_format() {
        for format in [PixelFormat::Gray8, PixelFormat::Rgb8, PixelFormat::Yuyv] {
            let mut source = VirtualStereoImu::new(VirtualSensorConfig {
                pixel_format: format,
                ..fast_config()
            });
            source.open().expect("open");
            let samples = source.read().expect("read");
            for sample in samples {
                if let SensorReading::Image(image) = sample.reading {
                    assert!(image.is_consistent(), "{} frame inconsistent", format);
                }
            }
        }
    }

    #[test]
    fn test_zero_frame_rate_cannot_open() {
        let mut source = VirtualStereoImu::new(VirtualSensorConfig {
            frame_rate: 0,
            ..fast_config()
        });
        assert!(matches!(source.open(), Err(SourceError::NotAvailable(_))));
    }
}
