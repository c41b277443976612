// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::types::{PixelFormat, TimestampSource};
use crate::backends::virtual_sensor::VirtualSensorConfig;
use crate::constants::{DEFAULT_POOL_THREADS, JpegQuality, defaults};
use crate::errors::ConfigError;
use crate::pipelines::ChannelSettings;
use crate::storage::ImageSaveFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory below the platform config dir
pub const CONFIG_DIR_NAME: &str = "sensor-recorder";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Recorder configuration
///
/// Missing fields fall back to their defaults, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory receiving one folder per session
    pub output_dir: PathBuf,
    /// Naming scheme of saved frames
    pub image_save_format: ImageSaveFormat,
    /// JPEG quality preset (Low, Medium, High, Maximum)
    pub jpeg_quality: JpegQuality,
    /// Pixel format delivered by the cameras
    pub pixel_format: PixelFormat,
    /// Camera frames per second
    pub frame_rate: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Record the right camera as well
    pub right_camera: bool,
    /// IMU samples per second, 0 disables the IMU
    pub imu_rate: u32,
    /// Device or host clock for record timestamps
    pub timestamp_source: TimestampSource,
    /// Left camera queue and savers
    pub left: ChannelSettings,
    /// Right camera queue and savers
    pub right: ChannelSettings,
    /// IMU queue and savers
    pub imu: ChannelSettings,
    /// Threads of the background pool (previews, manifest)
    pub pool_threads: usize,
    /// Render a preview of every Nth left frame, 0 disables previews
    pub preview_interval: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            image_save_format: ImageSaveFormat::default(), // Kalibr
            jpeg_quality: JpegQuality::default(),          // High
            pixel_format: PixelFormat::Gray8,
            frame_rate: defaults::FRAME_RATE,
            frame_width: defaults::FRAME_WIDTH,
            frame_height: defaults::FRAME_HEIGHT,
            right_camera: true,
            imu_rate: defaults::IMU_RATE,
            timestamp_source: TimestampSource::default(),
            left: ChannelSettings::image(),
            right: ChannelSettings::image(),
            imu: ChannelSettings::imu(),
            pool_threads: DEFAULT_POOL_THREADS,
            preview_interval: defaults::PREVIEW_INTERVAL,
        }
    }
}

impl Config {
    /// `<config dir>/sensor-recorder/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, using defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&json)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load from the default location
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&Self::default_path()?)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the recorder cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };

        if self.frame_rate == 0 {
            return Err(invalid("frame_rate", "must be at least 1"));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(invalid("frame size", "width and height must be non-zero"));
        }
        if self.pixel_format == PixelFormat::Yuyv && self.frame_width % 2 != 0 {
            return Err(invalid("frame_width", "must be even for YUYV"));
        }
        if self.pool_threads == 0 {
            return Err(invalid("pool_threads", "must be at least 1"));
        }
        for (field, settings) in [("left", &self.left), ("right", &self.right), ("imu", &self.imu)] {
            settings.check().map_err(|reason| invalid(field, reason.as_str()))?;
        }
        Ok(())
    }

    /// Settings for the virtual stereo camera
    pub fn virtual_sensor(&self, frame_limit: Option<u64>) -> VirtualSensorConfig {
        VirtualSensorConfig {
            width: self.frame_width,
            height: self.frame_height,
            pixel_format: self.pixel_format,
            frame_rate: self.frame_rate,
            imu_rate: self.imu_rate,
            right_camera: self.right_camera,
            frame_limit,
        }
    }
}
