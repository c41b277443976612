// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for recording sessions
//!
//! This module provides command-line functionality for:
//! - Recording a session from the virtual stereo camera
//! - Printing and persisting the configuration

use chrono::Local;
use sensor_recorder::backends::types::{ImuReading, Record, SensorReading};
use sensor_recorder::backends::{CaptureSource, ChannelId, VirtualStereoImu};
use sensor_recorder::constants::{defaults, timing};
use sensor_recorder::media::{EncodedImage, JpegCompressor, decode_thumbnail};
use sensor_recorder::pipelines::CapturePipeline;
use sensor_recorder::storage::{
    self, ImageDirectory, ImuCsvWriter, PREVIEW_FILE, SessionManifest,
};
use sensor_recorder::threading::{CallbackSlot, ThreadPool};
use sensor_recorder::{AppError, AppResult, Config};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Options of the `record` command
pub struct RecordOptions {
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub duration: Option<f64>,
    pub frames: Option<u64>,
    pub no_right: bool,
}

/// Output of the saver stage
enum Recorded {
    Frame(Record<EncodedImage>),
    Imu(Record<ImuReading>),
}

/// Where each channel's output goes
struct SessionWriters {
    left: (ChannelId, ImageDirectory),
    right: Option<(ChannelId, ImageDirectory)>,
    imu: Option<(ChannelId, Arc<ImuCsvWriter>)>,
}

impl SessionWriters {
    fn images(&self, channel: ChannelId) -> Option<&ImageDirectory> {
        if self.left.0 == channel {
            return Some(&self.left.1);
        }
        self.right
            .as_ref()
            .filter(|(id, _)| *id == channel)
            .map(|(_, dir)| dir)
    }
}

/// Live preview rendered on the background pool
struct Preview {
    pool: Arc<ThreadPool>,
    compressor: JpegCompressor,
    path: PathBuf,
    interval: u64,
    rendered: Arc<AtomicU64>,
}

impl Preview {
    /// Render every Nth frame; dropped when the pool is busy shutting down
    fn offer(&self, record: &Record<EncodedImage>) {
        if self.interval == 0 || record.sequence % self.interval != 0 {
            return;
        }

        let jpeg = record.reading.data.clone();
        let compressor = self.compressor;
        let path = self.path.clone();
        let sequence = record.sequence;
        let rendered = Arc::clone(&self.rendered);

        let submitted = self.pool.add_task(move || {
            match render_preview(&jpeg, compressor, &path, sequence) {
                Ok(()) => {
                    rendered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!(sequence, error = %e, "Preview failed"),
            }
        });
        if let Err(e) = submitted {
            debug!(sequence, error = %e, "Preview skipped");
        }
    }
}

fn render_preview(
    jpeg: &[u8],
    compressor: JpegCompressor,
    path: &Path,
    sequence: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let thumb = decode_thumbnail(jpeg, defaults::PREVIEW_MAX_EDGE)?;
    let encoded = compressor.compress_rgb(&thumb)?;

    // Concurrent previews must not interleave writes to the same file
    let tmp = path.with_extension(format!("{}.tmp", sequence));
    fs::write(&tmp, &encoded.data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Recording time limit, rejected before anything touches the disk
fn duration_limit(seconds: Option<f64>) -> AppResult<Option<Duration>> {
    let Some(seconds) = seconds else {
        return Ok(None);
    };
    if seconds.is_nan() || seconds <= 0.0 {
        return Err(AppError::InvalidArgument {
            argument: "duration",
            reason: format!("{} is not a positive number of seconds", seconds),
        });
    }
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|e| AppError::InvalidArgument {
            argument: "duration",
            reason: e.to_string(),
        })
}

/// Record a session from the virtual stereo camera
pub fn record(options: RecordOptions) -> AppResult<()> {
    let limit = duration_limit(options.duration)?;
    let mut config = match &options.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(output) = options.output {
        config.output_dir = output;
    }
    if options.no_right {
        config.right_camera = false;
    }
    config.validate()?;

    let started_at = Local::now();
    let session_dir = storage::create_session_dir(&config.output_dir, started_at)?;
    println!("Recording to {}", session_dir.display());

    let pool = Arc::new(ThreadPool::with_name("background", config.pool_threads)?);

    let source = VirtualStereoImu::new(config.virtual_sensor(options.frames));
    let source_name = source.name().to_string();
    let left_id = source.left_channel();
    let right_id = source.right_channel();
    let imu_id = source.imu_channel();

    let writers = Arc::new(SessionWriters {
        left: (
            left_id,
            ImageDirectory::create(session_dir.join("left"), config.image_save_format)?,
        ),
        right: match right_id {
            Some(id) => Some((
                id,
                ImageDirectory::create(session_dir.join("right"), config.image_save_format)?,
            )),
            None => None,
        },
        imu: imu_id.map(|id| (id, Arc::new(ImuCsvWriter::new(session_dir.join(storage::IMU_FILE))))),
    });

    let preview = Preview {
        pool: Arc::clone(&pool),
        compressor: JpegCompressor::new(config.jpeg_quality),
        path: session_dir.join(PREVIEW_FILE),
        interval: u64::from(config.preview_interval),
        rendered: Arc::new(AtomicU64::new(0)),
    };
    let previews = Arc::clone(&preview.rendered);

    let mut pipeline: CapturePipeline<VirtualStereoImu, Recorded> =
        CapturePipeline::new("stereo", source);
    pipeline.set_timestamp_source(config.timestamp_source)?;
    pipeline.set_channel_settings(left_id, config.left)?;
    if let Some(id) = right_id {
        pipeline.set_channel_settings(id, config.right)?;
    }
    if let Some(id) = imu_id {
        pipeline.set_channel_settings(id, config.imu)?;
        if config.imu.overflow.drops() {
            warn!("IMU channel configured to drop samples when full");
        }
    }

    let compressor = JpegCompressor::new(config.jpeg_quality);
    pipeline.set_transform(move |record: Record<SensorReading>| match record.reading {
        SensorReading::Image(ref image) => {
            let encoded = compressor.compress(image)?;
            Ok(Recorded::Frame(record.map(|_| encoded)))
        }
        SensorReading::Imu(imu) => Ok(Recorded::Imu(record.map(|_| imu))),
    })?;

    {
        let writers = Arc::clone(&writers);
        pipeline.set_sink(move |channel, output| match output {
            Recorded::Frame(record) => {
                let Some(dir) = writers.images(channel) else {
                    warn!(channel = %channel, "Frame on a channel without image directory");
                    return;
                };
                if let Err(e) = dir.save(&record, &record.reading.data) {
                    error!(error = %e, "Failed to save frame");
                }
                if channel == left_id {
                    preview.offer(&record);
                }
            }
            Recorded::Imu(record) => {
                if let Some((_, writer)) = &writers.imu {
                    if let Err(e) = writer.write(&record) {
                        error!(error = %e, "Failed to write IMU sample");
                    }
                }
            }
        })?;
    }

    if let Some((_, writer)) = &writers.imu {
        let opener = Arc::clone(writer);
        pipeline.add_callback(CallbackSlot::Started, move || {
            if let Err(e) = opener.open() {
                error!(error = %e, "Failed to open IMU log");
            }
        });
        let closer = Arc::clone(writer);
        pipeline.add_callback(CallbackSlot::Finished, move || {
            if let Err(e) = closer.close() {
                error!(error = %e, "Failed to close IMU log");
            }
        });
    }

    pipeline.init()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    if let Some(stop) = pipeline.stop_handle() {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            stop.request_stop();
        })?;
    }

    pipeline.start()?;
    println!("Press Ctrl-C to stop");

    let start = Instant::now();
    while pipeline.is_running() {
        if limit.is_some_and(|limit| start.elapsed() >= limit) {
            info!("Recording duration reached");
            break;
        }
        std::thread::sleep(timing::MONITOR_POLL_INTERVAL);
    }
    if interrupted.load(Ordering::SeqCst) {
        println!("Interrupted, flushing queues...");
    }

    pipeline.stop();
    pipeline.wait();

    // Let queued previews finish so the manifest counts them
    pool.wait();

    let channels = pipeline.channel_stats();
    let manifest = SessionManifest {
        id: Uuid::new_v4(),
        recorder_version: env!("GIT_VERSION").to_string(),
        source: source_name,
        started_at,
        finished_at: Local::now(),
        image_format: config.image_save_format,
        jpeg_quality: config.jpeg_quality,
        timestamp_source: config.timestamp_source,
        channels,
        previews: previews.load(Ordering::Relaxed),
    };

    println!();
    println!("Recorded {:.1} s", manifest.duration_secs());
    for stats in &manifest.channels {
        println!(
            "  {:<6} processed {:>6}  failed {:>4}  dropped {:>4}  stalled {:>4}",
            stats.name,
            stats.processed,
            stats.failed,
            stats.queue.dropped,
            stats.queue.stalled
        );
    }

    let manifest_dir = session_dir.clone();
    let written = pool
        .add_task(move || storage::write_manifest(&manifest_dir, &manifest))?
        .wait()?;
    match written {
        Ok(path) => println!("Manifest: {}", path.display()),
        Err(e) => eprintln!("Failed to write manifest: {}", e),
    }

    pool.stop();
    Ok(())
}

/// Print the effective configuration, optionally writing it back
pub fn show_config(path: Option<PathBuf>, write: bool) -> AppResult<()> {
    let path = match path {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&path)?;

    println!("# {}", path.display());
    println!("{}", config.to_json()?);

    if write {
        config.save(&path)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_limit_rejects_non_positive_values() {
        for seconds in [-1.0, 0.0, f64::NAN, f64::NEG_INFINITY] {
            assert!(
                matches!(
                    duration_limit(Some(seconds)),
                    Err(AppError::InvalidArgument { argument: "duration", .. })
                ),
                "{} accepted",
                seconds
            );
        }
        assert!(duration_limit(Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_duration_limit_accepts_fractional_seconds() {
        assert_eq!(duration_limit(None).unwrap(), None);
        assert_eq!(
            duration_limit(Some(2.5)).unwrap(),
            Some(Duration::from_millis(2500))
        );
    }
}
