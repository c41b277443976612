// SPDX-License-Identifier: GPL-3.0-only

//! Storage of recorded sessions
//!
//! A session lives in its own directory below the output root:
//!
//! ```text
//! <root>/<YYYYMMDD_HHMMSS>/
//! ├── left/<name>.jpg
//! ├── right/<name>.jpg
//! ├── imu.csv
//! ├── preview.jpg
//! └── session.json
//! ```

use crate::backends::types::{ImuReading, Record, TimestampSource};
use crate::constants::JpegQuality;
use crate::errors::StorageError;
use crate::pipelines::ChannelStats;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Header line of the IMU CSV file
pub const IMU_CSV_HEADER: &str = "# timestamp(ns), gyro X(rad/s), gyro Y(rad/s), gyro Z(rad/s), acc X(m/s^2), acc Y(m/s^2), acc Z(m/s^2)";

/// File name of the session manifest
pub const MANIFEST_FILE: &str = "session.json";

/// File name of the IMU log
pub const IMU_FILE: &str = "imu.csv";

/// File name of the live preview thumbnail
pub const PREVIEW_FILE: &str = "preview.jpg";

/// Naming scheme of saved frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageSaveFormat {
    /// `<timestamp_ns>.jpg`, the layout Kalibr reads
    #[default]
    Kalibr,
    /// `<index:06>.jpg`
    Index,
}

impl ImageSaveFormat {
    /// File name for a frame
    pub fn file_name(&self, timestamp_ns: u64, index: u64) -> String {
        match self {
            ImageSaveFormat::Kalibr => format!("{}.jpg", timestamp_ns),
            ImageSaveFormat::Index => format!("{:06}.jpg", index),
        }
    }
}

/// Directory name of a session started at `time`
pub fn session_dir_name(time: DateTime<Local>) -> String {
    time.format("%Y%m%d_%H%M%S").to_string()
}

/// Create a fresh session directory below `root`
///
/// A numeric suffix is added when a session started within the same second.
pub fn create_session_dir(root: &Path, time: DateTime<Local>) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(root).map_err(|e| StorageError::io(root, e))?;

    let base = session_dir_name(time);
    let mut candidate = root.join(&base);
    let mut suffix = 1;
    loop {
        // Atomic: fails if another recorder already took the name
        match fs::create_dir(&candidate) {
            Ok(()) => break,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = root.join(format!("{}_{}", base, suffix));
                suffix += 1;
            }
            Err(e) => return Err(StorageError::io(&candidate, e)),
        }
    }

    info!(path = %candidate.display(), "Created session directory");
    Ok(candidate)
}

/// Output directory of one camera channel
#[derive(Debug)]
pub struct ImageDirectory {
    path: PathBuf,
    format: ImageSaveFormat,
    saved: AtomicU64,
}

impl ImageDirectory {
    /// Create the directory if needed
    pub fn create(path: PathBuf, format: ImageSaveFormat) -> Result<Self, StorageError> {
        fs::create_dir_all(&path).map_err(|e| StorageError::io(&path, e))?;
        debug!(path = %path.display(), format = ?format, "Image directory ready");
        Ok(Self {
            path,
            format,
            saved: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames written so far
    pub fn saved(&self) -> u64 {
        self.saved.load(Ordering::Relaxed)
    }

    /// Write an encoded frame; safe to call from several savers at once
    pub fn save<R>(&self, record: &Record<R>, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let file = self
            .path
            .join(self.format.file_name(record.timestamp_ns(), record.sequence));
        fs::write(&file, bytes).map_err(|e| StorageError::io(&file, e))?;
        self.saved.fetch_add(1, Ordering::Relaxed);
        Ok(file)
    }
}

/// CSV log of IMU samples
///
/// Opened from a `Started` callback and closed from the `Finished` callback
/// of the recorder, so every row written by the savers lands in an open file.
#[derive(Debug)]
pub struct ImuCsvWriter {
    path: PathBuf,
    file: Mutex<Option<BufWriter<File>>>,
    rows: AtomicU64,
}

impl ImuCsvWriter {
    /// Writer for `path`; nothing is created until `open()`
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
            rows: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written since construction
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }

    /// Create the file and write the header, truncating an existing file
    pub fn open(&self) -> Result<(), StorageError> {
        let file = File::create(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", IMU_CSV_HEADER).map_err(|e| StorageError::io(&self.path, e))?;
        *self.file.lock() = Some(writer);
        info!(path = %self.path.display(), "IMU log opened");
        Ok(())
    }

    /// Append one sample: timestamp in ns, then gyro and acc
    pub fn write(&self, record: &Record<ImuReading>) -> Result<(), StorageError> {
        let mut guard = self.file.lock();
        let Some(writer) = guard.as_mut() else {
            return Err(StorageError::NotOpen(self.path.display().to_string()));
        };
        let ImuReading { acc, gyro } = record.reading;
        writeln!(
            writer,
            "{},{:.10},{:.10},{:.10},{:.10},{:.10},{:.10}",
            record.timestamp_ns(),
            gyro[0],
            gyro[1],
            gyro[2],
            acc[0],
            acc[1],
            acc[2]
        )
        .map_err(|e| StorageError::io(&self.path, e))?;
        self.rows.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flush and close; no-op when not open
    pub fn close(&self) -> Result<(), StorageError> {
        let Some(mut writer) = self.file.lock().take() else {
            return Ok(());
        };
        writer.flush().map_err(|e| StorageError::io(&self.path, e))?;
        info!(path = %self.path.display(), rows = self.rows(), "IMU log closed");
        Ok(())
    }
}

impl Drop for ImuCsvWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close IMU log");
        }
    }
}

/// Summary of a finished recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub id: Uuid,
    pub recorder_version: String,
    pub source: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub image_format: ImageSaveFormat,
    pub jpeg_quality: JpegQuality,
    pub timestamp_source: TimestampSource,
    pub channels: Vec<ChannelStats>,
    /// Preview thumbnails rendered during the session
    pub previews: u64,
}

impl SessionManifest {
    /// Recording length in seconds
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Write `session.json` into a session directory
pub fn write_manifest(dir: &Path, manifest: &SessionManifest) -> Result<PathBuf, StorageError> {
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, json).map_err(|e| StorageError::io(&path, e))?;
    info!(path = %path.display(), "Session manifest written");
    Ok(path)
}

/// Read `session.json` from a session directory
pub fn read_manifest(dir: &Path) -> Result<SessionManifest, StorageError> {
    let path = dir.join(MANIFEST_FILE);
    let json = fs::read_to_string(&path).map_err(|e| StorageError::io(&path, e))?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn imu_record(timestamp: f64) -> Record<ImuReading> {
        Record {
            timestamp,
            system_timestamp: None,
            sequence: 0,
            reading: ImuReading {
                acc: [0.0, 0.0, 9.81],
                gyro: [0.1, -0.2, 0.3],
            },
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(ImageSaveFormat::Kalibr.file_name(1_500_000_000, 3), "1500000000.jpg");
        assert_eq!(ImageSaveFormat::Index.file_name(1_500_000_000, 3), "000003.jpg");
    }

    #[test]
    fn test_session_dir_name() {
        let time = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).single().expect("valid time");
        assert_eq!(session_dir_name(time), "20240309_070501");
    }

    #[test]
    fn test_session_dirs_do_not_collide() {
        let root = tempfile::tempdir().expect("tempdir");
        let time = Local::now();
        let first = create_session_dir(root.path(), time).expect("first");
        let second = create_session_dir(root.path(), time).expect("second");
        assert_ne!(first, second);
        assert!(second.is_dir());
    }

    #[test]
    fn test_concurrent_session_dirs_are_distinct() {
        let root = tempfile::tempdir().expect("tempdir");
        let time = Local::now();
        let barrier = std::sync::Barrier::new(8);

        let mut dirs: Vec<PathBuf> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        create_session_dir(root.path(), time).expect("create")
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("join")).collect()
        });

        dirs.sort();
        dirs.dedup();
        assert_eq!(dirs.len(), 8);
        assert!(dirs.iter().all(|dir| dir.is_dir()));
    }

    #[test]
    fn test_session_dir_creates_missing_root() {
        let root = tempfile::tempdir().expect("tempdir");
        let nested = root.path().join("a").join("b");
        let dir = create_session_dir(&nested, Local::now()).expect("create");
        assert!(dir.starts_with(&nested));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_image_directory_saves_by_sequence() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = ImageDirectory::create(root.path().join("left"), ImageSaveFormat::Index)
            .expect("create");
        let record = Record {
            timestamp: 0.5,
            system_timestamp: None,
            sequence: 12,
            reading: (),
        };
        let path = dir.save(&record, b"jpeg").expect("save");
        assert!(path.ends_with("000012.jpg"));
        assert_eq!(fs::read(path).expect("read"), b"jpeg");
        assert_eq!(dir.saved(), 1);
    }

    #[test]
    fn test_imu_csv_rows() {
        let root = tempfile::tempdir().expect("tempdir");
        let writer = ImuCsvWriter::new(root.path().join(IMU_FILE));

        assert!(matches!(writer.write(&imu_record(0.0)), Err(StorageError::NotOpen(_))));

        writer.open().expect("open");
        writer.write(&imu_record(1.0)).expect("write");
        writer.write(&imu_record(1.005)).expect("write");
        writer.close().expect("close");
        assert!(!writer.is_open());

        let contents = fs::read_to_string(writer.path()).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], IMU_CSV_HEADER);
        assert!(lines[1].starts_with("1000000000,0.1000000000,-0.2000000000,0.3000000000,"));
        assert!(lines[2].starts_with("1005000000,"));
        assert_eq!(writer.rows(), 2);
    }

    #[test]
    fn test_manifest_survives_disk() {
        let root = tempfile::tempdir().expect("tempdir");
        let started_at = Local::now();
        let manifest = SessionManifest {
            id: Uuid::new_v4(),
            recorder_version: "test".to_string(),
            source: "virtual-stereo-imu".to_string(),
            started_at,
            finished_at: started_at + chrono::Duration::seconds(2),
            image_format: ImageSaveFormat::Kalibr,
            jpeg_quality: JpegQuality::High,
            timestamp_source: TimestampSource::Sensor,
            channels: Vec::new(),
            previews: 4,
        };

        write_manifest(root.path(), &manifest).expect("write");
        let loaded = read_manifest(root.path()).expect("read");
        assert_eq!(loaded.id, manifest.id);
        assert_eq!(loaded.previews, 4);
        assert!((loaded.duration_secs() - 2.0).abs() < 1e-9);
    }
}
