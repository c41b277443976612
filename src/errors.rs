// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the sensor recorder
//!
//! Programming errors (starting a running thread, registering a callback on an
//! unknown slot) are not represented here: they panic at the call site. The
//! types below cover conditions a caller can act on at runtime.

use thiserror::Error;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Capture pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    /// Background pool errors
    #[error("Thread pool error: {0}")]
    Pool(#[from] PoolError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Storage/filesystem errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// Background task did not complete
    #[error("Task error: {0}")]
    Task(#[from] TaskError),
    /// Ctrl-C handler could not be installed
    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
    /// Command-line argument out of range
    #[error("invalid --{argument}: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },
}

/// Capture pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Setting changed after `init()`
    #[error("{0} must be configured before init()")]
    AlreadyInitialized(&'static str),
    /// `start()` called before `init()`
    #[error("pipeline is not initialized")]
    NotInitialized,
    /// A required registration hook was never set
    #[error("missing {0} function")]
    MissingFunction(&'static str),
    /// Invalid channel layout or settings
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Operation not allowed in the current pipeline state
    #[error("cannot {operation} while pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
    /// Channel index does not exist
    #[error("unknown channel {0}")]
    UnknownChannel(usize),
    /// The capture device could not be opened
    #[error("source failed to open: {0}")]
    Source(#[from] SourceError),
    /// OS refused to spawn a worker thread
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Thread pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// Task submitted after `stop()`
    #[error("cannot add task to stopped thread pool")]
    Stopped,
    /// Pool constructed with zero workers
    #[error("thread pool needs at least one worker")]
    NoWorkers,
    /// OS refused to spawn a worker thread
    #[error("failed to spawn pool worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Outcome of awaiting a task that did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Task was discarded by `stop()` before it started
    #[error("task cancelled before it ran")]
    Cancelled,
    /// Task panicked while running
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Capture device errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Device could not be opened
    #[error("device not available: {0}")]
    NotAvailable(String),
    /// A single read failed; the producer keeps going
    #[error("read failed: {0}")]
    ReadFailed(String),
    /// Device has no more data to deliver
    #[error("end of stream")]
    EndOfStream,
}

/// Per-job transform failures, never fatal to a worker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// Input record is malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Encoder rejected the data
    #[error("encoding failed: {0}")]
    EncodingFailed(String),
}

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config directory on this platform
    #[error("no configuration directory available")]
    NoConfigDir,
    /// Reading or writing the file failed
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// File contents are not valid JSON for `Config`
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Values parse but are unusable
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Persistence errors raised by the storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    /// Directory or file operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Writer used outside of its open/close window
    #[error("{0} is not open")]
    NotOpen(String),
    /// Manifest serialization failed
    #[error("manifest serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
