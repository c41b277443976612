// SPDX-License-Identifier: GPL-3.0-only

//! Media processing for recorded camera frames
//!
//! Camera channels hand raw frames (grayscale, RGB or YUYV) to the saver
//! workers, which compress them to JPEG before they reach the storage sink.
//! Preview thumbnails for the live view are produced from the same frames on
//! the background thread pool.
//!
//! # Modules
//!
//! - [`encoding`]: JPEG compression and thumbnails
//! - [`format_converters`]: YUYV/grayscale to RGB conversion

pub mod encoding;
pub mod format_converters;

// Re-export commonly used types
pub use encoding::{EncodedImage, JpegCompressor, decode_thumbnail};
