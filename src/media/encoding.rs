// SPDX-License-Identifier: GPL-3.0-only

//! JPEG compression of raw camera frames
//!
//! This is the transform stage of the camera pipelines: it runs on the saver
//! workers, so it must never panic on bad input. Malformed frames come back
//! as [`TransformError`]s and the worker moves on to the next job.

use super::format_converters;
use crate::backends::types::{PixelFormat, RawImage};
use crate::constants::JpegQuality;
use crate::errors::TransformError;
use image::{ExtendedColorType, RgbImage};
use tracing::debug;

/// Compressed frame ready for saving
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// JPEG compressor
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCompressor {
    quality: JpegQuality,
}

impl JpegCompressor {
    pub fn new(quality: JpegQuality) -> Self {
        Self { quality }
    }

    pub fn quality(&self) -> JpegQuality {
        self.quality
    }

    /// Compress a raw frame
    ///
    /// Grayscale frames are encoded as single channel JPEGs, YUYV frames are
    /// converted to RGB first.
    pub fn compress(&self, image: &RawImage) -> Result<EncodedImage, TransformError> {
        format_converters::validate(image)?;

        let data = match image.format {
            PixelFormat::Gray8 => {
                self.encode(&image.data, image.width, image.height, ExtendedColorType::L8)?
            }
            PixelFormat::Rgb8 | PixelFormat::Yuyv => {
                let rgb = format_converters::to_rgb(image)?;
                self.encode(&rgb, image.width, image.height, ExtendedColorType::Rgb8)?
            }
        };

        debug!(
            width = image.width,
            height = image.height,
            format = %image.format,
            size = data.len(),
            "Frame compressed"
        );

        Ok(EncodedImage {
            data,
            width: image.width,
            height: image.height,
        })
    }

    /// Compress an RGB image
    pub fn compress_rgb(&self, image: &RgbImage) -> Result<EncodedImage, TransformError> {
        let data = self.encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(EncodedImage {
            data,
            width: image.width(),
            height: image.height(),
        })
    }

    fn encode(
        &self,
        raw: &[u8],
        width: u32,
        height: u32,
        color: ExtendedColorType,
    ) -> Result<Vec<u8>, TransformError> {
        let mut buffer = Vec::new();
        {
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut buffer,
                self.quality.jpeg_quality(),
            );
            encoder
                .encode(raw, width, height, color)
                .map_err(|e| TransformError::EncodingFailed(e.to_string()))?;
        }
        Ok(buffer)
    }
}

/// Decode a JPEG and downscale it so its longest edge is at most `max_edge`
///
/// Aspect ratio is preserved; images already small enough are not resized.
pub fn decode_thumbnail(jpeg: &[u8], max_edge: u32) -> Result<RgbImage, TransformError> {
    let decoded = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|e| TransformError::InvalidInput(format!("JPEG decoding failed: {}", e)))?;

    let longest = decoded.width().max(decoded.height());
    if max_edge == 0 || longest <= max_edge {
        return Ok(decoded.to_rgb8());
    }
    Ok(decoded.thumbnail(max_edge, max_edge).to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(format: PixelFormat, width: u32, height: u32) -> RawImage {
        let len = format.frame_size(width, height);
        let data = (0..len).map(|i| (i % 251) as u8).collect();
        RawImage::new(width, height, format, data)
    }

    fn is_jpeg(data: &[u8]) -> bool {
        data.starts_with(&[0xFF, 0xD8]) && data.ends_with(&[0xFF, 0xD9])
    }

    #[test]
    fn test_compress_every_format() {
        let compressor = JpegCompressor::new(JpegQuality::Medium);
        for format in [PixelFormat::Gray8, PixelFormat::Rgb8, PixelFormat::Yuyv] {
            let encoded = compressor.compress(&gradient(format, 16, 8)).expect("compress");
            assert!(is_jpeg(&encoded.data), "{} did not produce a JPEG", format);
            assert_eq!((encoded.width, encoded.height), (16, 8));
        }
    }

    #[test]
    fn test_gray_stays_single_channel() {
        let compressor = JpegCompressor::default();
        let gray = compressor.compress(&gradient(PixelFormat::Gray8, 16, 8)).expect("gray");
        let decoded = image::load_from_memory(&gray.data).expect("decode");
        assert_eq!(decoded.color(), image::ColorType::L8);

        let yuyv = compressor.compress(&gradient(PixelFormat::Yuyv, 16, 8)).expect("yuyv");
        let decoded = image::load_from_memory(&yuyv.data).expect("decode");
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_corrupt_frame_is_an_error() {
        let compressor = JpegCompressor::default();
        let mut frame = gradient(PixelFormat::Rgb8, 16, 8);
        frame.data.truncate(10);
        assert!(matches!(
            compressor.compress(&frame),
            Err(TransformError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_higher_quality_is_not_smaller() {
        let frame = gradient(PixelFormat::Rgb8, 64, 64);
        let low = JpegCompressor::new(JpegQuality::Low).compress(&frame).expect("low");
        let max = JpegCompressor::new(JpegQuality::Maximum).compress(&frame).expect("max");
        assert!(max.data.len() >= low.data.len());
    }

    #[test]
    fn test_thumbnail_preserves_aspect_ratio() {
        let compressor = JpegCompressor::default();
        let frame = compressor
            .compress(&gradient(PixelFormat::Gray8, 640, 480))
            .expect("compress");
        let thumb = decode_thumbnail(&frame.data, 160).expect("thumbnail");
        assert_eq!(thumb.dimensions(), (160, 120));

        let small = compressor
            .compress(&gradient(PixelFormat::Gray8, 32, 16))
            .expect("compress");
        assert_eq!(decode_thumbnail(&small.data, 160).expect("thumbnail").dimensions(), (32, 16));
    }

    #[test]
    fn test_thumbnail_of_garbage_is_an_error() {
        assert!(decode_thumbnail(b"not a jpeg", 160).is_err());
    }
}
