// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for raw camera frames

use crate::backends::types::{PixelFormat, RawImage};
use crate::errors::TransformError;
use std::borrow::Cow;

/// Convert YUYV (YUV 4:2:2) to RGB
///
/// YUYV format: Y0 U Y1 V - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = width as usize * height as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            if rgb.len() >= pixel_count * 3 {
                break;
            }
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    rgb
}

/// Expand 8-bit grayscale to RGB
pub fn gray_to_rgb(data: &[u8]) -> Vec<u8> {
    data.iter().flat_map(|&v| [v, v, v]).collect()
}

/// Check that a frame's buffer matches its header
pub fn validate(image: &RawImage) -> Result<(), TransformError> {
    if image.width == 0 || image.height == 0 {
        return Err(TransformError::InvalidInput(format!(
            "empty {}x{} frame",
            image.width, image.height
        )));
    }
    if image.data.len() != image.expected_len() {
        return Err(TransformError::InvalidInput(format!(
            "{} frame {}x{} needs {} bytes, got {}",
            image.format,
            image.width,
            image.height,
            image.expected_len(),
            image.data.len()
        )));
    }
    if image.format == PixelFormat::Yuyv && image.width % 2 != 0 {
        return Err(TransformError::InvalidInput(format!(
            "YUYV frame width {} is odd",
            image.width
        )));
    }
    Ok(())
}

/// Packed RGB bytes of a frame, borrowing when it already is RGB
pub fn to_rgb(image: &RawImage) -> Result<Cow<'_, [u8]>, TransformError> {
    validate(image)?;
    Ok(match image.format {
        PixelFormat::Rgb8 => Cow::Borrowed(image.data.as_slice()),
        PixelFormat::Gray8 => Cow::Owned(gray_to_rgb(&image.data)),
        PixelFormat::Yuyv => Cow::Owned(yuyv_to_rgb(&image.data, image.width, image.height)),
    })
}
