// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use sensor_recorder::constants::{JpegQuality, queue};

#[test]
fn test_jpeg_quality_values() {
    assert_eq!(JpegQuality::ALL.len(), 4);
}

#[test]
fn test_jpeg_quality_ordering() {
    // Presets are ordered from lowest to highest quality
    let mut prev = 0u8;
    for preset in JpegQuality::ALL {
        let quality = preset.jpeg_quality();
        assert!(quality > prev, "Presets should be ordered from lowest to highest");
        assert!(quality <= 100);
        prev = quality;
    }
}

#[test]
fn test_jpeg_quality_display_names() {
    for preset in JpegQuality::ALL {
        assert!(
            !preset.display_name().is_empty(),
            "Preset {:?} should have a display name",
            preset
        );
    }
}

#[test]
fn test_jpeg_quality_default() {
    assert_eq!(JpegQuality::default(), JpegQuality::High);
}

#[test]
fn test_queue_capacities() {
    assert!(queue::DEFAULT_QUEUE_CAPACITY > 0);
    assert!(queue::IMAGE_QUEUE_CAPACITY > 0);
    // IMU samples arrive an order of magnitude faster than frames
    assert!(queue::IMU_QUEUE_CAPACITY >= 10 * queue::IMAGE_QUEUE_CAPACITY);
    assert!(queue::DROP_LOG_INTERVAL > 1);
}
