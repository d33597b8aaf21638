// SPDX-License-Identifier: GPL-3.0-only

//! Camera selection and stream size negotiation
//!
//! Pure functions over device characteristics, so they are trivially
//! testable without a rig.

use super::types::*;
use crate::constants::sizes::{MAX_STILL_IMAGE_HEIGHT, MAX_STILL_IMAGE_WIDTH, MAX_VIDEO_WIDTH};
use tracing::debug;

/// Pick the camera to open for `facing`
///
/// First device with the requested facing, else the last device with a
/// stream configuration, else the first listed device.
pub fn choose_default_camera(cameras: &[CameraCharacteristics], facing: Facing) -> Option<DeviceId> {
    let chosen = cameras
        .iter()
        .find(|c| c.facing == Some(facing))
        .or_else(|| {
            cameras
                .iter()
                .rev()
                .find(|c| c.stream_configuration.is_some())
        })
        .or_else(|| cameras.first())
        .map(|c| c.id.clone());
    debug!(?facing, chosen = ?chosen, "Default camera");
    chosen
}

/// Pick the camera to switch to from `current`
///
/// Toggles front and back; an unknown current facing falls back to the
/// default choice for the back camera.
pub fn choose_switch_camera(
    cameras: &[CameraCharacteristics],
    current: Option<Facing>,
) -> Option<DeviceId> {
    match current {
        Some(facing) => choose_default_camera(cameras, facing.toggled()),
        None => choose_default_camera(cameras, Facing::Back),
    }
}

/// First 4:3 size no wider than the recorder limit, else the last size
pub fn choose_video_size(choices: &[Size]) -> Option<Size> {
    choices
        .iter()
        .find(|s| s.width == s.height * 4 / 3 && s.width <= MAX_VIDEO_WIDTH)
        .or_else(|| choices.last())
        .copied()
}

/// Smallest size with the video aspect that still covers the view
///
/// Falls back to the first size.
pub fn choose_preview_size(choices: &[Size], view: Size, aspect: Size) -> Option<Size> {
    choices
        .iter()
        .filter(|s| s.has_aspect_of(aspect) && s.width >= view.width && s.height >= view.height)
        .min_by_key(|s| s.area())
        .or_else(|| choices.first())
        .copied()
}

/// Largest size with the preview aspect within the still limits
///
/// Falls back to the first size.
pub fn choose_still_size(choices: &[Size], aspect: Size) -> Option<Size> {
    choices
        .iter()
        .filter(|s| {
            s.has_aspect_of(aspect)
                && s.width <= MAX_STILL_IMAGE_WIDTH
                && s.height <= MAX_STILL_IMAGE_HEIGHT
        })
        .max_by_key(|s| s.area())
        .or_else(|| choices.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_camera(id: &str, facing: Option<Facing>, with_streams: bool) -> CameraCharacteristics {
        CameraCharacteristics {
            id: DeviceId::new(id),
            facing,
            sensor_orientation: SensorRotation::Rotate90,
            stream_configuration: with_streams.then(StreamConfiguration::default),
            min_focus_distance: None,
            af_modes: Vec::new(),
            ae_modes: Vec::new(),
            awb_modes: Vec::new(),
        }
    }

    #[test]
    fn test_default_camera_prefers_facing() {
        let cameras = vec![
            create_test_camera("0", Some(Facing::Back), true),
            create_test_camera("1", Some(Facing::Front), true),
        ];
        assert_eq!(
            choose_default_camera(&cameras, Facing::Front),
            Some(DeviceId::new("1"))
        );
        assert_eq!(
            choose_default_camera(&cameras, Facing::Back),
            Some(DeviceId::new("0"))
        );
    }

    #[test]
    fn test_default_camera_falls_back_to_last_configured() {
        let cameras = vec![
            create_test_camera("0", Some(Facing::External), true),
            create_test_camera("1", Some(Facing::External), true),
            create_test_camera("2", None, false),
        ];
        assert_eq!(
            choose_default_camera(&cameras, Facing::Back),
            Some(DeviceId::new("1"))
        );

        let unconfigured = vec![create_test_camera("5", None, false)];
        assert_eq!(
            choose_default_camera(&unconfigured, Facing::Back),
            Some(DeviceId::new("5"))
        );
        assert_eq!(choose_default_camera(&[], Facing::Back), None);
    }

    #[test]
    fn test_switch_toggles_facing() {
        let cameras = vec![
            create_test_camera("0", Some(Facing::Back), true),
            create_test_camera("1", Some(Facing::Front), true),
        ];
        assert_eq!(
            choose_switch_camera(&cameras, Some(Facing::Back)),
            Some(DeviceId::new("1"))
        );
        assert_eq!(
            choose_switch_camera(&cameras, Some(Facing::External)),
            Some(DeviceId::new("1"))
        );
        assert_eq!(
            choose_switch_camera(&cameras, None),
            Some(DeviceId::new("0"))
        );
    }

    #[test]
    fn test_video_size_is_four_three_and_narrow() {
        let sizes = [
            Size::new(1920, 1080),
            Size::new(1440, 1080),
            Size::new(1024, 768),
            Size::new(640, 480),
        ];
        assert_eq!(choose_video_size(&sizes), Some(Size::new(1024, 768)));

        let wide_only = [Size::new(1920, 1080), Size::new(1280, 720)];
        assert_eq!(choose_video_size(&wide_only), Some(Size::new(1280, 720)));
        assert_eq!(choose_video_size(&[]), None);
    }

    #[test]
    fn test_preview_size_is_smallest_covering() {
        let sizes = [
            Size::new(1920, 1440),
            Size::new(1280, 960),
            Size::new(1920, 1080),
            Size::new(640, 480),
        ];
        let aspect = Size::new(1024, 768);
        assert_eq!(
            choose_preview_size(&sizes, Size::new(1000, 700), aspect),
            Some(Size::new(1280, 960))
        );
        // Nothing large enough
        assert_eq!(
            choose_preview_size(&sizes, Size::new(4000, 3000), aspect),
            Some(Size::new(1920, 1440))
        );
    }

    #[test]
    fn test_still_size_respects_limits() {
        let sizes = [
            Size::new(3264, 2448),
            Size::new(1920, 1440),
            Size::new(1280, 960),
            Size::new(1920, 1080),
        ];
        assert_eq!(
            choose_still_size(&sizes, Size::new(1280, 960)),
            Some(Size::new(1920, 1440))
        );
        assert_eq!(
            choose_still_size(&sizes, Size::new(500, 500)),
            Some(Size::new(3264, 2448))
        );
    }
}
