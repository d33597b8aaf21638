// SPDX-License-Identifier: GPL-3.0-only

//! Capture request construction with automatic 3A setup

use super::metadata::{
    MetadataKey, ae_mode, ae_precapture_trigger, af_mode, awb_mode, capture_intent, control_mode,
};
use super::types::*;

/// Builds requests for one device's capabilities
#[derive(Debug, Clone)]
pub struct RequestFactory {
    characteristics: CameraCharacteristics,
}

impl RequestFactory {
    pub fn new(characteristics: CameraCharacteristics) -> Self {
        Self { characteristics }
    }

    /// Repeating request for the preview, or for preview + recorder while
    /// recording
    pub fn preview(&self, recording: bool) -> CaptureRequest {
        let mut request = if recording {
            let mut request = CaptureRequest::new(RequestTemplate::Record);
            request.add_target(SurfaceKind::Preview);
            request.add_target(SurfaceKind::Recording);
            request.set(MetadataKey::CaptureIntent, capture_intent::VIDEO_RECORD);
            request
        } else {
            let mut request = CaptureRequest::new(RequestTemplate::Preview);
            request.add_target(SurfaceKind::Preview);
            request.set(MetadataKey::CaptureIntent, capture_intent::PREVIEW);
            request
        };
        self.setup_3a(&mut request);
        request
    }

    /// Single still capture tagged with `jpeg_orientation`
    pub fn still(&self, jpeg_orientation: u32) -> CaptureRequest {
        let mut request = CaptureRequest::new(RequestTemplate::StillCapture);
        request.add_target(SurfaceKind::Still);
        request.set(MetadataKey::CaptureIntent, capture_intent::STILL_CAPTURE);
        request.set(MetadataKey::AePrecaptureTrigger, ae_precapture_trigger::IDLE);
        request.set(MetadataKey::JpegOrientation, jpeg_orientation as i32);
        self.setup_3a(&mut request);
        request
    }

    /// Auto mode for focus, exposure and white balance where supported
    ///
    /// Fixed-focus lenses get no AF mode at all.
    pub fn setup_3a(&self, request: &mut CaptureRequest) {
        let c = &self.characteristics;
        request.set(MetadataKey::ControlMode, control_mode::AUTO);

        if !c.is_fixed_focus() {
            if c.af_modes.contains(&af_mode::CONTINUOUS_PICTURE) {
                request.set(MetadataKey::AfMode, af_mode::CONTINUOUS_PICTURE);
            } else {
                request.set(MetadataKey::AfMode, af_mode::AUTO);
            }
        }

        if c.ae_modes.contains(&ae_mode::ON_AUTO_FLASH) {
            request.set(MetadataKey::AeMode, ae_mode::ON_AUTO_FLASH);
        } else {
            request.set(MetadataKey::AeMode, ae_mode::ON);
        }

        if c.awb_modes.contains(&awb_mode::AUTO) {
            request.set(MetadataKey::AwbMode, awb_mode::AUTO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn characteristics(min_focus: Option<f32>, af: Vec<i32>, ae: Vec<i32>) -> CameraCharacteristics {
        CameraCharacteristics {
            id: DeviceId::new("0"),
            facing: Some(Facing::Back),
            sensor_orientation: SensorRotation::Rotate90,
            stream_configuration: None,
            min_focus_distance: min_focus,
            af_modes: af,
            ae_modes: ae,
            awb_modes: vec![awb_mode::AUTO],
        }
    }

    #[test]
    fn test_3a_prefers_continuous_focus_and_auto_flash() {
        let factory = RequestFactory::new(characteristics(
            Some(10.0),
            vec![af_mode::AUTO, af_mode::CONTINUOUS_PICTURE],
            vec![ae_mode::ON, ae_mode::ON_AUTO_FLASH],
        ));
        let request = factory.preview(false);
        assert_eq!(request.get(MetadataKey::ControlMode), Some(control_mode::AUTO));
        assert_eq!(request.get(MetadataKey::AfMode), Some(af_mode::CONTINUOUS_PICTURE));
        assert_eq!(request.get(MetadataKey::AeMode), Some(ae_mode::ON_AUTO_FLASH));
        assert_eq!(request.get(MetadataKey::AwbMode), Some(awb_mode::AUTO));
    }

    #[test]
    fn test_fixed_focus_skips_af_mode() {
        let factory = RequestFactory::new(characteristics(Some(0.0), vec![af_mode::OFF], vec![ae_mode::ON]));
        let request = factory.preview(false);
        assert_eq!(request.get(MetadataKey::AfMode), None);
        assert_eq!(request.get(MetadataKey::AeMode), Some(ae_mode::ON));
    }

    #[test]
    fn test_record_request_targets_recorder() {
        let factory = RequestFactory::new(characteristics(None, Vec::new(), Vec::new()));
        let request = factory.preview(true);
        assert_eq!(request.template, RequestTemplate::Record);
        assert!(request.targets(SurfaceKind::Preview));
        assert!(request.targets(SurfaceKind::Recording));
    }

    #[test]
    fn test_still_request_carries_orientation() {
        let factory = RequestFactory::new(characteristics(Some(5.0), vec![af_mode::AUTO], Vec::new()));
        let request = factory.still(270);
        assert_eq!(request.template, RequestTemplate::StillCapture);
        assert!(request.targets(SurfaceKind::Still));
        assert_eq!(request.get(MetadataKey::JpegOrientation), Some(270));
        assert_eq!(
            request.get(MetadataKey::AePrecaptureTrigger),
            Some(ae_precapture_trigger::IDLE)
        );
        assert_eq!(request.get(MetadataKey::AfMode), Some(af_mode::AUTO));
    }
}
