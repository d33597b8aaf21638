// SPDX-License-Identifier: GPL-3.0-only

//! Session parameters negotiated when a camera is chosen

use super::requests::RequestFactory;
use super::strategy::{choose_preview_size, choose_still_size, choose_video_size};
use super::types::*;
use crate::errors::{CameraError, CameraResult};
use tracing::info;

/// Immutable snapshot of the parameters a session is opened with
///
/// Rebuilt whenever the camera changes; never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParameters {
    pub device_id: DeviceId,
    pub facing: Option<Facing>,
    pub sensor_orientation: SensorRotation,
    pub preview_size: Size,
    pub video_size: Size,
    pub still_size: Size,
    /// View size the sizes were negotiated for
    pub view: Size,
    pub characteristics: CameraCharacteristics,
}

impl SessionParameters {
    /// Negotiate stream sizes for a preview view of `view` pixels
    ///
    /// A portrait view on a sideways-mounted sensor is compared in sensor
    /// coordinates.
    pub fn negotiate(characteristics: CameraCharacteristics, view: Size) -> CameraResult<Self> {
        let id = characteristics.id.clone();
        let Some(config) = characteristics.stream_configuration.as_ref() else {
            return Err(CameraError::SessionConfigureFailed(format!(
                "{} has no stream configuration",
                id
            )));
        };
        let missing = |what: &str| {
            CameraError::SessionConfigureFailed(format!("{} reports no {} sizes", id, what))
        };

        let sensor_view = if characteristics.sensor_orientation.swaps_dimensions()
            && view.height > view.width
        {
            view.swapped()
        } else {
            view
        };

        let video_size = choose_video_size(&config.video_sizes).ok_or_else(|| missing("video"))?;
        let preview_size = choose_preview_size(&config.preview_sizes, sensor_view, video_size)
            .ok_or_else(|| missing("preview"))?;
        let still_size =
            choose_still_size(&config.still_sizes, preview_size).ok_or_else(|| missing("still"))?;

        info!(
            device = %id,
            preview = %preview_size,
            video = %video_size,
            still = %still_size,
            "Negotiated session parameters"
        );

        Ok(Self {
            device_id: id.clone(),
            facing: characteristics.facing,
            sensor_orientation: characteristics.sensor_orientation,
            preview_size,
            video_size,
            still_size,
            view,
            characteristics,
        })
    }

    pub fn requests(&self) -> RequestFactory {
        RequestFactory::new(self.characteristics.clone())
    }

    /// Surfaces for a photo session
    pub fn photo_surfaces(&self, preview: OutputSurface) -> SurfaceSet {
        SurfaceSet::photo(preview, self.still_surface())
    }

    /// Surfaces for a recording session
    pub fn video_surfaces(&self, preview: OutputSurface, recording: OutputSurface) -> SurfaceSet {
        SurfaceSet::video(preview, self.still_surface(), recording)
    }

    pub fn preview_surface(&self) -> OutputSurface {
        OutputSurface::new(SurfaceKind::Preview, self.preview_size)
    }

    fn still_surface(&self) -> OutputSurface {
        OutputSurface::new(SurfaceKind::Still, self.still_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::virtual_rig::VirtualDeviceSpec;

    #[test]
    fn test_negotiate_phone_back_camera() {
        let characteristics = VirtualDeviceSpec::back("0").characteristics;
        let params = SessionParameters::negotiate(characteristics, Size::new(720, 1280)).unwrap();
        assert_eq!(params.video_size, Size::new(1024, 768));
        assert_eq!(params.preview_size, Size::new(1280, 960));
        assert_eq!(params.still_size, Size::new(1920, 1440));
        assert_eq!(params.facing, Some(Facing::Back));
    }

    #[test]
    fn test_negotiate_without_streams_fails() {
        let mut characteristics = VirtualDeviceSpec::front("1").characteristics;
        characteristics.stream_configuration = None;
        let result = SessionParameters::negotiate(characteristics, Size::new(640, 480));
        assert!(matches!(result, Err(CameraError::SessionConfigureFailed(_))));
    }

    #[test]
    fn test_surface_sets_differ_by_recording() {
        let params = SessionParameters::negotiate(
            VirtualDeviceSpec::back("0").characteristics,
            Size::new(640, 480),
        )
        .unwrap();
        let preview = params.preview_surface();
        let photo = params.photo_surfaces(preview.clone());
        let video = params.video_surfaces(
            preview,
            OutputSurface::new(SurfaceKind::Recording, params.video_size),
        );
        assert!(!photo.contains(SurfaceKind::Recording));
        assert!(video.contains(SurfaceKind::Recording));
    }
}
