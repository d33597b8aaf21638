// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends
//!
//! Everything that crosses the [`CameraService`](super::CameraService)
//! boundary lives here: identifiers, handles, surfaces, requests, results
//! and the tagged event enums the hardware emits.

use super::metadata::MetadataKey;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraBackendType {
    /// Metadata-rich API with per-frame 3A state
    #[default]
    Modern,
    /// Blocking single-object API without per-frame metadata
    Legacy,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::Modern => write!(f, "modern"),
            CameraBackendType::Legacy => write!(f, "legacy"),
        }
    }
}

impl std::str::FromStr for CameraBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modern" | "camera2" => Ok(CameraBackendType::Modern),
            "legacy" | "camera1" => Ok(CameraBackendType::Legacy),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Hardware identifier of a camera
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction the lens faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Facing {
    #[default]
    Back,
    Front,
    External,
}

impl Facing {
    /// Facing to look for when switching cameras
    ///
    /// External cameras are treated like back cameras.
    pub fn toggled(self) -> Facing {
        match self {
            Facing::Front => Facing::Back,
            Facing::Back | Facing::External => Facing::Front,
        }
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Back => write!(f, "back"),
            Facing::Front => write!(f, "front"),
            Facing::External => write!(f, "external"),
        }
    }
}

/// Width/height pair of an output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Area as u64 so large sensors cannot overflow
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Same aspect ratio as `other`, using integer math like the drivers do
    pub fn has_aspect_of(&self, other: Size) -> bool {
        other.width != 0 && self.height == self.width * other.height / other.width
    }

    pub fn swapped(&self) -> Size {
        Size::new(self.height, self.width)
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sensor rotation in degrees (clockwise)
///
/// Phone sensors are usually mounted at 90° (most devices) or 270° relative
/// to the natural display orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SensorRotation {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl SensorRotation {
    /// Create rotation from an integer degree value (normalised to 0-360).
    pub fn from_degrees_int(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => SensorRotation::Rotate90,
            180 => SensorRotation::Rotate180,
            270 => SensorRotation::Rotate270,
            _ => SensorRotation::None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            SensorRotation::None => 0,
            SensorRotation::Rotate90 => 90,
            SensorRotation::Rotate180 => 180,
            SensorRotation::Rotate270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, SensorRotation::Rotate90 | SensorRotation::Rotate270)
    }
}

impl std::fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Output sizes a device supports, per consumer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConfiguration {
    pub preview_sizes: Vec<Size>,
    pub video_sizes: Vec<Size>,
    pub still_sizes: Vec<Size>,
}

/// Static description of a camera, read before opening it
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCharacteristics {
    pub id: DeviceId,
    pub facing: Option<Facing>,
    pub sensor_orientation: SensorRotation,
    /// Devices without a stream map cannot be used for capture
    pub stream_configuration: Option<StreamConfiguration>,
    /// 0 or absent means a fixed-focus lens
    pub min_focus_distance: Option<f32>,
    pub af_modes: Vec<i32>,
    pub ae_modes: Vec<i32>,
    pub awb_modes: Vec<i32>,
}

impl CameraCharacteristics {
    pub fn is_fixed_focus(&self) -> bool {
        self.min_focus_distance.is_none_or(|d| d == 0.0)
    }
}

/// Fault codes reported by the device state callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFault {
    CameraInUse,
    MaxCamerasInUse,
    CameraDisabled,
    CameraDevice,
    CameraService,
}

impl DeviceFault {
    /// Map a raw driver error code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(DeviceFault::CameraInUse),
            2 => Some(DeviceFault::MaxCamerasInUse),
            3 => Some(DeviceFault::CameraDisabled),
            4 => Some(DeviceFault::CameraDevice),
            5 => Some(DeviceFault::CameraService),
            _ => None,
        }
    }

    /// Another client holds the hardware
    pub fn is_busy(&self) -> bool {
        matches!(self, DeviceFault::CameraInUse | DeviceFault::MaxCamerasInUse)
    }
}

impl std::fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFault::CameraInUse => write!(f, "camera in use"),
            DeviceFault::MaxCamerasInUse => write!(f, "too many cameras in use"),
            DeviceFault::CameraDisabled => write!(f, "camera disabled by policy"),
            DeviceFault::CameraDevice => write!(f, "fatal camera device error"),
            DeviceFault::CameraService => write!(f, "camera service error"),
        }
    }
}

/// Opaque reference to an opened device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    pub id: Uuid,
    pub device_id: DeviceId,
}

impl DeviceHandle {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
        }
    }
}

/// Device state callback, one stream per open request
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Opened(DeviceHandle),
    Disconnected,
    Error(DeviceFault),
    Closed,
}

/// Consumer an output surface feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    Preview,
    Still,
    Recording,
}

/// One output target of a capture session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputSurface {
    pub id: Uuid,
    pub kind: SurfaceKind,
    pub size: Size,
}

impl OutputSurface {
    pub fn new(kind: SurfaceKind, size: Size) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            size,
        }
    }
}

/// Fixed collection of outputs a session is configured against
///
/// Adding or removing the recording surface produces a different set and
/// therefore requires a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSet {
    pub preview: OutputSurface,
    pub still: Option<OutputSurface>,
    pub recording: Option<OutputSurface>,
}

impl SurfaceSet {
    pub fn photo(preview: OutputSurface, still: OutputSurface) -> Self {
        Self {
            preview,
            still: Some(still),
            recording: None,
        }
    }

    pub fn video(preview: OutputSurface, still: OutputSurface, recording: OutputSurface) -> Self {
        Self {
            preview,
            still: Some(still),
            recording: Some(recording),
        }
    }

    pub fn surfaces(&self) -> Vec<&OutputSurface> {
        std::iter::once(&self.preview)
            .chain(self.still.as_ref())
            .chain(self.recording.as_ref())
            .collect()
    }

    pub fn kinds(&self) -> Vec<SurfaceKind> {
        self.surfaces().iter().map(|s| s.kind).collect()
    }

    pub fn contains(&self, kind: SurfaceKind) -> bool {
        match kind {
            SurfaceKind::Preview => true,
            SurfaceKind::Still => self.still.is_some(),
            SurfaceKind::Recording => self.recording.is_some(),
        }
    }

    pub fn get(&self, kind: SurfaceKind) -> Option<&OutputSurface> {
        match kind {
            SurfaceKind::Preview => Some(&self.preview),
            SurfaceKind::Still => self.still.as_ref(),
            SurfaceKind::Recording => self.recording.as_ref(),
        }
    }
}

/// Handle to a configured capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: Uuid,
    pub device: DeviceHandle,
    pub surfaces: SurfaceSet,
}

impl SessionHandle {
    pub fn new(device: DeviceHandle, surfaces: SurfaceSet) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            surfaces,
        }
    }
}

/// Session state callback, one stream per create request
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Configured(SessionHandle),
    ConfigureFailed(String),
    Ready,
    Active,
    Closed,
}

/// Request templates the drivers tune their pipelines for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
    Record,
}

/// One capture request: template, targets and settings
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<SurfaceKind>,
    pub settings: BTreeMap<MetadataKey, i32>,
}

impl CaptureRequest {
    pub fn new(template: RequestTemplate) -> Self {
        Self {
            template,
            targets: Vec::new(),
            settings: BTreeMap::new(),
        }
    }

    pub fn add_target(&mut self, kind: SurfaceKind) {
        if !self.targets.contains(&kind) {
            self.targets.push(kind);
        }
    }

    pub fn set(&mut self, key: MetadataKey, value: i32) {
        self.settings.insert(key, value);
    }

    /// Builder-style `set`
    pub fn with(mut self, key: MetadataKey, value: i32) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: MetadataKey) -> Option<i32> {
        self.settings.get(&key).copied()
    }

    pub fn targets(&self, kind: SurfaceKind) -> bool {
        self.targets.contains(&kind)
    }
}

/// Encoded still image delivered on the still surface
#[derive(Clone, PartialEq, Eq)]
pub struct StillImage {
    pub size: Size,
    /// JPEG orientation the driver was asked to tag
    pub orientation: u32,
    pub data: Arc<[u8]>,
}

impl std::fmt::Debug for StillImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StillImage")
            .field("size", &self.size)
            .field("orientation", &self.orientation)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Metadata reported for one completed frame
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub frame_number: u64,
    pub template: RequestTemplate,
    /// Keys the driver did not report are absent
    pub metadata: BTreeMap<MetadataKey, i32>,
    pub image: Option<StillImage>,
}

impl CaptureResult {
    pub fn new(frame_number: u64, template: RequestTemplate) -> Self {
        Self {
            frame_number,
            template,
            metadata: BTreeMap::new(),
            image: None,
        }
    }

    pub fn get(&self, key: MetadataKey) -> Option<i32> {
        self.metadata.get(&key).copied()
    }
}

/// Capture callback
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Completed(CaptureResult),
    Failed(String),
}

pub type DeviceEvents = BoxStream<'static, DeviceEvent>;
pub type SessionEvents = BoxStream<'static, SessionEvent>;
pub type CaptureEvents = BoxStream<'static, CaptureEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_uses_integer_math() {
        let four_three = Size::new(1440, 1080);
        assert!(Size::new(640, 480).has_aspect_of(four_three));
        assert!(!Size::new(1920, 1080).has_aspect_of(four_three));
        assert!(!Size::new(640, 480).has_aspect_of(Size::new(0, 0)));
    }

    #[test]
    fn test_facing_toggle_treats_external_as_back() {
        assert_eq!(Facing::Back.toggled(), Facing::Front);
        assert_eq!(Facing::Front.toggled(), Facing::Back);
        assert_eq!(Facing::External.toggled(), Facing::Front);
    }

    #[test]
    fn test_sensor_rotation_normalises() {
        assert_eq!(SensorRotation::from_degrees_int(-90), SensorRotation::Rotate270);
        assert_eq!(SensorRotation::from_degrees_int(450), SensorRotation::Rotate90);
        assert!(SensorRotation::Rotate270.swaps_dimensions());
    }

    #[test]
    fn test_surface_set_kinds() {
        let preview = OutputSurface::new(SurfaceKind::Preview, Size::new(1280, 960));
        let still = OutputSurface::new(SurfaceKind::Still, Size::new(1920, 1440));
        let photo = SurfaceSet::photo(preview.clone(), still.clone());
        assert_eq!(photo.kinds(), vec![SurfaceKind::Preview, SurfaceKind::Still]);
        assert!(!photo.contains(SurfaceKind::Recording));

        let recording = OutputSurface::new(SurfaceKind::Recording, Size::new(1024, 768));
        let video = SurfaceSet::video(preview, still, recording);
        assert_ne!(photo, video);
        assert_eq!(video.surfaces().len(), 3);
    }

    #[test]
    fn test_device_fault_codes() {
        assert_eq!(DeviceFault::from_code(1), Some(DeviceFault::CameraInUse));
        assert_eq!(DeviceFault::from_code(5), Some(DeviceFault::CameraService));
        assert_eq!(DeviceFault::from_code(42), None);
        assert!(DeviceFault::MaxCamerasInUse.is_busy());
        assert!(!DeviceFault::CameraDisabled.is_busy());
    }

    #[test]
    fn test_backend_type_parses_aliases() {
        assert_eq!("camera1".parse(), Ok(CameraBackendType::Legacy));
        assert_eq!("Modern".parse(), Ok(CameraBackendType::Modern));
        assert!("v4l2".parse::<CameraBackendType>().is_err());
    }
}
