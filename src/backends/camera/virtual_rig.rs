// SPDX-License-Identifier: GPL-3.0-only

//! In-process virtual camera hardware
//!
//! The rig plays the part of the camera hardware for both adapters: it owns
//! device and session bookkeeping, simulates auto-focus / auto-exposure
//! convergence frame by frame, produces still images, and injects the faults
//! a real driver can raise. Every hardware call is logged in
//! [`HardwareStats`] so the resource invariants of the orchestrator can be
//! checked from the outside.

use super::metadata::{MetadataKey, ae_precapture_trigger, ae_state, af_state, af_trigger};
use super::types::*;
use crate::constants::timing;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// How a simulated 3A routine reaches a ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceBehavior {
    /// Ready this many frames after the trigger
    AfterFrames(u32),
    /// Keeps scanning forever
    Never,
    /// The driver does not report the state key at all
    Unreported,
}

/// One simulated camera
#[derive(Debug, Clone)]
pub struct VirtualDeviceSpec {
    pub characteristics: CameraCharacteristics,
    pub focus: ConvergenceBehavior,
    pub exposure: ConvergenceBehavior,
    pub open_fault: Option<DeviceFault>,
    pub disconnect_on_open: bool,
    pub reject_configuration: bool,
    pub fail_still_capture: bool,
}

impl VirtualDeviceSpec {
    /// Typical phone main camera: sensor at 90°, auto-focus, flash
    pub fn back(id: &str) -> Self {
        Self::with_facing(id, Facing::Back, SensorRotation::Rotate90)
    }

    /// Typical phone selfie camera: sensor at 270°
    pub fn front(id: &str) -> Self {
        Self::with_facing(id, Facing::Front, SensorRotation::Rotate270)
    }

    fn with_facing(id: &str, facing: Facing, sensor_orientation: SensorRotation) -> Self {
        use super::metadata::{ae_mode, af_mode, awb_mode};

        let sizes = vec![
            Size::new(3264, 2448),
            Size::new(1920, 1440),
            Size::new(1920, 1080),
            Size::new(1440, 1080),
            Size::new(1280, 960),
            Size::new(1280, 720),
            Size::new(1024, 768),
            Size::new(640, 480),
            Size::new(320, 240),
        ];

        Self {
            characteristics: CameraCharacteristics {
                id: DeviceId::new(id),
                facing: Some(facing),
                sensor_orientation,
                stream_configuration: Some(StreamConfiguration {
                    preview_sizes: sizes.clone(),
                    video_sizes: sizes.clone(),
                    still_sizes: sizes,
                }),
                min_focus_distance: Some(10.0),
                af_modes: vec![af_mode::OFF, af_mode::AUTO, af_mode::CONTINUOUS_PICTURE],
                ae_modes: vec![ae_mode::OFF, ae_mode::ON, ae_mode::ON_AUTO_FLASH],
                awb_modes: vec![awb_mode::OFF, awb_mode::AUTO],
            },
            focus: ConvergenceBehavior::AfterFrames(3),
            exposure: ConvergenceBehavior::AfterFrames(2),
            open_fault: None,
            disconnect_on_open: false,
            reject_configuration: false,
            fail_still_capture: false,
        }
    }

    pub fn with_focus(mut self, focus: ConvergenceBehavior) -> Self {
        self.focus = focus;
        self
    }

    pub fn with_exposure(mut self, exposure: ConvergenceBehavior) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn with_open_fault(mut self, fault: DeviceFault) -> Self {
        self.open_fault = Some(fault);
        self
    }

    pub fn disconnecting(mut self) -> Self {
        self.disconnect_on_open = true;
        self
    }

    pub fn rejecting_configuration(mut self) -> Self {
        self.reject_configuration = true;
        self
    }

    pub fn failing_still_capture(mut self) -> Self {
        self.fail_still_capture = true;
        self
    }

    pub fn id(&self) -> &DeviceId {
        &self.characteristics.id
    }
}

/// One call as seen by the hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCall {
    OpenDevice(DeviceId),
    CloseDevice(DeviceId),
    CreateSession(Vec<SurfaceKind>),
    SetRepeating(RequestTemplate),
    Capture(RequestTemplate),
    StopRepeating,
    AbortCaptures,
    CloseSession,
}

/// Resource counters and call log
#[derive(Debug, Clone, Default)]
pub struct HardwareStats {
    pub open_devices: usize,
    pub live_sessions: usize,
    pub max_open_devices: usize,
    pub max_live_sessions: usize,
    /// Sessions closed while their repeating request was still running
    pub close_order_violations: usize,
    pub calls: Vec<HardwareCall>,
}

impl HardwareStats {
    pub fn count(&self, call: &HardwareCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    /// Number of still captures the hardware executed
    pub fn still_captures(&self) -> usize {
        self.count(&HardwareCall::Capture(RequestTemplate::StillCapture))
    }
}

/// Why the rig refused to hand out a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcquireError {
    Unknown,
    Fault(DeviceFault),
    Disconnected,
}

struct RigSession {
    device: Uuid,
    spec: usize,
    frame: u64,
    still_size: Option<Size>,
    repeating: bool,
    af_trigger_at: Option<u64>,
    ae_trigger_at: Option<u64>,
}

/// Receives runtime faults of one open device
pub(crate) type FaultSink = Box<dyn Fn(DeviceEvent) + Send + Sync>;

struct RigState {
    specs: Vec<VirtualDeviceSpec>,
    external_holders: HashSet<DeviceId>,
    /// Open device handle id -> spec index
    devices: HashMap<Uuid, usize>,
    /// Open devices that failed after opening
    faulted: HashSet<Uuid>,
    fault_sinks: HashMap<Uuid, FaultSink>,
    sessions: HashMap<Uuid, RigSession>,
    stats: HardwareStats,
    frame_interval: Duration,
}

/// Shared virtual hardware
#[derive(Clone)]
pub struct VirtualRig {
    state: Arc<Mutex<RigState>>,
}

impl VirtualRig {
    pub fn new(specs: Vec<VirtualDeviceSpec>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RigState {
                specs,
                external_holders: HashSet::new(),
                devices: HashMap::new(),
                faulted: HashSet::new(),
                fault_sinks: HashMap::new(),
                sessions: HashMap::new(),
                stats: HardwareStats::default(),
                frame_interval: timing::VIRTUAL_FRAME_INTERVAL,
            })),
        }
    }

    /// A back camera "0" and a front camera "1"
    pub fn phone() -> Self {
        Self::new(vec![
            VirtualDeviceSpec::back("0"),
            VirtualDeviceSpec::front("1"),
        ])
    }

    fn lock(&self) -> MutexGuard<'_, RigState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn frame_interval(&self) -> Duration {
        self.lock().frame_interval
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.lock().specs.iter().map(|s| s.id().clone()).collect()
    }

    pub fn spec(&self, id: &DeviceId) -> Option<VirtualDeviceSpec> {
        self.lock().specs.iter().find(|s| s.id() == id).cloned()
    }

    pub fn spec_at(&self, index: usize) -> Option<VirtualDeviceSpec> {
        self.lock().specs.get(index).cloned()
    }

    /// Simulate another process holding the camera
    pub fn hold_externally(&self, id: &DeviceId) {
        self.lock().external_holders.insert(id.clone());
    }

    pub fn release_externally(&self, id: &DeviceId) {
        self.lock().external_holders.remove(id);
    }

    /// Fail every open handle of `id` with `fault`
    ///
    /// The driver reports the fault on the device's notification stream and
    /// every later frame or capture on its sessions fails.
    pub fn fail_device(&self, id: &DeviceId, fault: DeviceFault) {
        self.raise(id, DeviceEvent::Error(fault));
    }

    /// Unplug the camera while it is open
    pub fn disconnect(&self, id: &DeviceId) {
        self.raise(id, DeviceEvent::Disconnected);
    }

    fn raise(&self, id: &DeviceId, event: DeviceEvent) {
        let mut state = self.lock();
        let Some(index) = state.specs.iter().position(|s| s.id() == id) else {
            return;
        };
        let handles: Vec<Uuid> = state
            .devices
            .iter()
            .filter(|(_, i)| **i == index)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in handles {
            warn!(device = %id, ?event, "Injecting device fault");
            state.faulted.insert(handle);
            if let Some(sink) = state.fault_sinks.get(&handle) {
                sink(event.clone());
            }
        }
    }

    /// Route runtime faults of an open device to `sink`
    pub(crate) fn watch(&self, handle: &DeviceHandle, sink: FaultSink) {
        self.lock().fault_sinks.insert(handle.id, sink);
    }

    pub fn stats(&self) -> HardwareStats {
        self.lock().stats.clone()
    }

    pub(crate) fn record(&self, call: HardwareCall) {
        debug!(?call, "Virtual hardware call");
        self.lock().stats.calls.push(call);
    }

    pub(crate) fn acquire(&self, id: &DeviceId) -> Result<DeviceHandle, AcquireError> {
        let mut state = self.lock();
        let Some(index) = state.specs.iter().position(|s| s.id() == id) else {
            return Err(AcquireError::Unknown);
        };
        let spec = &state.specs[index];
        if let Some(fault) = spec.open_fault {
            return Err(AcquireError::Fault(fault));
        }
        if spec.disconnect_on_open {
            return Err(AcquireError::Disconnected);
        }
        if state.external_holders.contains(id) || state.devices.values().any(|i| *i == index) {
            return Err(AcquireError::Fault(DeviceFault::CameraInUse));
        }

        let handle = DeviceHandle::new(id.clone());
        state.devices.insert(handle.id, index);
        state.stats.open_devices += 1;
        state.stats.max_open_devices = state.stats.max_open_devices.max(state.stats.open_devices);
        Ok(handle)
    }

    /// Release a device and any session still bound to it
    ///
    /// Returns false if the handle was not open.
    pub(crate) fn release(&self, handle: &DeviceHandle) -> bool {
        let mut state = self.lock();
        if state.devices.remove(&handle.id).is_none() {
            return false;
        }
        state.faulted.remove(&handle.id);
        state.fault_sinks.remove(&handle.id);
        let orphaned: Vec<Uuid> = state
            .sessions
            .iter()
            .filter(|(_, s)| s.device == handle.id)
            .map(|(id, _)| *id)
            .collect();
        for id in orphaned {
            warn!(device = %handle.device_id, "Device closed with a live session");
            state.sessions.remove(&id);
            state.stats.live_sessions -= 1;
        }
        state.stats.open_devices -= 1;
        true
    }

    pub(crate) fn open_session(
        &self,
        device: &DeviceHandle,
        surfaces: &SurfaceSet,
    ) -> Result<SessionHandle, String> {
        let mut state = self.lock();
        let Some(&spec) = state.devices.get(&device.id) else {
            return Err("device is not open".to_string());
        };
        if state.specs[spec].reject_configuration {
            return Err(format!("unsupported surface set {:?}", surfaces.kinds()));
        }

        let handle = SessionHandle::new(device.clone(), surfaces.clone());
        state.sessions.insert(
            handle.id,
            RigSession {
                device: device.id,
                spec,
                frame: 0,
                still_size: surfaces.still.as_ref().map(|s| s.size),
                repeating: false,
                af_trigger_at: None,
                ae_trigger_at: None,
            },
        );
        state.stats.live_sessions += 1;
        state.stats.max_live_sessions = state.stats.max_live_sessions.max(state.stats.live_sessions);
        Ok(handle)
    }

    pub(crate) fn close_session(&self, session: Uuid) -> bool {
        let mut state = self.lock();
        let Some(closed) = state.sessions.remove(&session) else {
            return false;
        };
        if closed.repeating {
            warn!("Session closed while its repeating request was active");
            state.stats.close_order_violations += 1;
        }
        state.stats.live_sessions -= 1;
        true
    }

    pub(crate) fn set_repeating(&self, session: Uuid, active: bool) {
        if let Some(s) = self.lock().sessions.get_mut(&session) {
            s.repeating = active;
        }
    }

    /// Run one frame of `request` through the simulated pipeline
    pub(crate) fn produce_result(
        &self,
        session: Uuid,
        request: &CaptureRequest,
    ) -> Result<CaptureResult, String> {
        let mut state = self.lock();
        let RigState {
            specs,
            sessions,
            faulted,
            ..
        } = &mut *state;
        let Some(slot) = sessions.get_mut(&session) else {
            return Err("session is closed".to_string());
        };
        if faulted.contains(&slot.device) {
            return Err("camera device error".to_string());
        }
        let spec = &specs[slot.spec];

        slot.frame += 1;
        let frame = slot.frame;
        if request.get(MetadataKey::AfTrigger) == Some(af_trigger::START) {
            slot.af_trigger_at = Some(frame);
        }
        if request.get(MetadataKey::AePrecaptureTrigger) == Some(ae_precapture_trigger::START) {
            slot.ae_trigger_at = Some(frame);
        }

        let mut result = CaptureResult::new(frame, request.template);
        result.metadata.extend(request.settings.iter().map(|(k, v)| (*k, *v)));
        result.metadata.remove(&MetadataKey::AfState);
        result.metadata.remove(&MetadataKey::AeState);

        let af = simulate(
            spec.focus,
            slot.af_trigger_at.map(|t| frame - t),
            af_state::PASSIVE_SCAN,
            af_state::ACTIVE_SCAN,
            af_state::FOCUSED_LOCKED,
        );
        let ae = simulate(
            spec.exposure,
            slot.ae_trigger_at.map(|t| frame - t),
            ae_state::SEARCHING,
            ae_state::PRECAPTURE,
            ae_state::CONVERGED,
        );
        if let Some(af) = af {
            result.metadata.insert(MetadataKey::AfState, af);
        }
        if let Some(ae) = ae {
            result.metadata.insert(MetadataKey::AeState, ae);
        }

        if request.template == RequestTemplate::StillCapture && request.targets(SurfaceKind::Still)
        {
            if spec.fail_still_capture {
                return Err("sensor readout failed".to_string());
            }
            let size = slot.still_size.ok_or("session has no still surface")?;
            let orientation = request
                .get(MetadataKey::JpegOrientation)
                .map_or(0, |o| o.rem_euclid(360) as u32);
            result.image = Some(encode_still(size, orientation));
        }

        Ok(result)
    }

    /// One-shot focus sweep for APIs without per-frame 3A state
    pub(crate) fn focus_outcome(&self, id: &DeviceId) -> bool {
        self.spec(id)
            .is_some_and(|spec| spec.focus != ConvergenceBehavior::Never)
    }

    /// Still capture for APIs that return the image directly
    pub(crate) fn capture_still(&self, session: Uuid, orientation: u32) -> Result<StillImage, String> {
        let state = self.lock();
        let Some(slot) = state.sessions.get(&session) else {
            return Err("session is closed".to_string());
        };
        if state.faulted.contains(&slot.device) {
            return Err("camera device error".to_string());
        }
        if state.specs[slot.spec].fail_still_capture {
            return Err("sensor readout failed".to_string());
        }
        let size = slot.still_size.ok_or("session has no still surface")?;
        Ok(encode_still(size, orientation))
    }
}

/// Minimal JPEG-shaped payload: SOI, the size, EOI
fn encode_still(size: Size, orientation: u32) -> StillImage {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(&size.width.to_be_bytes());
    data.extend_from_slice(&size.height.to_be_bytes());
    data.extend_from_slice(&[0xFF, 0xD9]);
    StillImage {
        size,
        orientation,
        data: data.into(),
    }
}

/// Wrap a driver callback channel as an event stream
pub(crate) fn unbounded_events<T: Send + 'static>(
    mut rx: mpsc::UnboundedReceiver<T>,
) -> BoxStream<'static, T> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield event;
        }
    }
    .boxed()
}

/// Wrap a bounded frame channel as an event stream
pub(crate) fn bounded_events<T: Send + 'static>(mut rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield event;
        }
    }
    .boxed()
}

fn simulate(
    behavior: ConvergenceBehavior,
    frames_since_trigger: Option<u64>,
    idle: i32,
    scanning: i32,
    ready: i32,
) -> Option<i32> {
    match (behavior, frames_since_trigger) {
        (ConvergenceBehavior::Unreported, _) => None,
        (ConvergenceBehavior::Never, None) => Some(idle),
        (ConvergenceBehavior::Never, Some(_)) => Some(scanning),
        (ConvergenceBehavior::AfterFrames(_), None) => Some(idle),
        (ConvergenceBehavior::AfterFrames(n), Some(elapsed)) if elapsed >= n as u64 => Some(ready),
        (ConvergenceBehavior::AfterFrames(_), Some(_)) => Some(scanning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::metadata::af_trigger;

    fn photo_surfaces() -> SurfaceSet {
        SurfaceSet::photo(
            OutputSurface::new(SurfaceKind::Preview, Size::new(1280, 960)),
            OutputSurface::new(SurfaceKind::Still, Size::new(1920, 1440)),
        )
    }

    #[test]
    fn test_second_open_of_same_device_is_busy() {
        let rig = VirtualRig::phone();
        let id = DeviceId::new("0");
        let handle = rig.acquire(&id).unwrap();
        assert_eq!(
            rig.acquire(&id),
            Err(AcquireError::Fault(DeviceFault::CameraInUse))
        );
        assert!(rig.release(&handle));
        assert!(!rig.release(&handle));
        assert_eq!(rig.stats().open_devices, 0);
    }

    #[test]
    fn test_external_holder_blocks_open() {
        let rig = VirtualRig::phone();
        let id = DeviceId::new("1");
        rig.hold_externally(&id);
        assert!(matches!(rig.acquire(&id), Err(AcquireError::Fault(f)) if f.is_busy()));
        rig.release_externally(&id);
        assert!(rig.acquire(&id).is_ok());
    }

    #[test]
    fn test_focus_converges_after_trigger() {
        let rig = VirtualRig::new(vec![
            VirtualDeviceSpec::back("0").with_focus(ConvergenceBehavior::AfterFrames(2)),
        ]);
        let device = rig.acquire(&DeviceId::new("0")).unwrap();
        let session = rig.open_session(&device, &photo_surfaces()).unwrap();

        let preview = CaptureRequest::new(RequestTemplate::Preview);
        let idle = rig.produce_result(session.id, &preview).unwrap();
        assert_eq!(idle.get(MetadataKey::AfState), Some(af_state::PASSIVE_SCAN));

        let trigger = preview
            .clone()
            .with(MetadataKey::AfTrigger, af_trigger::START);
        let first = rig.produce_result(session.id, &trigger).unwrap();
        assert_eq!(first.get(MetadataKey::AfState), Some(af_state::ACTIVE_SCAN));
        rig.produce_result(session.id, &preview).unwrap();
        let locked = rig.produce_result(session.id, &preview).unwrap();
        assert_eq!(locked.get(MetadataKey::AfState), Some(af_state::FOCUSED_LOCKED));
    }

    #[test]
    fn test_unreported_state_is_absent() {
        let rig = VirtualRig::new(vec![
            VirtualDeviceSpec::back("0").with_exposure(ConvergenceBehavior::Unreported),
        ]);
        let device = rig.acquire(&DeviceId::new("0")).unwrap();
        let session = rig.open_session(&device, &photo_surfaces()).unwrap();
        let result = rig
            .produce_result(session.id, &CaptureRequest::new(RequestTemplate::Preview))
            .unwrap();
        assert_eq!(result.get(MetadataKey::AeState), None);
    }

    #[test]
    fn test_closing_repeating_session_counts_violation() {
        let rig = VirtualRig::phone();
        let device = rig.acquire(&DeviceId::new("0")).unwrap();
        let session = rig.open_session(&device, &photo_surfaces()).unwrap();
        rig.set_repeating(session.id, true);
        assert!(rig.close_session(session.id));
        assert_eq!(rig.stats().close_order_violations, 1);
    }

    #[test]
    fn test_still_capture_carries_jpeg_markers() {
        let rig = VirtualRig::phone();
        let device = rig.acquire(&DeviceId::new("0")).unwrap();
        let session = rig.open_session(&device, &photo_surfaces()).unwrap();
        let image = rig.capture_still(session.id, 90).unwrap();
        assert_eq!(&image.data[..2], &[0xFF, 0xD8]);
        assert_eq!(&image.data[image.data.len() - 2..], &[0xFF, 0xD9]);
        assert_eq!(image.size, Size::new(1920, 1440));
        assert_eq!(image.orientation, 90);
    }

    #[test]
    fn test_fault_reaches_sink_and_fails_frames() {
        let rig = VirtualRig::phone();
        let id = DeviceId::new("0");
        let device = rig.acquire(&id).unwrap();
        let session = rig.open_session(&device, &photo_surfaces()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        rig.watch(&device, {
            let seen = Arc::clone(&seen);
            Box::new(move |event| seen.lock().unwrap().push(event))
        });

        rig.disconnect(&id);
        assert_eq!(*seen.lock().unwrap(), vec![DeviceEvent::Disconnected]);
        assert!(
            rig.produce_result(session.id, &CaptureRequest::new(RequestTemplate::Preview))
                .is_err()
        );
        assert!(rig.capture_still(session.id, 0).is_err());

        // A fresh open after release is healthy again
        assert!(rig.release(&device));
        let device = rig.acquire(&id).unwrap();
        let session = rig.open_session(&device, &photo_surfaces()).unwrap();
        assert!(rig.capture_still(session.id, 0).is_ok());
    }
}
