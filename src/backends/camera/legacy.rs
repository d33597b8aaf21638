// SPDX-License-Identifier: GPL-3.0-only

//! Adapter for the legacy single-object camera API
//!
//! The legacy API is blocking, index based and has no notion of capture
//! sessions or per-frame metadata. [`LegacyAdapter`] runs its calls on the
//! blocking pool and synthesises the session / result events the rest of the
//! orchestrator expects:
//!
//! - A session is just "outputs bound to the open camera".
//! - Preview frames carry no 3A state, so convergence waits complete on the
//!   first frame.
//! - An auto-focus trigger runs the blocking focus sweep and reports a locked
//!   (or not-locked) focus state on its single result.
//! - A still capture stops the preview, takes the picture and restarts the
//!   preview, as the legacy API requires.

use super::CameraService;
use super::metadata::{MetadataKey, ae_mode, af_mode, af_state, af_trigger, awb_mode};
use super::types::*;
use super::virtual_rig::{
    AcquireError, HardwareCall, VirtualRig, bounded_events, unbounded_events,
};
use crate::errors::{CameraError, CameraResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors raised by a legacy camera driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LegacyError {
    #[error("camera {0} is not open")]
    NotOpen(usize),
    #[error("camera is in use by another client")]
    InUse,
    #[error("camera disabled by policy")]
    Disabled,
    #[error("driver error: {0}")]
    Driver(String),
}

impl LegacyError {
    fn fault(&self) -> DeviceFault {
        match self {
            LegacyError::InUse => DeviceFault::CameraInUse,
            LegacyError::Disabled => DeviceFault::CameraDisabled,
            LegacyError::NotOpen(_) | LegacyError::Driver(_) => DeviceFault::CameraDevice,
        }
    }
}

impl From<DeviceFault> for LegacyError {
    fn from(fault: DeviceFault) -> Self {
        match fault {
            DeviceFault::CameraInUse | DeviceFault::MaxCamerasInUse => LegacyError::InUse,
            DeviceFault::CameraDisabled => LegacyError::Disabled,
            DeviceFault::CameraDevice | DeviceFault::CameraService => {
                LegacyError::Driver(fault.to_string())
            }
        }
    }
}

/// Asynchronous error callback of an open legacy camera
pub type LegacyErrorCallback = Box<dyn Fn(LegacyError) + Send + Sync>;

/// Static camera description as the legacy API reports it
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyCameraInfo {
    pub facing: Facing,
    pub orientation: SensorRotation,
    pub preview_sizes: Vec<Size>,
    pub video_sizes: Vec<Size>,
    pub picture_sizes: Vec<Size>,
    pub supports_auto_focus: bool,
    pub supports_flash: bool,
}

/// Blocking, index based camera driver
pub trait LegacyCamera: Send + Sync + 'static {
    fn number_of_cameras(&self) -> usize;
    fn camera_info(&self, index: usize) -> Option<LegacyCameraInfo>;
    fn open(&self, index: usize) -> Result<(), LegacyError>;
    /// Errors the driver raises after `open`; replaced on every call
    fn set_error_callback(&self, index: usize, callback: LegacyErrorCallback);
    /// Bind preview (and optional picture/recorder) outputs
    fn set_outputs(&self, index: usize, outputs: &SurfaceSet) -> Result<(), LegacyError>;
    fn clear_outputs(&self, index: usize);
    fn start_preview(&self, index: usize) -> Result<(), LegacyError>;
    fn stop_preview(&self, index: usize);
    /// Blocking focus sweep; `true` when focus locked
    fn auto_focus(&self, index: usize) -> Result<bool, LegacyError>;
    fn cancel_auto_focus(&self, index: usize);
    /// Blocking still capture; stops the preview
    fn take_picture(&self, index: usize, orientation: u32) -> Result<StillImage, LegacyError>;
    fn release(&self, index: usize);

    fn preview_frame_interval(&self) -> Duration {
        crate::constants::timing::VIRTUAL_FRAME_INTERVAL
    }
}

struct LegacySession {
    handle: SessionHandle,
    index: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
    frames: Arc<AtomicU64>,
    preview: Option<(JoinHandle<()>, RequestTemplate)>,
    pending: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct LegacyState {
    devices: HashMap<Uuid, (usize, mpsc::UnboundedSender<DeviceEvent>)>,
    sessions: HashMap<Uuid, LegacySession>,
}

/// [`CameraService`] over a [`LegacyCamera`] driver
pub struct LegacyAdapter<C: LegacyCamera> {
    camera: Arc<C>,
    state: Arc<Mutex<LegacyState>>,
}

impl<C: LegacyCamera> LegacyAdapter<C> {
    pub fn new(camera: C) -> Self {
        Self {
            camera: Arc::new(camera),
            state: Arc::new(Mutex::new(LegacyState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, LegacyState> {
        lock(&self.state)
    }

    fn index_of(&self, id: &DeviceId) -> CameraResult<usize> {
        id.as_str()
            .parse::<usize>()
            .ok()
            .filter(|index| *index < self.camera.number_of_cameras())
            .ok_or_else(|| CameraError::DeviceUnavailable(id.to_string()))
    }

    fn session_index(&self, session: &SessionHandle) -> CameraResult<usize> {
        self.state()
            .sessions
            .get(&session.id)
            .map(|s| s.index)
            .ok_or_else(|| CameraError::CaptureFailed(format!("session {} is closed", session.id)))
    }

    /// Ticker emitting metadata-free preview results
    fn spawn_preview(
        &self,
        frames: Arc<AtomicU64>,
        template: RequestTemplate,
        tx: mpsc::Sender<CaptureEvent>,
    ) -> JoinHandle<()> {
        let period = self.camera.preview_frame_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let frame = frames.fetch_add(1, Ordering::Relaxed) + 1;
                // Full or closed: the frame is dropped
                let _ = tx.try_send(CaptureEvent::Completed(CaptureResult::new(frame, template)));
            }
        })
    }
}

fn lock(state: &Mutex<LegacyState>) -> MutexGuard<'_, LegacyState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl<C: LegacyCamera> CameraService for LegacyAdapter<C> {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Legacy
    }

    async fn list_devices(&self) -> CameraResult<Vec<DeviceId>> {
        Ok((0..self.camera.number_of_cameras())
            .map(|index| DeviceId::new(index.to_string()))
            .collect())
    }

    async fn characteristics(&self, id: &DeviceId) -> CameraResult<CameraCharacteristics> {
        let index = self.index_of(id)?;
        let info = self
            .camera
            .camera_info(index)
            .ok_or_else(|| CameraError::DeviceUnavailable(id.to_string()))?;

        let af_modes = if info.supports_auto_focus {
            vec![af_mode::AUTO, af_mode::CONTINUOUS_PICTURE]
        } else {
            vec![af_mode::OFF]
        };
        let mut ae_modes = vec![ae_mode::ON];
        if info.supports_flash {
            ae_modes.push(ae_mode::ON_AUTO_FLASH);
        }

        Ok(CameraCharacteristics {
            id: id.clone(),
            facing: Some(info.facing),
            sensor_orientation: info.orientation,
            stream_configuration: Some(StreamConfiguration {
                preview_sizes: info.preview_sizes,
                video_sizes: info.video_sizes,
                still_sizes: info.picture_sizes,
            }),
            min_focus_distance: Some(if info.supports_auto_focus { 10.0 } else { 0.0 }),
            af_modes,
            ae_modes,
            awb_modes: vec![awb_mode::AUTO],
        })
    }

    async fn open_device(&self, id: &DeviceId) -> CameraResult<DeviceEvents> {
        let index = self.index_of(id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let camera = Arc::clone(&self.camera);
        let state = Arc::clone(&self.state);
        let id = id.clone();

        tokio::spawn(async move {
            let opened = tokio::task::spawn_blocking({
                let camera = Arc::clone(&camera);
                move || camera.open(index)
            })
            .await;

            let event = match opened {
                Ok(Ok(())) => {
                    info!(device = %id, "Legacy camera opened");
                    let faults = tx.clone();
                    camera.set_error_callback(
                        index,
                        Box::new(move |error| {
                            warn!(%error, "Legacy camera error");
                            let _ = faults.send(DeviceEvent::Error(error.fault()));
                        }),
                    );
                    let handle = DeviceHandle::new(id);
                    lock(&state).devices.insert(handle.id, (index, tx.clone()));
                    DeviceEvent::Opened(handle)
                }
                Ok(Err(error)) => {
                    warn!(device = %id, %error, "Legacy camera open failed");
                    DeviceEvent::Error(error.fault())
                }
                Err(error) => {
                    warn!(device = %id, %error, "Legacy open task failed");
                    DeviceEvent::Error(DeviceFault::CameraService)
                }
            };
            let _ = tx.send(event);
        });

        Ok(unbounded_events(rx))
    }

    async fn close_device(&self, device: &DeviceHandle) -> CameraResult<()> {
        let mut state = self.state();
        let Some((index, events)) = state.devices.remove(&device.id) else {
            return Ok(());
        };
        let orphaned: Vec<Uuid> = state
            .sessions
            .iter()
            .filter(|(_, s)| s.handle.device.id == device.id)
            .map(|(id, _)| *id)
            .collect();
        for id in orphaned {
            if let Some(session) = state.sessions.remove(&id) {
                if let Some((task, _)) = session.preview {
                    task.abort();
                }
                session.pending.iter().for_each(JoinHandle::abort);
                let _ = session.events.send(SessionEvent::Closed);
            }
        }
        drop(state);

        self.camera.release(index);
        info!(device = %device.device_id, "Legacy camera released");
        let _ = events.send(DeviceEvent::Closed);
        Ok(())
    }

    async fn create_session(
        &self,
        device: &DeviceHandle,
        surfaces: &SurfaceSet,
    ) -> CameraResult<SessionEvents> {
        let (tx, rx) = mpsc::unbounded_channel();
        let index = self.state().devices.get(&device.id).map(|(index, _)| *index);
        let Some(index) = index else {
            let _ = tx.send(SessionEvent::ConfigureFailed("device is not open".to_string()));
            return Ok(unbounded_events(rx));
        };

        match self.camera.set_outputs(index, surfaces) {
            Ok(()) => {
                let handle = SessionHandle::new(device.clone(), surfaces.clone());
                self.state().sessions.insert(
                    handle.id,
                    LegacySession {
                        handle: handle.clone(),
                        index,
                        events: tx.clone(),
                        frames: Arc::new(AtomicU64::new(0)),
                        preview: None,
                        pending: Vec::new(),
                    },
                );
                let _ = tx.send(SessionEvent::Configured(handle));
                let _ = tx.send(SessionEvent::Ready);
            }
            Err(error) => {
                let _ = tx.send(SessionEvent::ConfigureFailed(error.to_string()));
            }
        }
        Ok(unbounded_events(rx))
    }

    async fn capture(
        &self,
        session: &SessionHandle,
        request: CaptureRequest,
    ) -> CameraResult<CaptureEvents> {
        let index = self.session_index(session)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let camera = Arc::clone(&self.camera);
        let state = Arc::clone(&self.state);
        let session_id = session.id;
        let frames = self
            .state()
            .sessions
            .get(&session.id)
            .map(|s| Arc::clone(&s.frames))
            .unwrap_or_default();
        let period = self.camera.preview_frame_interval();

        let task = tokio::spawn(async move {
            let frame = frames.fetch_add(1, Ordering::Relaxed) + 1;
            let mut result = CaptureResult::new(frame, request.template);

            let outcome = if request.get(MetadataKey::AfTrigger) == Some(af_trigger::START) {
                tokio::task::spawn_blocking(move || camera.auto_focus(index))
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|r| r.map_err(|e| e.to_string()))
                    .map(|locked| {
                        let focus = if locked {
                            af_state::FOCUSED_LOCKED
                        } else {
                            af_state::NOT_FOCUSED_LOCKED
                        };
                        result.metadata.insert(MetadataKey::AfState, focus);
                        result
                    })
            } else if request.template == RequestTemplate::StillCapture {
                let orientation = request
                    .get(MetadataKey::JpegOrientation)
                    .map_or(0, |o| o.rem_euclid(360) as u32);
                let preview_running = lock(&state)
                    .sessions
                    .get(&session_id)
                    .is_some_and(|s| s.preview.is_some());
                tokio::task::spawn_blocking(move || {
                    let picture = camera.take_picture(index, orientation);
                    if preview_running {
                        if let Err(error) = camera.start_preview(index) {
                            warn!(%error, "Preview restart after picture failed");
                        }
                    }
                    picture
                })
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()))
                .map(|image| {
                    result.image = Some(image);
                    result
                })
            } else {
                // Nothing to run; the request completes with the next frame
                tokio::time::sleep(period).await;
                Ok(result)
            };

            let event = match outcome {
                Ok(result) => CaptureEvent::Completed(result),
                Err(reason) => CaptureEvent::Failed(reason),
            };
            let _ = tx.send(event);
        });

        if let Some(slot) = self.state().sessions.get_mut(&session.id) {
            slot.pending.retain(|t| !t.is_finished());
            slot.pending.push(task);
        }
        Ok(unbounded_events(rx))
    }

    async fn set_repeating(
        &self,
        session: &SessionHandle,
        request: CaptureRequest,
    ) -> CameraResult<CaptureEvents> {
        let index = self.session_index(session)?;
        if let Some(slot) = self.state().sessions.get_mut(&session.id) {
            if let Some((task, _)) = slot.preview.take() {
                task.abort();
            }
        }
        self.camera
            .start_preview(index)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(8);
        let mut state = self.state();
        let Some(slot) = state.sessions.get_mut(&session.id) else {
            return Err(CameraError::CaptureFailed(format!(
                "session {} is closed",
                session.id
            )));
        };
        let task = self.spawn_preview(Arc::clone(&slot.frames), request.template, tx);
        slot.preview = Some((task, request.template));
        debug!(index, template = ?request.template, "Legacy preview started");
        Ok(bounded_events(rx))
    }

    async fn stop_repeating(&self, session: &SessionHandle) -> CameraResult<()> {
        let Ok(index) = self.session_index(session) else {
            return Ok(());
        };
        self.camera.stop_preview(index);
        if let Some(slot) = self.state().sessions.get_mut(&session.id) {
            if let Some((task, _)) = slot.preview.take() {
                task.abort();
            }
        }
        Ok(())
    }

    async fn abort_captures(&self, session: &SessionHandle) -> CameraResult<()> {
        let Ok(index) = self.session_index(session) else {
            return Ok(());
        };
        self.camera.cancel_auto_focus(index);
        if let Some(slot) = self.state().sessions.get_mut(&session.id) {
            slot.pending.drain(..).for_each(|task| task.abort());
        }
        Ok(())
    }

    async fn close_session(&self, session: &SessionHandle) -> CameraResult<()> {
        let removed = self.state().sessions.remove(&session.id);
        let Some(slot) = removed else {
            return Ok(());
        };
        self.camera.clear_outputs(slot.index);
        if let Some((task, _)) = slot.preview {
            task.abort();
        }
        slot.pending.iter().for_each(JoinHandle::abort);
        let _ = slot.events.send(SessionEvent::Closed);
        Ok(())
    }
}

#[derive(Default)]
struct VirtualLegacySlot {
    handle: Option<DeviceHandle>,
    session: Option<Uuid>,
}

/// Legacy driver backed by the virtual rig
pub struct VirtualLegacyCamera {
    rig: VirtualRig,
    slots: Mutex<HashMap<usize, VirtualLegacySlot>>,
}

impl VirtualLegacyCamera {
    pub fn new(rig: VirtualRig) -> Self {
        Self {
            rig,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<usize, VirtualLegacySlot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn device_id(&self, index: usize) -> DeviceId {
        DeviceId::new(index.to_string())
    }

    fn spec_id(&self, index: usize) -> Option<DeviceId> {
        self.rig.spec_at(index).map(|spec| spec.id().clone())
    }

    fn session(&self, index: usize) -> Result<Uuid, LegacyError> {
        self.slots()
            .get(&index)
            .and_then(|slot| slot.session)
            .ok_or(LegacyError::NotOpen(index))
    }
}

impl LegacyCamera for VirtualLegacyCamera {
    fn number_of_cameras(&self) -> usize {
        self.rig.device_ids().len()
    }

    fn camera_info(&self, index: usize) -> Option<LegacyCameraInfo> {
        let spec = self.rig.spec_at(index)?;
        let c = spec.characteristics;
        let config = c.stream_configuration.clone().unwrap_or_default();
        Some(LegacyCameraInfo {
            facing: c.facing.unwrap_or_default(),
            orientation: c.sensor_orientation,
            preview_sizes: config.preview_sizes,
            video_sizes: config.video_sizes,
            picture_sizes: config.still_sizes,
            supports_auto_focus: !c.is_fixed_focus(),
            supports_flash: c.ae_modes.contains(&ae_mode::ON_AUTO_FLASH),
        })
    }

    fn open(&self, index: usize) -> Result<(), LegacyError> {
        self.rig.record(HardwareCall::OpenDevice(self.device_id(index)));
        let id = self.spec_id(index).ok_or(LegacyError::NotOpen(index))?;
        match self.rig.acquire(&id) {
            Ok(handle) => {
                self.slots().entry(index).or_default().handle = Some(handle);
                Ok(())
            }
            Err(AcquireError::Fault(fault)) => Err(fault.into()),
            Err(AcquireError::Disconnected) => Err(LegacyError::Driver("disconnected".into())),
            Err(AcquireError::Unknown) => Err(LegacyError::NotOpen(index)),
        }
    }

    fn set_error_callback(&self, index: usize, callback: LegacyErrorCallback) {
        let handle = self.slots().get(&index).and_then(|slot| slot.handle.clone());
        if let Some(handle) = handle {
            self.rig.watch(
                &handle,
                Box::new(move |event| match event {
                    DeviceEvent::Error(fault) => callback(fault.into()),
                    DeviceEvent::Disconnected => {
                        callback(LegacyError::Driver("disconnected".into()))
                    }
                    DeviceEvent::Opened(_) | DeviceEvent::Closed => {}
                }),
            );
        }
    }

    fn set_outputs(&self, index: usize, outputs: &SurfaceSet) -> Result<(), LegacyError> {
        self.rig.record(HardwareCall::CreateSession(outputs.kinds()));
        let mut slots = self.slots();
        let slot = slots.get_mut(&index).ok_or(LegacyError::NotOpen(index))?;
        let handle = slot.handle.as_ref().ok_or(LegacyError::NotOpen(index))?;
        let session = self
            .rig
            .open_session(handle, outputs)
            .map_err(LegacyError::Driver)?;
        slot.session = Some(session.id);
        Ok(())
    }

    fn clear_outputs(&self, index: usize) {
        self.rig.record(HardwareCall::CloseSession);
        if let Some(session) = self.slots().get_mut(&index).and_then(|s| s.session.take()) {
            self.rig.close_session(session);
        }
    }

    fn start_preview(&self, index: usize) -> Result<(), LegacyError> {
        self.rig.record(HardwareCall::SetRepeating(RequestTemplate::Preview));
        let session = self.session(index)?;
        self.rig.set_repeating(session, true);
        Ok(())
    }

    fn stop_preview(&self, index: usize) {
        self.rig.record(HardwareCall::StopRepeating);
        if let Ok(session) = self.session(index) {
            self.rig.set_repeating(session, false);
        }
    }

    fn auto_focus(&self, index: usize) -> Result<bool, LegacyError> {
        self.rig.record(HardwareCall::Capture(RequestTemplate::Preview));
        self.session(index)?;
        let id = self.spec_id(index).ok_or(LegacyError::NotOpen(index))?;
        Ok(self.rig.focus_outcome(&id))
    }

    fn cancel_auto_focus(&self, _index: usize) {
        self.rig.record(HardwareCall::AbortCaptures);
    }

    fn take_picture(&self, index: usize, orientation: u32) -> Result<StillImage, LegacyError> {
        self.rig.record(HardwareCall::Capture(RequestTemplate::StillCapture));
        let session = self.session(index)?;
        self.rig.set_repeating(session, false);
        self.rig
            .capture_still(session, orientation)
            .map_err(LegacyError::Driver)
    }

    fn release(&self, index: usize) {
        self.rig.record(HardwareCall::CloseDevice(self.device_id(index)));
        if let Some(slot) = self.slots().remove(&index) {
            if let Some(handle) = slot.handle {
                self.rig.release(&handle);
            }
        }
    }

    fn preview_frame_interval(&self) -> Duration {
        self.rig.frame_interval()
    }
}
