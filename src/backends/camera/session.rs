// SPDX-License-Identifier: GPL-3.0-only

//! Capture session manager
//!
//! A session is bound to one open device and a fixed surface set. Changing
//! the surface set means closing the session and creating a new one; there is
//! no in-place reconfiguration.
//!
//! A device carries at most one live session; a second create is rejected
//! until the first one is closed.
//!
//! Closing always runs the full sequence
//! `stop_repeating -> abort_captures -> close_session`, even when an earlier
//! step fails.

use super::CameraService;
use super::manager::{DeviceState, OpenDevice};
use super::types::*;
use crate::errors::{CameraError, CameraResult};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Configuring,
    Configured,
    Closing,
    Closed,
}

/// A configured session and its notification stream
pub struct LiveSession {
    handle: SessionHandle,
    // Sync wrappers; only ever accessed through `get_mut`
    events: tokio::sync::Mutex<SessionEvents>,
    frames: tokio::sync::Mutex<Option<CaptureEvents>>,
    state: SessionState,
    repeating: Option<RequestTemplate>,
}

impl LiveSession {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn surfaces(&self) -> &SurfaceSet {
        &self.handle.surfaces
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Template of the installed repeating request, if any
    pub fn repeating(&self) -> Option<RequestTemplate> {
        self.repeating
    }

    /// Resolves with the first fault the driver reports on this session
    ///
    /// A driver-initiated close and a failed repeating request count as
    /// faults; other notifications and frame results are consumed and
    /// dropped. Never resolves once the session is closing.
    pub async fn next_fault(&mut self) -> CameraError {
        if self.state != SessionState::Configured {
            return std::future::pending().await;
        }
        let id = self.handle.id;
        let events = self.events.get_mut();
        let frames = self.frames.get_mut();
        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(SessionEvent::Closed) | None => {
                        return CameraError::DeviceError(format!("session {} closed by the driver", id));
                    }
                    Some(event) => debug!(session = %id, ?event, "Session event"),
                },
                frame = next_frame(frames) => {
                    if let CaptureEvent::Failed(reason) = frame {
                        warn!(session = %id, %reason, "Repeating request failed");
                        return CameraError::CaptureFailed(reason);
                    }
                }
            }
        }
    }
}

/// Next result of the repeating request; pends once there is none
///
/// A finished stream (request replaced or stopped) is dropped.
async fn next_frame(frames: &mut Option<CaptureEvents>) -> CaptureEvent {
    loop {
        match frames.as_mut() {
            Some(stream) => match stream.next().await {
                Some(frame) => return frame,
                None => *frames = None,
            },
            None => return std::future::pending().await,
        }
    }
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("id", &self.handle.id)
            .field("kinds", &self.handle.surfaces.kinds())
            .field("state", &self.state)
            .field("repeating", &self.repeating)
            .finish()
    }
}

/// Session slot of one open device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceSlot {
    Configuring,
    Live(Uuid),
}

type DeviceSlots = Arc<Mutex<HashMap<Uuid, DeviceSlot>>>;

/// Holds a device's slot while configuring
///
/// Dropped uncommitted (failure or cancellation) it frees the slot;
/// committed it leaves the live session in place.
struct ConfiguringGuard {
    slots: DeviceSlots,
    device: Uuid,
    session: Option<Uuid>,
}

impl ConfiguringGuard {
    fn commit(mut self, session: Uuid) {
        self.session = Some(session);
    }
}

impl Drop for ConfiguringGuard {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.slots.lock() {
            match self.session {
                Some(session) => {
                    slots.insert(self.device, DeviceSlot::Live(session));
                }
                None => {
                    slots.remove(&self.device);
                }
            }
        }
    }
}

/// Capture session manager
#[derive(Clone)]
pub struct CaptureSessionManager {
    service: Arc<dyn CameraService>,
    slots: DeviceSlots,
}

impl CaptureSessionManager {
    pub fn new(service: Arc<dyn CameraService>) -> Self {
        Self {
            service,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn begin_configuring(&self, device: &DeviceHandle) -> CameraResult<ConfiguringGuard> {
        let mut slots = self.slots.lock().map_err(|_| CameraError::SessionBusy)?;
        if let Some(slot) = slots.get(&device.id) {
            debug!(device = %device.device_id, ?slot, "Device already has a session");
            return Err(CameraError::SessionBusy);
        }
        slots.insert(device.id, DeviceSlot::Configuring);
        Ok(ConfiguringGuard {
            slots: Arc::clone(&self.slots),
            device: device.id,
            session: None,
        })
    }

    fn end_session(&self, session: &SessionHandle) {
        if let Ok(mut slots) = self.slots.lock()
            && slots.get(&session.device.id) == Some(&DeviceSlot::Live(session.id))
        {
            slots.remove(&session.device.id);
        }
    }

    /// Create a session over `surfaces` on an open device
    ///
    /// # Errors
    /// - `DeviceError` if the device is not open
    /// - `SessionBusy` if the device already has a session, live or still
    ///   configuring
    /// - `SessionConfigureFailed` if the driver rejects the surface set
    pub async fn create_session(
        &self,
        device: &OpenDevice,
        surfaces: SurfaceSet,
    ) -> CameraResult<LiveSession> {
        if device.state() != DeviceState::Open {
            return Err(CameraError::DeviceError(format!(
                "{} is not open ({:?})",
                device.device_id(),
                device.state()
            )));
        }
        let guard = self.begin_configuring(device.handle())?;
        info!(device = %device.device_id(), kinds = ?surfaces.kinds(), "Configuring session");

        let mut events = self
            .service
            .create_session(device.handle(), &surfaces)
            .await?;

        while let Some(event) = events.next().await {
            match event {
                SessionEvent::Configured(handle) => {
                    info!(device = %device.device_id(), session = %handle.id, "Session configured");
                    guard.commit(handle.id);
                    return Ok(LiveSession {
                        handle,
                        events: tokio::sync::Mutex::new(events),
                        frames: tokio::sync::Mutex::new(None),
                        state: SessionState::Configured,
                        repeating: None,
                    });
                }
                SessionEvent::ConfigureFailed(reason) => {
                    warn!(device = %device.device_id(), %reason, "Session configuration failed");
                    return Err(CameraError::SessionConfigureFailed(reason));
                }
                SessionEvent::Ready | SessionEvent::Active => {}
                SessionEvent::Closed => break,
            }
        }

        Err(CameraError::SessionConfigureFailed(
            "session closed while configuring".to_string(),
        ))
    }

    /// Install the repeating preview (or record) request
    ///
    /// The session keeps its result stream so failures surface through
    /// [`LiveSession::next_fault`].
    pub async fn start_preview(
        &self,
        session: &mut LiveSession,
        request: CaptureRequest,
    ) -> CameraResult<()> {
        debug!(session = %session.handle.id, template = ?request.template, "Starting repeating request");
        let template = request.template;
        let frames = self.service.set_repeating(&session.handle, request).await?;
        *session.frames.get_mut() = Some(frames);
        session.repeating = Some(template);
        Ok(())
    }

    /// Submit a single still capture and wait for its image
    pub async fn capture_still(
        &self,
        session: &LiveSession,
        request: CaptureRequest,
    ) -> CameraResult<StillImage> {
        info!(session = %session.handle.id, "Capturing still image");
        let mut results = self.service.capture(&session.handle, request).await?;
        match results.next().await {
            Some(CaptureEvent::Completed(result)) => result.image.ok_or_else(|| {
                CameraError::CaptureFailed("capture completed without an image".to_string())
            }),
            Some(CaptureEvent::Failed(reason)) => Err(CameraError::CaptureFailed(reason)),
            None => Err(CameraError::CaptureFailed("capture aborted".to_string())),
        }
    }

    /// Close a session: stop repeating, abort captures, close
    ///
    /// Every step runs even if an earlier one fails. Closing a closed session
    /// is a no-op.
    pub async fn close_session(&self, session: &mut LiveSession) {
        if session.state == SessionState::Closed {
            return;
        }
        info!(session = %session.handle.id, "Closing session");
        session.state = SessionState::Closing;
        let handle = &session.handle;

        if let Err(error) = self.service.stop_repeating(handle).await {
            warn!(%error, "stop_repeating failed while closing session");
        }
        session.repeating = None;
        *session.frames.get_mut() = None;
        if let Err(error) = self.service.abort_captures(handle).await {
            warn!(%error, "abort_captures failed while closing session");
        }
        match self.service.close_session(handle).await {
            Ok(()) => {
                while let Some(event) = session.events.get_mut().next().await {
                    if event == SessionEvent::Closed {
                        break;
                    }
                }
            }
            Err(error) => warn!(%error, "close_session failed; treating as closed"),
        }

        session.state = SessionState::Closed;
        self.end_session(&session.handle);
        debug!(session = %session.handle.id, "Session closed");
    }

    /// Close-then-recreate against a new surface set
    pub async fn reconfigure(
        &self,
        device: &OpenDevice,
        session: &mut LiveSession,
        surfaces: SurfaceSet,
    ) -> CameraResult<LiveSession> {
        self.close_session(session).await;
        self.create_session(device, surfaces).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::manager::DeviceLifecycleManager;
    use crate::backends::camera::virtual_rig::{HardwareCall, VirtualDeviceSpec, VirtualRig};
    use crate::backends::camera::get_virtual_backend;
    use std::time::Duration;

    fn photo_surfaces() -> SurfaceSet {
        SurfaceSet::photo(
            OutputSurface::new(SurfaceKind::Preview, Size::new(1280, 960)),
            OutputSurface::new(SurfaceKind::Still, Size::new(1920, 1440)),
        )
    }

    fn managers(rig: &VirtualRig) -> (DeviceLifecycleManager, CaptureSessionManager) {
        let service = get_virtual_backend(CameraBackendType::Modern, rig.clone());
        (
            DeviceLifecycleManager::new(Arc::clone(&service)),
            CaptureSessionManager::new(service),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_runs_in_order() {
        let rig = VirtualRig::phone();
        let (devices, sessions) = managers(&rig);
        let device = devices.open(&DeviceId::new("0")).await.unwrap();
        let mut session = sessions
            .create_session(&device, photo_surfaces())
            .await
            .unwrap();
        sessions
            .start_preview(&mut session, CaptureRequest::new(RequestTemplate::Preview))
            .await
            .unwrap();

        sessions.close_session(&mut session).await;
        sessions.close_session(&mut session).await;

        let calls = rig.stats().calls;
        let tail: Vec<_> = calls.iter().rev().take(3).rev().cloned().collect();
        assert_eq!(
            tail,
            vec![
                HardwareCall::StopRepeating,
                HardwareCall::AbortCaptures,
                HardwareCall::CloseSession
            ]
        );
        assert_eq!(rig.stats().close_order_violations, 0);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_failure_is_reported() {
        let rig = VirtualRig::new(vec![VirtualDeviceSpec::back("0").rejecting_configuration()]);
        let (devices, sessions) = managers(&rig);
        let device = devices.open(&DeviceId::new("0")).await.unwrap();
        let result = sessions.create_session(&device, photo_surfaces()).await;
        assert!(matches!(result, Err(CameraError::SessionConfigureFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_configure_is_busy() {
        let rig = VirtualRig::phone();
        let (devices, sessions) = managers(&rig);
        let device = devices.open(&DeviceId::new("0")).await.unwrap();

        let (first, second) = tokio::join!(
            sessions.create_session(&device, photo_surfaces()),
            sessions.create_session(&device, photo_surfaces()),
        );
        assert!(first.is_ok());
        assert_eq!(second.err(), Some(CameraError::SessionBusy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_session_blocks_second_create() {
        let rig = VirtualRig::phone();
        let (devices, sessions) = managers(&rig);
        let device = devices.open(&DeviceId::new("0")).await.unwrap();

        let mut first = sessions
            .create_session(&device, photo_surfaces())
            .await
            .unwrap();
        let second = sessions.create_session(&device, photo_surfaces()).await;
        assert_eq!(second.err(), Some(CameraError::SessionBusy));
        assert_eq!(rig.stats().live_sessions, 1);

        sessions.close_session(&mut first).await;
        let third = sessions.create_session(&device, photo_surfaces()).await;
        assert!(third.is_ok());
        assert_eq!(rig.stats().max_live_sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_configure_frees_the_device() {
        let rig = VirtualRig::new(vec![VirtualDeviceSpec::back("0").rejecting_configuration()]);
        let (devices, sessions) = managers(&rig);
        let device = devices.open(&DeviceId::new("0")).await.unwrap();
        let first = sessions.create_session(&device, photo_surfaces()).await;
        let second = sessions.create_session(&device, photo_surfaces()).await;
        assert!(matches!(first, Err(CameraError::SessionConfigureFailed(_))));
        assert!(matches!(second, Err(CameraError::SessionConfigureFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_closed_session_is_a_fault() {
        let rig = VirtualRig::phone();
        let service = get_virtual_backend(CameraBackendType::Modern, rig.clone());
        let devices = DeviceLifecycleManager::new(Arc::clone(&service));
        let sessions = CaptureSessionManager::new(Arc::clone(&service));
        let device = devices.open(&DeviceId::new("0")).await.unwrap();
        let mut session = sessions
            .create_session(&device, photo_surfaces())
            .await
            .unwrap();

        service.close_session(session.handle()).await.unwrap();
        assert!(matches!(session.next_fault().await, CameraError::DeviceError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_failure_is_a_fault() {
        let rig = VirtualRig::phone();
        let (devices, sessions) = managers(&rig);
        let id = DeviceId::new("0");
        let device = devices.open(&id).await.unwrap();
        let mut session = sessions
            .create_session(&device, photo_surfaces())
            .await
            .unwrap();
        sessions
            .start_preview(&mut session, CaptureRequest::new(RequestTemplate::Preview))
            .await
            .unwrap();

        rig.fail_device(&id, DeviceFault::CameraDevice);
        assert!(matches!(session.next_fault().await, CameraError::CaptureFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_session_has_no_fault() {
        let rig = VirtualRig::phone();
        let (devices, sessions) = managers(&rig);
        let device = devices.open(&DeviceId::new("0")).await.unwrap();
        let mut session = sessions
            .create_session(&device, photo_surfaces())
            .await
            .unwrap();
        sessions
            .start_preview(&mut session, CaptureRequest::new(RequestTemplate::Preview))
            .await
            .unwrap();

        let fault = tokio::time::timeout(Duration::from_secs(2), session.next_fault()).await;
        assert!(fault.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_device_cannot_configure() {
        let rig = VirtualRig::phone();
        let (devices, sessions) = managers(&rig);
        let mut device = devices.open(&DeviceId::new("0")).await.unwrap();
        devices.close(&mut device).await;
        let result = sessions.create_session(&device, photo_surfaces()).await;
        assert!(matches!(result, Err(CameraError::DeviceError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_capture_returns_image() {
        let rig = VirtualRig::phone();
        let (devices, sessions) = managers(&rig);
        let device = devices.open(&DeviceId::new("0")).await.unwrap();
        let session = sessions
            .create_session(&device, photo_surfaces())
            .await
            .unwrap();
        let mut request = CaptureRequest::new(RequestTemplate::StillCapture);
        request.add_target(SurfaceKind::Still);
        let image = sessions.capture_still(&session, request).await.unwrap();
        assert_eq!(image.size, Size::new(1920, 1440));
    }
}
