// SPDX-License-Identifier: GPL-3.0-only

//! Camera resources owned by the dispatcher
//!
//! [`SessionContext`] holds everything that must be released on teardown.
//! Exactly one pipeline owns it at a time; the dispatcher lends it out when
//! a pipeline starts and takes it back when the pipeline finishes.

use super::callback::CameraCallback;
use super::display::{DisplaySurfaceProvider, PreviewSurface};
use crate::backends::camera::{
    CameraService, CaptureSessionManager, ConvergenceWaiter, DeviceLifecycleManager, LiveSession,
    OpenDevice, OutputSurface, SessionParameters, SurfaceKind, SurfaceSet,
};
use crate::config::Config;
use crate::errors::{CameraError, CameraResult};
use crate::pipelines::photo::ImageSaver;
use crate::pipelines::video::Recorder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared, stateless collaborators every pipeline may use
#[derive(Clone)]
pub struct Collaborators {
    pub devices: DeviceLifecycleManager,
    pub sessions: CaptureSessionManager,
    pub auto_focus: ConvergenceWaiter,
    pub auto_exposure: ConvergenceWaiter,
    pub display: Arc<dyn DisplaySurfaceProvider>,
    pub saver: Arc<dyn ImageSaver>,
    pub callback: Arc<dyn CameraCallback>,
    pub config: Arc<Config>,
}

impl Collaborators {
    /// Build the camera managers over `service` and bundle the UI side
    pub fn new(
        service: Arc<dyn CameraService>,
        display: Arc<dyn DisplaySurfaceProvider>,
        saver: Arc<dyn ImageSaver>,
        callback: Arc<dyn CameraCallback>,
        config: Config,
    ) -> Self {
        let timeout = config.converge_timeout();
        Self {
            devices: DeviceLifecycleManager::new(Arc::clone(&service)),
            sessions: CaptureSessionManager::new(Arc::clone(&service)),
            auto_focus: ConvergenceWaiter::auto_focus(Arc::clone(&service), timeout),
            auto_exposure: ConvergenceWaiter::auto_exposure(service, timeout),
            display,
            saver,
            callback,
            config: Arc::new(config),
        }
    }
}

/// Camera resources of the current session
pub struct SessionContext {
    pub params: Option<SessionParameters>,
    pub device: Option<OpenDevice>,
    pub session: Option<LiveSession>,
    /// Display surface the preview is bound to
    pub preview: Option<PreviewSurface>,
    pub recorder: Box<dyn Recorder>,
    /// Output file of the recording in progress
    pub recording: Option<PathBuf>,
    /// Surface handed out by the configured recorder
    pub recorder_surface: Option<OutputSurface>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("device", &self.params.as_ref().map(|p| &p.device_id))
            .field("device_open", &self.device.is_some())
            .field("session", &self.session)
            .field("preview", &self.preview)
            .field("recorder", &self.recorder.state())
            .field("recording", &self.recording)
            .finish()
    }
}

impl SessionContext {
    pub fn new(recorder: Box<dyn Recorder>) -> Self {
        Self {
            params: None,
            device: None,
            session: None,
            preview: None,
            recorder,
            recording: None,
            recorder_surface: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Anything that [`release_all`](Self::release_all) would have to undo
    pub fn holds_resources(&self) -> bool {
        self.device.is_some()
            || self.session.is_some()
            || self.preview.is_some()
            || self.recorder_surface.is_some()
    }

    pub fn params(&self) -> CameraResult<&SessionParameters> {
        self.params.as_ref().ok_or(CameraError::NoCameraFound)
    }

    pub fn session(&self) -> CameraResult<&LiveSession> {
        self.session
            .as_ref()
            .ok_or_else(|| CameraError::CaptureFailed("no capture session".to_string()))
    }

    /// Open the device named by the current parameters
    pub async fn open_device(&mut self, parts: &Collaborators) -> CameraResult<()> {
        let id = self.params()?.device_id.clone();
        let device = parts.devices.open(&id).await?;
        self.device = Some(device);
        Ok(())
    }

    /// Configure a session over the preview surface, plus the recorder
    /// surface when `recording`
    pub async fn configure(
        &mut self,
        parts: &Collaborators,
        surface: PreviewSurface,
        recording: bool,
    ) -> CameraResult<()> {
        let params = self.params()?.clone();
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| CameraError::DeviceError(format!("{} is not open", params.device_id)))?;

        let preview = OutputSurface {
            id: surface.id,
            kind: SurfaceKind::Preview,
            size: params.preview_size,
        };
        let surfaces: SurfaceSet = if recording {
            let recorder = self.recorder_surface.clone().ok_or_else(|| {
                CameraError::SessionConfigureFailed("recorder surface missing".to_string())
            })?;
            params.video_surfaces(preview, recorder)
        } else {
            params.photo_surfaces(preview)
        };

        let session = parts.sessions.create_session(device, surfaces).await?;
        parts.display.bind_preview(&surface, params.preview_size);
        self.preview = Some(surface);
        parts.callback.on_session_configured(session.surfaces());
        self.session = Some(session);
        Ok(())
    }

    /// Install the repeating preview (or record) request
    pub async fn start_preview(&mut self, parts: &Collaborators) -> CameraResult<()> {
        let recording = self.is_recording();
        let request = self.params()?.requests().preview(recording);
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CameraError::CaptureFailed("no capture session".to_string()))?;
        parts.sessions.start_preview(session, request).await?;
        debug!(recording, "Preview running");
        Ok(())
    }

    /// Resolves with the first fault the driver reports on the held device
    /// or session
    ///
    /// Device faults win over session faults reported at the same time.
    /// Never resolves while neither is held.
    pub async fn hardware_fault(&mut self) -> CameraError {
        let Self {
            device, session, ..
        } = self;
        let device = async move {
            match device {
                Some(device) => device.next_fault().await,
                None => std::future::pending().await,
            }
        };
        let session = async move {
            match session {
                Some(session) => session.next_fault().await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            error = device => error,
            error = session => error,
        }
    }

    pub async fn close_session(&mut self, parts: &Collaborators) {
        if let Some(mut session) = self.session.take() {
            parts.sessions.close_session(&mut session).await;
            parts.callback.on_session_closed();
        }
    }

    pub async fn close_device(&mut self, parts: &Collaborators) {
        if let Some(mut device) = self.device.take() {
            parts.devices.close(&mut device).await;
        }
    }

    /// Release every resource in order: session, device, preview binding,
    /// recorder
    ///
    /// Never fails; a recording in progress is abandoned without a callback.
    pub async fn release_all(&mut self, parts: &Collaborators) {
        if !self.holds_resources() && !self.is_recording() {
            return;
        }
        info!("Releasing camera resources");
        self.close_session(parts).await;
        self.close_device(parts).await;
        if let Some(preview) = self.preview.take() {
            parts.display.release(&preview);
        }
        if self.recording.take().is_some() || self.recorder_surface.is_some() {
            if let Err(error) = self.recorder.stop().await {
                warn!(%error, "Abandoned recording");
            }
        }
        self.recorder.reset();
        self.recorder_surface = None;
    }
}
