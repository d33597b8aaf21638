// SPDX-License-Identifier: GPL-3.0-only

//! Host lifecycle and display surface handlers
//!
//! Create, resume, pause and destroy, plus the surface notifications that
//! decide when the open pipeline may run.

use crate::app::context::{Collaborators, SessionContext};
use crate::app::display::PreviewSurface;
use crate::app::pipeline::{PipelineJob, PipelineResult};
use crate::app::state::{Lifecycle, Orchestrator, SessionStatus};
use crate::backends::camera::strategy::choose_default_camera;
use crate::backends::camera::{SessionParameters, Size};
use crate::errors::CameraError;
use tracing::{debug, info};

/// View assumed before any display surface has been reported
const FALLBACK_VIEW: Size = Size::new(1080, 1920);

impl Orchestrator {
    // =========================================================================
    // Lifecycle Handlers
    // =========================================================================

    pub(crate) fn handle_create(&mut self) {
        if self.lifecycle != Lifecycle::Uninitialized {
            debug!(lifecycle = ?self.lifecycle, "Create ignored");
            return;
        }
        info!("Creating camera dispatcher");
        self.lifecycle = Lifecycle::Created;
        let view = self.surface.or_else(|| self.parts.display.available_surface());
        self.start_pipeline(PipelineJob::Create { view }, SessionStatus::Closed);
    }

    pub(crate) fn handle_resume(&mut self) {
        if !matches!(self.lifecycle, Lifecycle::Created | Lifecycle::Paused) {
            debug!(lifecycle = ?self.lifecycle, "Resume ignored");
            return;
        }
        info!("Resumed");
        self.lifecycle = Lifecycle::Resumed;
        // Warm resume: the surface may already be there
        self.open_if_ready();
    }

    pub(crate) fn handle_pause(&mut self) {
        if self.lifecycle != Lifecycle::Resumed {
            debug!(lifecycle = ?self.lifecycle, "Pause ignored");
            return;
        }
        info!("Paused");
        self.lifecycle = Lifecycle::Paused;
        self.teardown_if_open();
    }

    pub(crate) fn handle_destroy(&mut self) {
        if self.lifecycle != Lifecycle::Destroyed {
            info!("Destroying camera dispatcher");
            self.lifecycle = Lifecycle::Destroyed;
            self.teardown_if_open();
        }
        self.stopped = true;
    }

    // =========================================================================
    // Display Surface Handlers
    // =========================================================================

    pub(crate) fn handle_surface_available(&mut self, surface: PreviewSurface) {
        debug!(surface = %surface.id, size = %surface.size, "Surface available");
        self.surface = Some(surface);
        self.open_if_ready();
    }

    pub(crate) fn handle_surface_size_changed(&mut self, surface: PreviewSurface) {
        debug!(surface = %surface.id, size = %surface.size, "Surface size changed");
        self.surface = Some(surface);
        let Some(ctx) = self.slot.as_mut() else {
            return;
        };
        let Some(preview_size) = ctx.params.as_ref().map(|p| p.preview_size) else {
            return;
        };
        if ctx.preview.is_some_and(|bound| bound.id == surface.id) {
            ctx.preview = Some(surface);
            self.parts.display.bind_preview(&surface, preview_size);
        }
    }

    pub(crate) fn handle_surface_destroyed(&mut self) {
        debug!("Surface destroyed");
        self.surface = None;
    }

    /// Start the open pipeline once resumed, closed, configured and a
    /// surface exists
    fn open_if_ready(&mut self) {
        if self.lifecycle != Lifecycle::Resumed || self.status != SessionStatus::Closed {
            return;
        }
        if !self.slot.as_ref().is_some_and(|ctx| ctx.params.is_some()) {
            debug!("No camera selected yet");
            return;
        }
        let Some(surface) = self.surface.or_else(|| self.parts.display.available_surface()) else {
            debug!("Waiting for a display surface");
            return;
        };
        self.surface = Some(surface);
        self.start_pipeline(PipelineJob::Open { surface }, SessionStatus::Opening);
    }

    fn teardown_if_open(&mut self) {
        let holds = self
            .slot
            .as_ref()
            .is_some_and(|ctx| ctx.holds_resources() || ctx.is_recording());
        if holds || self.status != SessionStatus::Closed {
            self.start_pipeline(PipelineJob::Teardown, SessionStatus::Transitioning);
        }
    }
}

// =============================================================================
// Lifecycle Pipelines
// =============================================================================

/// Resolve the default camera and negotiate its parameters
pub(crate) async fn create(
    ctx: &mut SessionContext,
    parts: &Collaborators,
    view: Option<PreviewSurface>,
) -> PipelineResult<SessionStatus> {
    let cameras = parts.devices.all_characteristics().await?;
    let facing = parts.config.preferred_facing;
    let id = choose_default_camera(&cameras, facing).ok_or(CameraError::NoCameraFound)?;
    let characteristics = cameras
        .into_iter()
        .find(|c| c.id == id)
        .ok_or(CameraError::NoCameraFound)?;

    let view = view.map(|s| s.size).unwrap_or(FALLBACK_VIEW);
    info!(device = %id, ?facing, %view, "Selected default camera");
    ctx.params = Some(SessionParameters::negotiate(characteristics, view)?);
    Ok(SessionStatus::Closed)
}

/// Release everything; never cancelled and never fails
pub(crate) async fn teardown(
    ctx: &mut SessionContext,
    parts: &Collaborators,
) -> PipelineResult<SessionStatus> {
    ctx.release_all(parts).await;
    Ok(SessionStatus::Closed)
}
