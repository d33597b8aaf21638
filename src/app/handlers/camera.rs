// SPDX-License-Identifier: GPL-3.0-only

//! Camera open and switch handlers

use super::recording::finalize_recording;
use crate::app::context::{Collaborators, SessionContext};
use crate::app::display::PreviewSurface;
use crate::app::pipeline::{CancelToken, PipelineJob, PipelineResult};
use crate::app::state::{Lifecycle, Orchestrator, SessionStatus};
use crate::backends::camera::SessionParameters;
use crate::backends::camera::strategy::choose_switch_camera;
use crate::errors::CameraError;
use tracing::{debug, info};

impl Orchestrator {
    // =========================================================================
    // Camera Selection Handlers
    // =========================================================================

    pub(crate) fn handle_switch_camera(&mut self) {
        if self.lifecycle != Lifecycle::Resumed
            || !matches!(
                self.status,
                SessionStatus::PreviewOnly | SessionStatus::Recording
            )
        {
            debug!(status = ?self.status, "Switch camera ignored");
            return;
        }
        let surface = self.surface;
        self.start_pipeline(
            PipelineJob::SwitchCamera { surface },
            SessionStatus::Transitioning,
        );
    }
}

// =============================================================================
// Camera Pipelines
// =============================================================================

/// Open the selected device and start the preview on `surface`
///
/// Renegotiates the stream sizes first when the surface's size differs from
/// the view the parameters were built for.
pub(crate) async fn open_preview(
    ctx: &mut SessionContext,
    parts: &Collaborators,
    cancel: &CancelToken,
    surface: PreviewSurface,
) -> PipelineResult<SessionStatus> {
    let params = ctx.params()?;
    if params.view != surface.size {
        debug!(from = %params.view, to = %surface.size, "View changed; renegotiating");
        let characteristics = params.characteristics.clone();
        ctx.params = Some(SessionParameters::negotiate(characteristics, surface.size)?);
    }

    ctx.open_device(parts).await?;
    cancel.checkpoint()?;
    ctx.configure(parts, surface, false).await?;
    cancel.checkpoint()?;
    ctx.start_preview(parts).await?;

    info!(device = %ctx.params()?.device_id, "Preview started");
    Ok(SessionStatus::PreviewOnly)
}

/// Stop recording if needed, close the current camera and open the one with
/// the other facing
pub(crate) async fn switch_camera(
    ctx: &mut SessionContext,
    parts: &Collaborators,
    cancel: &CancelToken,
    surface: Option<PreviewSurface>,
) -> PipelineResult<SessionStatus> {
    if ctx.is_recording() {
        finalize_recording(ctx, parts).await?;
    }
    ctx.close_session(parts).await;
    ctx.close_device(parts).await;
    cancel.checkpoint()?;

    let current = ctx.params()?;
    let facing = current.facing;
    let view = surface.map(|s| s.size).unwrap_or(current.view);

    let cameras = parts.devices.all_characteristics().await?;
    let id = choose_switch_camera(&cameras, facing).ok_or(CameraError::NoCameraFound)?;
    let characteristics = cameras
        .into_iter()
        .find(|c| c.id == id)
        .ok_or(CameraError::NoCameraFound)?;
    info!(from = ?facing, to = ?characteristics.facing, device = %id, "Switching camera");
    ctx.params = Some(SessionParameters::negotiate(characteristics, view)?);
    cancel.checkpoint()?;

    match surface {
        Some(surface) => open_preview(ctx, parts, cancel, surface).await,
        None => {
            if let Some(preview) = ctx.preview.take() {
                parts.display.release(&preview);
            }
            debug!("No display surface; camera stays closed");
            Ok(SessionStatus::Closed)
        }
    }
}
