// SPDX-License-Identifier: GPL-3.0-only

//! Still capture handlers
//!
//! Focus, then exposure, then one still capture, then save. The focus lock
//! is released and the preview request re-issued before the image is saved.

use crate::app::context::{Collaborators, SessionContext};
use crate::app::pipeline::{CancelToken, PipelineError, PipelineJob, PipelineResult};
use crate::app::state::{Lifecycle, Orchestrator, SessionStatus};
use crate::backends::camera::metadata::{MetadataKey, af_trigger};
use crate::backends::camera::orientation::jpeg_orientation;
use crate::backends::camera::SurfaceKind;
use crate::storage;
use chrono::Local;
use tracing::{debug, info};

impl Orchestrator {
    // =========================================================================
    // Capture Operations Handlers
    // =========================================================================

    pub(crate) fn handle_take_photo(&mut self) {
        if self.lifecycle != Lifecycle::Resumed || !self.status.can_take_photo() {
            debug!(status = ?self.status, "Take photo ignored");
            return;
        }
        let has_still = self
            .slot
            .as_ref()
            .and_then(|ctx| ctx.session.as_ref())
            .is_some_and(|session| session.surfaces().contains(SurfaceKind::Still));
        if !has_still {
            debug!("Session has no still surface");
            return;
        }
        let resume = self.status;
        self.start_pipeline(PipelineJob::TakePhoto { resume }, SessionStatus::Capturing);
    }
}

// =============================================================================
// Capture Pipelines
// =============================================================================

/// Converge 3A, capture a still and save it
///
/// Returns `resume`, the status the session was in before the capture.
pub(crate) async fn take_photo(
    ctx: &mut SessionContext,
    parts: &Collaborators,
    cancel: &CancelToken,
    resume: SessionStatus,
) -> PipelineResult<SessionStatus> {
    let params = ctx.params()?.clone();
    let requests = params.requests();
    let preview = requests.preview(ctx.is_recording());
    let handle = ctx.session()?.handle().clone();

    // The focus indicator is cleared whether or not 3A settles
    parts.callback.on_focus_started();
    let settled = async {
        let focus = cancel
            .run(parts.auto_focus.wait_for_converge(&handle, &preview))
            .await?;
        let exposure = cancel
            .run(parts.auto_exposure.wait_for_converge(&handle, &preview))
            .await?;
        Ok::<_, PipelineError>((focus, exposure))
    }
    .await;
    parts.callback.on_focus_finished();
    let (focus, exposure) = settled?;
    debug!(?focus, ?exposure, "3A settled");

    let orientation = jpeg_orientation(parts.display.rotation(), params.sensor_orientation);
    let image = cancel
        .run(
            parts
                .sessions
                .capture_still(ctx.session()?, requests.still(orientation)),
        )
        .await?;

    // Release the focus lock and restore the plain repeating request
    let unlock = preview.with(MetadataKey::AfTrigger, af_trigger::CANCEL);
    let _unlocked = parts.devices.service().capture(&handle, unlock).await?;
    ctx.start_preview(parts).await?;

    let path = storage::photo_path(&parts.config, Local::now());
    let saved = cancel.run(parts.saver.save(&image, &path)).await?;
    info!(path = %saved.display(), size = %image.size, orientation, "Photo captured");
    parts.callback.on_photo_saved(&saved);
    Ok(resume)
}
