// SPDX-License-Identifier: GPL-3.0-only

//! Video recording handlers
//!
//! Starting or stopping a recording changes the session's surface set, so
//! both directions close the session and create a new one.

use crate::app::context::{Collaborators, SessionContext};
use crate::app::pipeline::{CancelToken, PipelineJob, PipelineResult};
use crate::app::state::{Lifecycle, Orchestrator, SessionStatus};
use crate::backends::camera::orientation::recorder_orientation_hint;
use crate::errors::{CameraError, CameraResult, RecorderError};
use crate::pipelines::video::RecorderConfig;
use crate::storage;
use chrono::Local;
use tracing::{debug, info, warn};

impl Orchestrator {
    // =========================================================================
    // Recording Handlers
    // =========================================================================

    pub(crate) fn handle_start_video(&mut self) {
        match self.status {
            SessionStatus::Recording => debug!("Already recording"),
            SessionStatus::PreviewOnly if self.lifecycle == Lifecycle::Resumed => {
                self.start_pipeline(PipelineJob::StartVideo, SessionStatus::Transitioning);
            }
            status => debug!(?status, "Start video ignored"),
        }
    }

    pub(crate) fn handle_stop_video(&mut self) {
        if self.status != SessionStatus::Recording {
            debug!(status = ?self.status, "Not recording");
            return;
        }
        self.start_pipeline(PipelineJob::StopVideo, SessionStatus::Transitioning);
    }
}

// =============================================================================
// Recording Pipelines
// =============================================================================

fn missing_preview() -> CameraError {
    CameraError::SessionConfigureFailed("no preview surface bound".to_string())
}

/// Recreate the session with the recorder surface and start recording
pub(crate) async fn start_video(
    ctx: &mut SessionContext,
    parts: &Collaborators,
    cancel: &CancelToken,
) -> PipelineResult<SessionStatus> {
    let surface = ctx.preview.ok_or_else(missing_preview)?;
    let params = ctx.params()?.clone();

    ctx.close_session(parts).await;
    cancel.checkpoint()?;

    let output = storage::video_path(&parts.config, Local::now());
    let hint = recorder_orientation_hint(parts.display.rotation(), params.sensor_orientation);
    let config = RecorderConfig::new(
        output.clone(),
        params.video_size,
        parts.config.video_framerate,
        parts.config.bitrate_preset,
        hint,
        parts.config.record_audio,
    );
    let recorder_surface = ctx.recorder.configure(config).map_err(CameraError::from)?;
    ctx.recorder_surface = Some(recorder_surface);

    ctx.configure(parts, surface, true).await?;
    cancel.checkpoint()?;

    ctx.recording = Some(output);
    ctx.start_preview(parts).await?;
    ctx.recorder.start().map_err(CameraError::from)?;

    info!(path = ?ctx.recording, "Recording started");
    Ok(SessionStatus::Recording)
}

/// Finish the recording and return to a photo session
pub(crate) async fn stop_video(
    ctx: &mut SessionContext,
    parts: &Collaborators,
    cancel: &CancelToken,
) -> PipelineResult<SessionStatus> {
    let surface = ctx.preview.ok_or_else(missing_preview)?;

    finalize_recording(ctx, parts).await?;
    cancel.checkpoint()?;

    ctx.configure(parts, surface, false).await?;
    cancel.checkpoint()?;
    ctx.start_preview(parts).await?;
    Ok(SessionStatus::PreviewOnly)
}

/// Close the recording session, then stop and reset the recorder
///
/// An empty recording is reported as a message, not an error.
pub(crate) async fn finalize_recording(
    ctx: &mut SessionContext,
    parts: &Collaborators,
) -> CameraResult<()> {
    ctx.close_session(parts).await;
    ctx.recording = None;
    ctx.recorder_surface = None;

    let stopped = ctx.recorder.stop().await;
    ctx.recorder.reset();
    match stopped {
        Ok(path) => {
            info!(path = %path.display(), "Video saved");
            parts.callback.on_video_saved(&path);
            Ok(())
        }
        Err(RecorderError::EmptyRecording) => {
            warn!("Recording stopped without frames");
            parts.callback.on_message("Empty video");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}
