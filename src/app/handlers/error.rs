// SPDX-License-Identifier: GPL-3.0-only

//! The single error sink

use crate::app::pipeline::PipelineJob;
use crate::app::state::{Message, Orchestrator, SessionStatus};
use crate::errors::CameraError;
use tracing::{error, info, warn};

impl Orchestrator {
    /// Handle any error a pipeline reported
    ///
    /// The failed pipeline has already released the device and session.
    /// Queued capture intents are dropped, then the error is classified and
    /// forwarded to the UI.
    pub(crate) fn on_error(&mut self, error: CameraError) {
        let before = self.deferred.len();
        self.deferred
            .retain(|message| !matches!(message, Message::Intent(intent) if intent.is_capture()));
        let dropped = before - self.deferred.len();
        if dropped > 0 {
            info!(dropped, "Dropped queued intents after error");
        }

        self.status = SessionStatus::Closed;
        let kind = error.kind();
        error!(?kind, %error, "Camera error");
        self.parts.callback.on_error(kind, &error.to_string());
    }

    /// A device or session failed while no pipeline was running
    ///
    /// The release pipeline frees everything and hands the error back to
    /// [`on_error`](Self::on_error).
    pub(crate) fn handle_hardware_fault(&mut self, error: CameraError) {
        warn!(%error, status = ?self.status, "Hardware fault");
        self.start_pipeline(PipelineJob::Release { error }, SessionStatus::Transitioning);
    }
}
