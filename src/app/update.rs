// SPDX-License-Identifier: GPL-3.0-only

//! Message update handling
//!
//! This module routes dispatcher messages to focused handler methods. The
//! main `update()` function acts as a dispatcher, while specific handlers are
//! implemented in the `handlers` submodules organized by functional domain.
//!
//! # Serialization
//!
//! At most one pipeline runs at a time. While one is running:
//! - capture intents are ignored, not queued
//! - `Pause` and `Destroy` cancel it and are handled once it has unwound
//! - everything else waits in the deferred queue

use super::context::SessionContext;
use super::pipeline::{self, PipelineJob, PipelineKind, PipelineOutcome, cancel_pair};
use super::state::{
    ActivePipeline, CaptureIntent, ContextSummary, Message, Orchestrator, SessionStatus,
};
use crate::errors::ErrorKind;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

impl Orchestrator {
    /// Main message handler - routes messages to appropriate handler methods.
    pub fn update(&mut self, message: Message) {
        if let Message::Snapshot(reply) = message {
            let _ = reply.send(self.snapshot());
            return;
        }
        if self.is_busy() {
            self.defer(message);
            return;
        }

        match message {
            // ===== Capture intents =====
            Message::Intent(CaptureIntent::TakePhoto) => self.handle_take_photo(),
            Message::Intent(CaptureIntent::StartVideo) => self.handle_start_video(),
            Message::Intent(CaptureIntent::StopVideo) => self.handle_stop_video(),
            Message::Intent(CaptureIntent::SwitchCamera) => self.handle_switch_camera(),

            // ===== Host lifecycle =====
            Message::Intent(CaptureIntent::Pause) => self.handle_pause(),
            Message::Intent(CaptureIntent::Resume) => self.handle_resume(),
            Message::Create => self.handle_create(),
            Message::Destroy => self.handle_destroy(),

            // ===== Display surface =====
            Message::SurfaceAvailable(surface) => self.handle_surface_available(surface),
            Message::SurfaceSizeChanged(surface) => self.handle_surface_size_changed(surface),
            Message::SurfaceDestroyed => self.handle_surface_destroyed(),

            // ===== Driver =====
            Message::HardwareFault(error) => self.handle_hardware_fault(error),

            // ===== Diagnostics =====
            Message::Settled(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Message::Snapshot(_) => {}
        }
    }

    fn defer(&mut self, message: Message) {
        match &message {
            Message::Intent(intent) if intent.is_capture() => {
                info!(?intent, "Pipeline running; intent ignored");
                return;
            }
            Message::Intent(CaptureIntent::Pause) | Message::Destroy => self.cancel_active(),
            _ => {}
        }
        debug!(?message, "Deferred");
        self.deferred.push_back(message);
    }

    /// Request cancellation of the running pipeline; teardown and release
    /// are never cancelled
    fn cancel_active(&mut self) {
        if let Some(active) = &self.active
            && !matches!(active.kind, PipelineKind::Teardown | PipelineKind::Release)
        {
            info!(kind = ?active.kind, "Cancelling pipeline");
            active.cancel.cancel();
        }
    }

    /// Hand the context to a new pipeline task
    pub(crate) fn start_pipeline(&mut self, job: PipelineJob, status: SessionStatus) {
        let kind = job.kind();
        let Some(ctx) = self.slot.take() else {
            warn!(?kind, "Session context not available");
            return;
        };
        self.last_context = ContextSummary::of(&ctx);

        let (cancel, token) = cancel_pair();
        let parts = self.parts.clone();
        let task = tokio::spawn(pipeline::run(job, ctx, parts, token));

        debug!(?kind, from = ?self.status, to = ?status, "Session status");
        self.status = status;
        self.active = Some(ActivePipeline { kind, cancel, task });
    }

    fn restore(&mut self, ctx: SessionContext) {
        self.last_context = ContextSummary::of(&ctx);
        self.slot = Some(ctx);
    }

    /// Take back the context from a finished pipeline
    pub(crate) fn handle_pipeline_finished(&mut self, result: Result<PipelineOutcome, JoinError>) {
        let kind = self.active.take().map(|active| active.kind);
        match result {
            Ok(PipelineOutcome::Completed { ctx, status }) => {
                debug!(?kind, ?status, "Session status");
                self.restore(ctx);
                self.status = status;
            }
            Ok(PipelineOutcome::Cancelled { ctx }) => {
                self.restore(ctx);
                self.status = SessionStatus::Closed;
            }
            Ok(PipelineOutcome::Failed { ctx, error }) => {
                self.restore(ctx);
                self.on_error(error);
            }
            Err(join_error) => {
                // The context died with the task; nothing left to drive
                error!(?kind, %join_error, "Pipeline task aborted");
                self.status = SessionStatus::Closed;
                self.parts
                    .callback
                    .on_error(ErrorKind::Generic, &join_error.to_string());
                self.stopped = true;
                return;
            }
        }
        self.drain_deferred();
    }

    fn drain_deferred(&mut self) {
        while !self.is_busy() {
            let Some(message) = self.deferred.pop_front() else {
                break;
            };
            self.update(message);
        }
    }
}
