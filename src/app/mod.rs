// SPDX-License-Identifier: GPL-3.0-only

//! Intent dispatcher for the camera orchestrator
//!
//! This module contains the dispatcher state, message handling and the
//! pipelines that drive the camera through open, preview, capture, record
//! and teardown.
//!
//! # Architecture
//!
//! - `state`: Dispatcher state types (Orchestrator, Message, Lifecycle, etc.)
//! - `update`: Message routing and pipeline bookkeeping
//! - `handlers`: Per-domain handlers and the pipelines they start
//! - `pipeline`: Pipeline jobs, outcomes and cancellation
//! - `context`: The session context moved through pipelines
//! - `callback`: Result callbacks towards the UI
//! - `display`: Display surface provider
//!
//! # Main Types
//!
//! - `Orchestrator`: Dispatcher model, owned by its task
//! - `OrchestratorHandle`: Cloneable sender side used by the host
//! - `Message`: Intents, lifecycle and surface notifications

pub mod callback;
pub mod context;
pub mod display;
mod handlers;
pub mod pipeline;
mod state;
mod update;

pub use callback::{CameraCallback, ChannelCallback, UiEvent};
pub use context::{Collaborators, SessionContext};
pub use display::{DisplaySurfaceProvider, PreviewSurface, VirtualDisplay};
pub use pipeline::PipelineKind;
pub use state::{CaptureIntent, Lifecycle, Message, Orchestrator, SessionStatus, StateSnapshot};

use crate::errors::CameraError;
use crate::pipelines::video::Recorder;
use pipeline::PipelineOutcome;
use state::ActivePipeline;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info};

/// Sender side of a running dispatcher
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl OrchestratorHandle {
    /// Queue a message; `false` once the dispatcher has stopped
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn intent(&self, intent: CaptureIntent) -> bool {
        self.send(Message::Intent(intent))
    }

    pub fn create(&self) -> bool {
        self.send(Message::Create)
    }

    pub fn resume(&self) -> bool {
        self.intent(CaptureIntent::Resume)
    }

    pub fn pause(&self) -> bool {
        self.intent(CaptureIntent::Pause)
    }

    pub fn destroy(&self) -> bool {
        self.send(Message::Destroy)
    }

    pub fn surface_available(&self, surface: PreviewSurface) -> bool {
        self.send(Message::SurfaceAvailable(surface))
    }

    pub fn surface_size_changed(&self, surface: PreviewSurface) -> bool {
        self.send(Message::SurfaceSizeChanged(surface))
    }

    pub fn surface_destroyed(&self) -> bool {
        self.send(Message::SurfaceDestroyed)
    }

    /// Current state, without waiting for a running pipeline
    pub async fn snapshot(&self) -> Option<StateSnapshot> {
        let (reply, response) = oneshot::channel();
        if !self.send(Message::Snapshot(reply)) {
            return None;
        }
        response.await.ok()
    }

    /// State after every message sent so far has been handled
    pub async fn settled(&self) -> Option<StateSnapshot> {
        let (reply, response) = oneshot::channel();
        if !self.send(Message::Settled(reply)) {
            return None;
        }
        response.await.ok()
    }
}

impl Orchestrator {
    /// Start the dispatcher task
    ///
    /// The task ends after `Destroy` (or after every handle is dropped) once
    /// teardown has finished.
    pub fn spawn(
        parts: Collaborators,
        recorder: Box<dyn Recorder>,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let (sender, inbox) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(parts, SessionContext::new(recorder));
        let task = tokio::spawn(orchestrator.run(inbox));
        (OrchestratorHandle { sender }, task)
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Message>) {
        info!(backend = %self.parts.devices.backend_type(), "Dispatcher started");
        let mut inbox_closed = false;

        while !(self.stopped && self.active.is_none()) {
            tokio::select! {
                outcome = finished(&mut self.active) => self.handle_pipeline_finished(outcome),
                error = hardware_fault(&mut self.slot) => self.update(Message::HardwareFault(error)),
                message = inbox.recv(), if !inbox_closed => match message {
                    Some(message) => self.update(message),
                    None => {
                        debug!("All handles dropped");
                        inbox_closed = true;
                        self.update(Message::Destroy);
                    }
                },
            }
        }

        info!("Dispatcher stopped");
    }
}

/// Resolves when the idle session context reports a driver fault
///
/// Never resolves while a pipeline owns the context.
async fn hardware_fault(slot: &mut Option<SessionContext>) -> CameraError {
    match slot {
        Some(ctx) => ctx.hardware_fault().await,
        None => std::future::pending().await,
    }
}

/// Resolves when the running pipeline finishes; never without one
async fn finished(active: &mut Option<ActivePipeline>) -> Result<PipelineOutcome, JoinError> {
    match active {
        Some(active) => (&mut active.task).await,
        None => std::future::pending().await,
    }
}
