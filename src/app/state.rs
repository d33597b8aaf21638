// SPDX-License-Identifier: GPL-3.0-only

//! Dispatcher state management

use super::context::{Collaborators, SessionContext};
use super::display::PreviewSurface;
use super::pipeline::{CancelHandle, PipelineKind, PipelineOutcome};
use crate::backends::camera::{DeviceId, Facing, SurfaceKind};
use crate::errors::CameraError;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Host lifecycle as seen by the dispatcher
///
/// `Uninitialized -> Created -> (Resumed <-> Paused) -> Destroyed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Created,
    Resumed,
    Paused,
    Destroyed,
}

/// Camera session status nested inside the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No device open
    #[default]
    Closed,
    /// Device open and session configuration in progress
    Opening,
    PreviewOnly,
    /// Still capture in progress
    Capturing,
    Recording,
    /// Session being rebuilt (video start/stop, camera switch, teardown)
    Transitioning,
}

impl SessionStatus {
    /// Statuses in which a still capture is allowed
    pub fn can_take_photo(&self) -> bool {
        matches!(self, SessionStatus::PreviewOnly | SessionStatus::Recording)
    }
}

/// User and lifecycle intents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureIntent {
    TakePhoto,
    StartVideo,
    StopVideo,
    SwitchCamera,
    Pause,
    Resume,
}

impl CaptureIntent {
    /// Intents that drive the camera rather than the host lifecycle
    pub fn is_capture(&self) -> bool {
        !matches!(self, CaptureIntent::Pause | CaptureIntent::Resume)
    }
}

/// Messages handled by the dispatcher loop
#[derive(Debug)]
pub enum Message {
    Intent(CaptureIntent),

    // ===== Host lifecycle =====
    Create,
    Destroy,

    // ===== Display surface =====
    SurfaceAvailable(PreviewSurface),
    SurfaceSizeChanged(PreviewSurface),
    SurfaceDestroyed,

    // ===== Driver =====
    /// The idle device or session reported a fault
    HardwareFault(CameraError),

    // ===== Diagnostics =====
    /// Answered immediately, even while a pipeline runs
    Snapshot(oneshot::Sender<StateSnapshot>),
    /// Answered once every earlier message has been handled and no
    /// pipeline is running
    Settled(oneshot::Sender<StateSnapshot>),
}

/// Observable dispatcher state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub lifecycle: Lifecycle,
    pub status: SessionStatus,
    pub facing: Option<Facing>,
    pub device_id: Option<DeviceId>,
    pub device_open: bool,
    pub session_open: bool,
    /// Surface kinds of the live session
    pub surfaces: Option<Vec<SurfaceKind>>,
    pub recording: bool,
    pub preview_bound: bool,
    /// Pipeline running when the snapshot was taken
    pub pipeline: Option<PipelineKind>,
}

/// Pipeline task in flight
pub struct ActivePipeline {
    pub kind: PipelineKind,
    pub cancel: CancelHandle,
    pub task: JoinHandle<PipelineOutcome>,
}

/// The dispatcher model
///
/// Owned by the dispatcher task; nothing else mutates it.
pub struct Orchestrator {
    pub lifecycle: Lifecycle,
    pub status: SessionStatus,
    /// `None` while a pipeline owns the context
    pub slot: Option<SessionContext>,
    pub active: Option<ActivePipeline>,
    /// Messages that arrived while a pipeline was running
    pub deferred: VecDeque<Message>,
    /// Last display surface reported available
    pub surface: Option<PreviewSurface>,
    pub parts: Collaborators,
    /// Set once the loop should exit
    pub stopped: bool,
    /// Last snapshot taken while the context was home
    pub(crate) last_context: ContextSummary,
}

/// Parts of [`StateSnapshot`] read from the session context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContextSummary {
    pub facing: Option<Facing>,
    pub device_id: Option<DeviceId>,
    pub device_open: bool,
    pub session_open: bool,
    pub surfaces: Option<Vec<SurfaceKind>>,
    pub recording: bool,
    pub preview_bound: bool,
}

impl ContextSummary {
    pub fn of(ctx: &SessionContext) -> Self {
        Self {
            facing: ctx.params.as_ref().and_then(|p| p.facing),
            device_id: ctx.params.as_ref().map(|p| p.device_id.clone()),
            device_open: ctx.device.is_some(),
            session_open: ctx.session.is_some(),
            surfaces: ctx.session.as_ref().map(|s| s.surfaces().kinds()),
            recording: ctx.is_recording(),
            preview_bound: ctx.preview.is_some(),
        }
    }
}

impl Orchestrator {
    pub fn new(parts: Collaborators, ctx: SessionContext) -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            status: SessionStatus::Closed,
            slot: Some(ctx),
            active: None,
            deferred: VecDeque::new(),
            surface: None,
            parts,
            stopped: false,
            last_context: ContextSummary::default(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        // While a pipeline owns the context, report what it was handed
        let summary = self
            .slot
            .as_ref()
            .map(ContextSummary::of)
            .unwrap_or_else(|| self.last_context.clone());
        StateSnapshot {
            lifecycle: self.lifecycle,
            status: self.status,
            facing: summary.facing,
            device_id: summary.device_id,
            device_open: summary.device_open,
            session_open: summary.session_open,
            surfaces: summary.surfaces,
            recording: summary.recording,
            preview_bound: summary.preview_bound,
            pipeline: self.active.as_ref().map(|a| a.kind),
        }
    }
}
