// SPDX-License-Identifier: GPL-3.0-only

//! Ordered, cancellable pipelines
//!
//! A pipeline is one multi-step hardware sequence (open, photo, switch, ...).
//! It runs as its own task, owns the [`SessionContext`] while it runs and
//! hands it back in its [`PipelineOutcome`].
//!
//! Cancellation is checked between hardware steps. A step that changes
//! hardware state (open, configure, close) always runs to completion so its
//! result can be released; waits (convergence, capture, save) are abandoned
//! as soon as cancellation is requested.

use super::context::{Collaborators, SessionContext};
use super::display::PreviewSurface;
use super::handlers;
use super::state::SessionStatus;
use crate::errors::{CameraError, CameraResult};
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Which pipeline is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Create,
    Open,
    TakePhoto,
    StartVideo,
    StopVideo,
    SwitchCamera,
    Teardown,
    /// Release after a hardware fault reported while idle
    Release,
}

impl PipelineKind {
    /// Whether the pipeline is one of the capture intents
    pub fn is_capture(&self) -> bool {
        matches!(
            self,
            PipelineKind::TakePhoto
                | PipelineKind::StartVideo
                | PipelineKind::StopVideo
                | PipelineKind::SwitchCamera
        )
    }
}

/// A pipeline together with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineJob {
    Create { view: Option<PreviewSurface> },
    Open { surface: PreviewSurface },
    TakePhoto { resume: SessionStatus },
    StartVideo,
    StopVideo,
    SwitchCamera { surface: Option<PreviewSurface> },
    Teardown,
    Release { error: CameraError },
}

impl PipelineJob {
    pub fn kind(&self) -> PipelineKind {
        match self {
            PipelineJob::Create { .. } => PipelineKind::Create,
            PipelineJob::Open { .. } => PipelineKind::Open,
            PipelineJob::TakePhoto { .. } => PipelineKind::TakePhoto,
            PipelineJob::StartVideo => PipelineKind::StartVideo,
            PipelineJob::StopVideo => PipelineKind::StopVideo,
            PipelineJob::SwitchCamera { .. } => PipelineKind::SwitchCamera,
            PipelineJob::Teardown => PipelineKind::Teardown,
            PipelineJob::Release { .. } => PipelineKind::Release,
        }
    }
}

/// How a pipeline ended; the context always comes back
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed {
        ctx: SessionContext,
        status: SessionStatus,
    },
    Cancelled {
        ctx: SessionContext,
    },
    Failed {
        ctx: SessionContext,
        error: CameraError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    Cancelled,
    Failed(CameraError),
}

impl From<CameraError> for PipelineError {
    fn from(error: CameraError) -> Self {
        PipelineError::Failed(error)
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Requests cancellation of one pipeline
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even with every token dropped
        self.0.send_replace(true);
    }
}

/// Observes cancellation; a dropped [`CancelHandle`] counts as cancelled
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Fail with `Cancelled` if cancellation was requested
    pub fn checkpoint(&self) -> PipelineResult<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Run an abandonable step, racing it against cancellation
    pub async fn run<T>(&self, step: impl Future<Output = CameraResult<T>>) -> PipelineResult<T> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(PipelineError::Cancelled),
            result = step => result.map_err(PipelineError::from),
        }
    }
}

/// Run `job` to completion and hand the context back
///
/// A cancelled or failed pipeline releases every resource before returning.
pub async fn run(
    job: PipelineJob,
    mut ctx: SessionContext,
    parts: Collaborators,
    cancel: CancelToken,
) -> PipelineOutcome {
    let kind = job.kind();
    debug!(?kind, "Pipeline started");

    let result = match job {
        PipelineJob::Create { view } => handlers::lifecycle::create(&mut ctx, &parts, view).await,
        PipelineJob::Open { surface } => {
            handlers::camera::open_preview(&mut ctx, &parts, &cancel, surface).await
        }
        PipelineJob::TakePhoto { resume } => {
            handlers::capture::take_photo(&mut ctx, &parts, &cancel, resume).await
        }
        PipelineJob::StartVideo => handlers::recording::start_video(&mut ctx, &parts, &cancel).await,
        PipelineJob::StopVideo => handlers::recording::stop_video(&mut ctx, &parts, &cancel).await,
        PipelineJob::SwitchCamera { surface } => {
            handlers::camera::switch_camera(&mut ctx, &parts, &cancel, surface).await
        }
        PipelineJob::Teardown => handlers::lifecycle::teardown(&mut ctx, &parts).await,
        // The failure path below releases everything and reports the fault
        PipelineJob::Release { error } => Err(PipelineError::Failed(error)),
    };

    match result {
        Ok(status) => {
            debug!(?kind, ?status, "Pipeline completed");
            PipelineOutcome::Completed { ctx, status }
        }
        Err(PipelineError::Cancelled) => {
            info!(?kind, "Pipeline cancelled");
            ctx.release_all(&parts).await;
            PipelineOutcome::Cancelled { ctx }
        }
        Err(PipelineError::Failed(error)) => {
            warn!(?kind, %error, "Pipeline failed");
            ctx.release_all(&parts).await;
            PipelineOutcome::Failed { ctx, error }
        }
    }
}
