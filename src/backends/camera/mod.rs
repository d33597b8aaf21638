// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! The orchestrator is written once against [`CameraService`], the capability
//! interface every hardware API is adapted to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │   Intent Dispatcher      │
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │ DeviceLifecycleManager   │  ← open / close, one event stream per handle
//! │ CaptureSessionManager    │  ← configure / ordered close
//! │ ConvergenceWaiter        │  ← AF / AE trigger-then-poll
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │   CameraService trait    │  ← common interface
//! └─────┬──────────────┬─────┘
//!       ▼              ▼
//!  ┌─────────┐   ┌───────────┐
//!  │ Modern  │   │  Legacy   │  ← concrete adapters
//!  └─────────┘   └───────────┘
//! ```
//!
//! All `CameraService` calls return quickly; completion is reported through
//! the returned event streams, which are fed from driver threads.

pub mod converge;
pub mod legacy;
pub mod manager;
pub mod metadata;
pub mod modern;
pub mod orientation;
pub mod params;
pub mod requests;
pub mod session;
pub mod strategy;
pub mod types;
pub mod virtual_rig;

pub use converge::{Convergence, ConvergenceWaiter};
pub use manager::{DeviceLifecycleManager, DeviceState, OpenDevice};
pub use params::SessionParameters;
pub use session::{CaptureSessionManager, LiveSession, SessionState};
pub use types::*;
pub use virtual_rig::VirtualRig;

use crate::errors::CameraResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Capability interface over a camera hardware API
#[async_trait]
pub trait CameraService: Send + Sync {
    /// Which hardware API this adapter speaks
    fn backend_type(&self) -> CameraBackendType;

    /// Identifiers of all cameras, in driver order
    async fn list_devices(&self) -> CameraResult<Vec<DeviceId>>;

    /// Static characteristics of one camera
    async fn characteristics(&self, id: &DeviceId) -> CameraResult<CameraCharacteristics>;

    /// Request a device open
    ///
    /// Unknown identifiers fail immediately with `DeviceUnavailable`. Every
    /// other outcome, including the later `Closed`, arrives on the stream.
    async fn open_device(&self, id: &DeviceId) -> CameraResult<DeviceEvents>;

    /// Request a device close; `Closed` arrives on the device's stream
    async fn close_device(&self, device: &DeviceHandle) -> CameraResult<()>;

    /// Request a session over `surfaces`; the outcome arrives on the stream
    async fn create_session(
        &self,
        device: &DeviceHandle,
        surfaces: &SurfaceSet,
    ) -> CameraResult<SessionEvents>;

    /// Submit one capture request; its single result arrives on the stream
    async fn capture(
        &self,
        session: &SessionHandle,
        request: CaptureRequest,
    ) -> CameraResult<CaptureEvents>;

    /// Replace the repeating request; every frame's result arrives on the stream
    ///
    /// Dropping the stream does not stop the repeating request.
    async fn set_repeating(
        &self,
        session: &SessionHandle,
        request: CaptureRequest,
    ) -> CameraResult<CaptureEvents>;

    async fn stop_repeating(&self, session: &SessionHandle) -> CameraResult<()>;

    /// Discard in-flight single captures
    async fn abort_captures(&self, session: &SessionHandle) -> CameraResult<()>;

    /// Request a session close; `Closed` arrives on the session's stream
    async fn close_session(&self, session: &SessionHandle) -> CameraResult<()>;
}

/// Build the adapter for `backend_type` on top of a virtual rig
pub fn get_virtual_backend(
    backend_type: CameraBackendType,
    rig: VirtualRig,
) -> Arc<dyn CameraService> {
    match backend_type {
        CameraBackendType::Modern => Arc::new(modern::ModernCameraService::new(rig)),
        CameraBackendType::Legacy => Arc::new(legacy::LegacyAdapter::new(
            legacy::VirtualLegacyCamera::new(rig),
        )),
    }
}
