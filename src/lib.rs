// SPDX-License-Identifier: GPL-3.0-only

//! Camera Orchestrator - capture session coordination for stateful cameras
//!
//! This library sequences a single camera device through open, configure,
//! preview, converge, capture, record and teardown, over either a modern
//! (per-frame metadata) or a legacy (blocking, single object) camera API.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: Intent dispatcher, pipelines and UI-facing callbacks
//! - [`backends`]: Camera service abstraction, device/session managers and
//!   the convergence waiter
//! - [`pipelines`]: Photo saving and video recorder collaborators
//! - [`config`]: User configuration handling
//! - [`storage`]: Output directories and file naming
//!
//! # Example
//!
//! ```ignore
//! let (handle, task) = Orchestrator::spawn(parts, Box::new(VirtualRecorder::new()));
//! handle.create();
//! handle.resume();
//! handle.intent(CaptureIntent::TakePhoto);
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use app::{
    CaptureIntent, Collaborators, Orchestrator, OrchestratorHandle, SessionStatus, StateSnapshot,
    UiEvent,
};
pub use config::Config;
pub use constants::BitratePreset;
pub use errors::{CameraError, CameraResult, ErrorKind};
