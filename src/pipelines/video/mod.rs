// SPDX-License-Identifier: GPL-3.0-only

//! Video recording resource
//!
//! The recorder is a stateful resource with a strict call order:
//! `configure -> start -> stop -> reset`, and `reset` before configuring
//! again. Its input surface joins the capture session's surface set while a
//! recording runs.

pub mod recorder;

pub use recorder::{Recorder, RecorderConfig, RecorderState, VirtualRecorder};
