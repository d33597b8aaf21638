// SPDX-License-Identifier: GPL-3.0-only

//! Message handler modules
//!
//! This module organizes message handlers by functional domain. Each module
//! holds the `Orchestrator` handlers that decide whether a transition may
//! run, and the pipeline functions that perform it.

pub mod camera;
pub mod capture;
pub mod error;
pub mod lifecycle;
pub mod recording;
