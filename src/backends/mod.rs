// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera hardware
//!
//! # Architecture
//!
//! The backend layer abstracts hardware access, providing a consistent API
//! regardless of the underlying camera API:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Orchestrator                  │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌─────────────┐    ┌──────────────────┐    │
//! │  │   Modern    │    │     Legacy       │    │
//! │  │  (per-frame │    │  (blocking,      │    │
//! │  │   metadata) │    │   index based)   │    │
//! │  └─────────────┘    └──────────────────┘    │
//! │           ┌──────────────────┐              │
//! │           │   Virtual rig    │              │
//! │           └──────────────────┘              │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Capability trait, adapters, lifecycle and session managers

pub mod camera;
