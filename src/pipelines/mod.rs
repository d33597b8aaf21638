// SPDX-License-Identifier: GPL-3.0-only

//! Output pipelines for photo and video capture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Still image  │ ──▶ │   Image saver     │ ──▶ │  JPEG file   │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Record frame │ ──▶ │     Recorder      │ ──▶ │   MP4 file   │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`photo`]: Persisting encoded still images
//! - [`video`]: The recorder resource and its parameters

pub mod photo;
pub mod video;
