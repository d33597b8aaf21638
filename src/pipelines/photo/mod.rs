// SPDX-License-Identifier: GPL-3.0-only

//! Photo output
//!
//! Still images arrive already encoded from the camera; this stage only
//! writes them out.

pub mod saver;

pub use saver::{FileImageSaver, ImageSaver};
