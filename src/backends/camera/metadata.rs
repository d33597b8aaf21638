// SPDX-License-Identifier: GPL-3.0-only

//! Capture request / result metadata keys and their enumerated values
//!
//! Values are plain `i32`s, exactly as the hardware reports them. The
//! convergence waiter is generic over key and ready set, so keeping them
//! untyped here avoids one enum per key.

use serde::{Deserialize, Serialize};

/// Metadata keys understood by both adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetadataKey {
    ControlMode,
    CaptureIntent,
    AfMode,
    AfTrigger,
    AfState,
    AeMode,
    AePrecaptureTrigger,
    AeState,
    AwbMode,
    JpegOrientation,
}

pub mod control_mode {
    pub const OFF: i32 = 0;
    pub const AUTO: i32 = 1;
}

pub mod capture_intent {
    pub const PREVIEW: i32 = 1;
    pub const STILL_CAPTURE: i32 = 2;
    pub const VIDEO_RECORD: i32 = 3;
}

pub mod af_mode {
    pub const OFF: i32 = 0;
    pub const AUTO: i32 = 1;
    pub const CONTINUOUS_VIDEO: i32 = 3;
    pub const CONTINUOUS_PICTURE: i32 = 4;
}

pub mod af_trigger {
    pub const IDLE: i32 = 0;
    pub const START: i32 = 1;
    pub const CANCEL: i32 = 2;
}

pub mod af_state {
    pub const INACTIVE: i32 = 0;
    pub const PASSIVE_SCAN: i32 = 1;
    pub const PASSIVE_FOCUSED: i32 = 2;
    pub const ACTIVE_SCAN: i32 = 3;
    pub const FOCUSED_LOCKED: i32 = 4;
    pub const NOT_FOCUSED_LOCKED: i32 = 5;
    pub const PASSIVE_UNFOCUSED: i32 = 6;

    /// States in which a still capture can proceed
    pub const READY: &[i32] = &[INACTIVE, PASSIVE_FOCUSED, FOCUSED_LOCKED, NOT_FOCUSED_LOCKED];
}

pub mod ae_mode {
    pub const OFF: i32 = 0;
    pub const ON: i32 = 1;
    pub const ON_AUTO_FLASH: i32 = 2;
    pub const ON_ALWAYS_FLASH: i32 = 3;
}

pub mod ae_precapture_trigger {
    pub const IDLE: i32 = 0;
    pub const START: i32 = 1;
}

pub mod ae_state {
    pub const INACTIVE: i32 = 0;
    pub const SEARCHING: i32 = 1;
    pub const CONVERGED: i32 = 2;
    pub const LOCKED: i32 = 3;
    pub const FLASH_REQUIRED: i32 = 4;
    pub const PRECAPTURE: i32 = 5;

    /// States in which a still capture can proceed
    pub const READY: &[i32] = &[INACTIVE, FLASH_REQUIRED, CONVERGED, LOCKED];
}

pub mod awb_mode {
    pub const OFF: i32 = 0;
    pub const AUTO: i32 = 1;
}
