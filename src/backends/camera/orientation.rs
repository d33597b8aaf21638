// SPDX-License-Identifier: GPL-3.0-only

//! JPEG orientation and recorder orientation hints

use super::types::SensorRotation;
use serde::{Deserialize, Serialize};

/// Rotation of the display from its natural orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    pub fn degrees(&self) -> u32 {
        match self {
            DisplayRotation::Rotation0 => 0,
            DisplayRotation::Rotation90 => 90,
            DisplayRotation::Rotation180 => 180,
            DisplayRotation::Rotation270 => 270,
        }
    }

    fn default_orientation(&self) -> u32 {
        match self {
            DisplayRotation::Rotation0 => 90,
            DisplayRotation::Rotation90 => 0,
            DisplayRotation::Rotation180 => 270,
            DisplayRotation::Rotation270 => 180,
        }
    }

    fn inverse_orientation(&self) -> u32 {
        match self {
            DisplayRotation::Rotation0 => 270,
            DisplayRotation::Rotation90 => 180,
            DisplayRotation::Rotation180 => 90,
            DisplayRotation::Rotation270 => 0,
        }
    }
}

/// Orientation to tag still images with
pub fn jpeg_orientation(rotation: DisplayRotation, sensor: SensorRotation) -> u32 {
    (rotation.default_orientation() + sensor.degrees() + 270) % 360
}

/// Orientation hint for the recorder, `None` for unusual sensor mounts
pub fn recorder_orientation_hint(rotation: DisplayRotation, sensor: SensorRotation) -> Option<u32> {
    match sensor {
        SensorRotation::Rotate90 => Some(rotation.default_orientation()),
        SensorRotation::Rotate270 => Some(rotation.inverse_orientation()),
        SensorRotation::None | SensorRotation::Rotate180 => None,
    }
}
