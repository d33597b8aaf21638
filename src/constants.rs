// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recorder bitrate presets
///
/// The recorder derives its target bitrate from the preset and the negotiated
/// video size, so a switch to a smaller camera doesn't keep a 4K bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Smaller files, reduced quality
    Low,
    /// Balanced quality and file size
    #[default]
    Medium,
    /// Larger files, better quality
    High,
}

impl BitratePreset {
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Target bitrate in kbps for a video of the given width
    ///
    /// | tier    | Low    | Medium | High   |
    /// |---------|--------|--------|--------|
    /// | SD      | 1      | 2      | 4      |
    /// | 720p    | 2.5    | 5      | 10     |
    /// | 1080p   | 4      | 8      | 16     |
    /// | 2K      | 8      | 16     | 32     |
    /// | 4K      | 15     | 30     | 50     |
    pub fn bitrate_kbps(&self, width: u32) -> u32 {
        let (low, medium, high) = match ResolutionTier::for_width(width) {
            ResolutionTier::SD => (1_000, 2_000, 4_000),
            ResolutionTier::HD => (2_500, 5_000, 10_000),
            ResolutionTier::FullHD => (4_000, 8_000, 16_000),
            ResolutionTier::TwoK => (8_000, 16_000, 32_000),
            ResolutionTier::FourK => (15_000, 30_000, 50_000),
        };
        match self {
            BitratePreset::Low => low,
            BitratePreset::Medium => medium,
            BitratePreset::High => high,
        }
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    SD,
    HD,
    FullHD,
    TwoK,
    FourK,
}

impl ResolutionTier {
    pub fn for_width(width: u32) -> Self {
        match width {
            w if w >= 3840 => ResolutionTier::FourK,
            w if w >= 2560 => ResolutionTier::TwoK,
            w if w >= 1920 => ResolutionTier::FullHD,
            w if w >= 1280 => ResolutionTier::HD,
            _ => ResolutionTier::SD,
        }
    }
}

/// Format bitrate for display (e.g., "8 Mbps" or "2.5 Mbps")
pub fn format_bitrate(kbps: u32) -> String {
    let mbps = kbps as f64 / 1000.0;
    if mbps == mbps.floor() {
        format!("{} Mbps", mbps as u32)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// Size limits used when negotiating stream sizes
pub mod sizes {
    /// Largest still image edge the strategy will pick
    pub const MAX_STILL_IMAGE_WIDTH: u32 = 1920;
    pub const MAX_STILL_IMAGE_HEIGHT: u32 = 1920;

    /// Recorders reject anything wider than this for 4:3 video
    pub const MAX_VIDEO_WIDTH: u32 = 1080;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Deadline for auto-focus / auto-exposure convergence
    pub const CONVERGE_TIMEOUT: Duration = Duration::from_secs(3);

    /// Frame period of the virtual rig's repeating request (~30 fps)
    pub const VIRTUAL_FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;
}

/// Recorder defaults
pub mod recording {
    pub const DEFAULT_FRAMERATE: u32 = 30;
    pub const VIDEO_EXTENSION: &str = "mp4";
    pub const PHOTO_EXTENSION: &str = "jpg";
}

/// Application information utilities
pub mod app_info {
    /// Application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Directory name used under the user's config dir
    pub const CONFIG_DIR_NAME: &str = "camera-orchestrator";
}
