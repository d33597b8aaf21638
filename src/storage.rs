// SPDX-License-Identifier: GPL-3.0-only

//! Storage utilities for naming photo and video files

use crate::config::Config;
use crate::constants::recording::{PHOTO_EXTENSION, VIDEO_EXTENSION};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Subdirectory created under the user's Pictures / Videos folders
const APP_SUBDIR: &str = "camera";

/// Default photo directory (`~/Pictures/camera`)
pub fn default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_SUBDIR)
}

/// Default video directory (`~/Videos/camera`)
pub fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_SUBDIR)
}

pub fn photo_dir(config: &Config) -> PathBuf {
    config.photo_dir.clone().unwrap_or_else(default_photo_dir)
}

pub fn video_dir(config: &Config) -> PathBuf {
    config.video_dir.clone().unwrap_or_else(default_video_dir)
}

fn timestamped(dir: &Path, prefix: &str, at: DateTime<Local>, extension: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", prefix, at.format("%Y%m%d_%H%M%S"), extension))
}

/// `photo_YYYYMMDD_HHMMSS.jpg` in the configured photo directory
pub fn photo_path(config: &Config, at: DateTime<Local>) -> PathBuf {
    timestamped(&photo_dir(config), "photo", at, PHOTO_EXTENSION)
}

/// `video_YYYYMMDD_HHMMSS.mp4` in the configured video directory
pub fn video_path(config: &Config, at: DateTime<Local>) -> PathBuf {
    timestamped(&video_dir(config), "video", at, VIDEO_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_paths_use_timestamp_and_overrides() {
        let config = Config {
            photo_dir: Some(PathBuf::from("/tmp/shots")),
            video_dir: Some(PathBuf::from("/tmp/clips")),
            ..Config::default()
        };
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            photo_path(&config, at),
            PathBuf::from("/tmp/shots/photo_20240309_140507.jpg")
        );
        assert_eq!(
            video_path(&config, at),
            PathBuf::from("/tmp/clips/video_20240309_140507.mp4")
        );
    }

    #[test]
    fn test_default_dirs_end_in_app_subdir() {
        assert!(default_photo_dir().ends_with(APP_SUBDIR));
        assert!(default_video_dir().ends_with(APP_SUBDIR));
    }
}
