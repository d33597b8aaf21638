// SPDX-License-Identifier: GPL-3.0-only

//! Recorder resource and the in-process virtual recorder

use crate::backends::camera::types::{OutputSurface, Size, SurfaceKind};
use crate::constants::BitratePreset;
use crate::errors::RecorderError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Parameters a recorder is configured with
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    pub output_path: PathBuf,
    pub size: Size,
    pub framerate: u32,
    pub bitrate_kbps: u32,
    /// Rotation players should apply, if the sensor mount is known
    pub orientation_hint: Option<u32>,
    pub audio: bool,
}

impl RecorderConfig {
    /// Derive the bitrate from `preset` and the video size
    pub fn new(
        output_path: PathBuf,
        size: Size,
        framerate: u32,
        preset: BitratePreset,
        orientation_hint: Option<u32>,
        audio: bool,
    ) -> Self {
        Self {
            output_path,
            size,
            framerate,
            bitrate_kbps: preset.bitrate_kbps(size.width),
            orientation_hint,
            audio,
        }
    }
}

/// Where the recorder is in its call sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    Configured,
    Recording,
    /// Stopped; `reset` must run before the next `configure`
    Stopped,
}

/// Video recorder resource
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Prepare a recording and return the surface the camera must feed
    fn configure(&mut self, config: RecorderConfig) -> Result<OutputSurface, RecorderError>;

    fn start(&mut self) -> Result<(), RecorderError>;

    /// Finish the recording and return the written file
    ///
    /// Fails with `EmptyRecording` when no frame was recorded.
    async fn stop(&mut self) -> Result<PathBuf, RecorderError>;

    /// Return to `Idle` from any state
    fn reset(&mut self);

    fn state(&self) -> RecorderState;
}

/// Recorder that "records" by timing the session and writes a stub file
///
/// A recording shorter than one frame is empty, matching hardware encoders
/// that fail to finalize a file without samples.
#[derive(Debug)]
pub struct VirtualRecorder {
    state: RecorderState,
    config: Option<RecorderConfig>,
    started_at: Option<Instant>,
}

impl Default for VirtualRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualRecorder {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
            config: None,
            started_at: None,
        }
    }

    fn frame_period(config: &RecorderConfig) -> Duration {
        Duration::from_secs(1) / config.framerate.max(1)
    }
}

#[async_trait]
impl Recorder for VirtualRecorder {
    fn configure(&mut self, config: RecorderConfig) -> Result<OutputSurface, RecorderError> {
        match self.state {
            RecorderState::Idle | RecorderState::Configured => {}
            RecorderState::Recording => return Err(RecorderError::AlreadyRecording),
            RecorderState::Stopped => return Err(RecorderError::NeedsReset),
        }
        if config.size.width == 0 || config.size.height == 0 || config.framerate == 0 {
            return Err(RecorderError::InvalidParameters(format!(
                "{} @ {} fps",
                config.size, config.framerate
            )));
        }

        info!(
            output = %config.output_path.display(),
            size = %config.size,
            framerate = config.framerate,
            bitrate_kbps = config.bitrate_kbps,
            orientation = ?config.orientation_hint,
            audio = config.audio,
            "Configuring recorder"
        );
        let surface = OutputSurface::new(SurfaceKind::Recording, config.size);
        self.config = Some(config);
        self.state = RecorderState::Configured;
        Ok(surface)
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        match self.state {
            RecorderState::Configured => {
                info!("Starting video recording");
                self.started_at = Some(Instant::now());
                self.state = RecorderState::Recording;
                Ok(())
            }
            RecorderState::Recording => Err(RecorderError::AlreadyRecording),
            RecorderState::Idle => Err(RecorderError::NotConfigured),
            RecorderState::Stopped => Err(RecorderError::NeedsReset),
        }
    }

    async fn stop(&mut self) -> Result<PathBuf, RecorderError> {
        let (Some(config), Some(started_at)) = (self.config.as_ref(), self.started_at.take()) else {
            self.state = RecorderState::Stopped;
            return Err(RecorderError::EmptyRecording);
        };
        self.state = RecorderState::Stopped;

        let elapsed = started_at.elapsed();
        let frames = elapsed.as_nanos() / Self::frame_period(config).as_nanos().max(1);
        info!(frames = frames as u64, elapsed_ms = elapsed.as_millis() as u64, "Stopping video recording");
        if frames == 0 {
            warn!("Recording stopped before the first frame");
            return Err(RecorderError::EmptyRecording);
        }

        if let Some(parent) = config.output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RecorderError::InvalidParameters(e.to_string()))?;
        }
        let mut stub = b"\0\0\0\x18ftypmp42".to_vec();
        stub.extend_from_slice(&(frames as u32).to_be_bytes());
        tokio::fs::write(&config.output_path, stub)
            .await
            .map_err(|e| RecorderError::InvalidParameters(e.to_string()))?;

        info!(path = %config.output_path.display(), "Recording saved");
        Ok(config.output_path.clone())
    }

    fn reset(&mut self) {
        debug!(state = ?self.state, "Resetting recorder");
        self.state = RecorderState::Idle;
        self.config = None;
        self.started_at = None;
    }

    fn state(&self) -> RecorderState {
        self.state
    }
}
