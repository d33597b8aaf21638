// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Taking photos
//! - Recording videos
//! - Running scripted intent sequences
//!
//! Every command drives the dispatcher against the in-process virtual rig.

use camera_orchestrator::app::{
    CaptureIntent, ChannelCallback, Collaborators, Orchestrator, OrchestratorHandle, UiEvent,
    VirtualDisplay,
};
use camera_orchestrator::backends::camera::{
    CameraBackendType, DeviceLifecycleManager, Facing, Size, VirtualRig, get_virtual_backend,
};
use camera_orchestrator::config::Config;
use camera_orchestrator::pipelines::photo::FileImageSaver;
use camera_orchestrator::pipelines::video::VirtualRecorder;
use camera_orchestrator::{SessionStatus, StateSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Portrait phone display
const DISPLAY_SIZE: Size = Size::new(1080, 1920);

fn load_config(backend: Option<CameraBackendType>) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    if let Some(backend) = backend {
        config.backend = backend;
    }
    Ok(config)
}

/// A dispatcher running against a fresh virtual phone
struct Harness {
    handle: OrchestratorHandle,
    task: JoinHandle<()>,
    events: mpsc::UnboundedReceiver<UiEvent>,
}

impl Harness {
    fn start(config: Config) -> Self {
        let service = get_virtual_backend(config.backend, VirtualRig::phone());
        let display = Arc::new(VirtualDisplay::new());
        display.attach(DISPLAY_SIZE);
        let (callback, events) = ChannelCallback::new();
        let parts = Collaborators::new(
            service,
            display,
            Arc::new(FileImageSaver),
            Arc::new(callback),
            config,
        );
        let (handle, task) = Orchestrator::spawn(parts, Box::new(VirtualRecorder::new()));
        handle.create();
        handle.resume();
        Self {
            handle,
            task,
            events,
        }
    }

    /// Wait until idle, print the events seen so far
    async fn settle(&mut self) -> Result<StateSnapshot, Box<dyn std::error::Error>> {
        let snapshot = self
            .handle
            .settled()
            .await
            .ok_or("dispatcher stopped unexpectedly")?;
        self.print_pending();
        Ok(snapshot)
    }

    fn print_pending(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            println!("  {}", event);
        }
    }

    /// Print events until one matches `done`
    async fn wait_for(&mut self, done: impl Fn(&UiEvent) -> bool) -> Option<UiEvent> {
        while let Some(event) = self.events.recv().await {
            println!("  {}", event);
            if done(&event) || matches!(event, UiEvent::Error { .. }) {
                return Some(event);
            }
        }
        None
    }

    async fn require_preview(&mut self) -> CliResult {
        let snapshot = self.settle().await?;
        if snapshot.status != SessionStatus::PreviewOnly {
            return Err(format!("camera did not start ({:?})", snapshot.status).into());
        }
        Ok(())
    }

    async fn shutdown(mut self) -> CliResult {
        self.handle.destroy();
        (&mut self.task).await?;
        self.print_pending();
        Ok(())
    }
}

/// List all available cameras
pub async fn list_cameras(backend: Option<CameraBackendType>) -> CliResult {
    let config = load_config(backend)?;
    let service = get_virtual_backend(config.backend, VirtualRig::phone());
    let devices = DeviceLifecycleManager::new(service);

    println!("Available cameras ({} backend):", config.backend);
    println!();
    for camera in devices.all_characteristics().await? {
        let facing = camera
            .facing
            .map(|f| f.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("  [{}] {} camera, sensor {}", camera.id, facing, camera.sensor_orientation);
        if let Some(streams) = &camera.stream_configuration {
            let sizes: Vec<String> = streams
                .still_sizes
                .iter()
                .take(3)
                .map(|s| s.to_string())
                .collect();
            println!("      Still sizes: {}", sizes.join(", "));
        }
        if camera.is_fixed_focus() {
            println!("      Fixed focus");
        }
        println!();
    }
    Ok(())
}

/// Take a photo with the default (or front) camera
pub async fn take_photo(backend: Option<CameraBackendType>, front: bool) -> CliResult {
    let mut config = load_config(backend)?;
    if front {
        config.preferred_facing = Facing::Front;
    }

    let mut harness = Harness::start(config);
    harness.require_preview().await?;

    println!("Capturing...");
    harness.handle.intent(CaptureIntent::TakePhoto);
    let outcome = harness
        .wait_for(|e| matches!(e, UiEvent::PhotoSaved(_)))
        .await;
    harness.shutdown().await?;

    match outcome {
        Some(UiEvent::PhotoSaved(path)) => {
            println!("Photo saved to: {}", path.display());
            Ok(())
        }
        Some(UiEvent::Error { kind, detail }) => Err(format!("{}: {}", kind, detail).into()),
        _ => Err("photo was not saved".into()),
    }
}

/// Record a video for `duration` seconds; Ctrl+C stops early
pub async fn record_video(
    backend: Option<CameraBackendType>,
    duration: u64,
    front: bool,
) -> CliResult {
    let mut config = load_config(backend)?;
    if front {
        config.preferred_facing = Facing::Front;
    }

    // Set up Ctrl+C handler
    let stop = Arc::new(Notify::new());
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || stop_handler.notify_one())?;

    let mut harness = Harness::start(config);
    harness.require_preview().await?;

    harness.handle.intent(CaptureIntent::StartVideo);
    let snapshot = harness.settle().await?;
    if snapshot.status != SessionStatus::Recording {
        harness.shutdown().await?;
        return Err("recording did not start".into());
    }

    println!("Recording for {} seconds (Ctrl+C to stop)...", duration);
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(duration)) => {}
        _ = stop.notified() => println!("Stopping early"),
    }

    harness.handle.intent(CaptureIntent::StopVideo);
    let outcome = harness
        .wait_for(|e| matches!(e, UiEvent::VideoSaved(_) | UiEvent::Message(_)))
        .await;
    harness.shutdown().await?;

    match outcome {
        Some(UiEvent::VideoSaved(path)) => {
            println!("Video saved to: {}", path.display());
            Ok(())
        }
        Some(UiEvent::Message(text)) => Err(text.into()),
        Some(UiEvent::Error { kind, detail }) => Err(format!("{}: {}", kind, detail).into()),
        _ => Err("video was not saved".into()),
    }
}

/// One step of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Intent(CaptureIntent),
    Wait(Duration),
}

fn parse_step(step: &str) -> Result<Step, String> {
    let step = step.trim().to_ascii_lowercase();
    if let Some(ms) = step.strip_prefix("wait=") {
        let ms: u64 = ms
            .parse()
            .map_err(|_| format!("invalid wait duration '{}'", ms))?;
        return Ok(Step::Wait(Duration::from_millis(ms)));
    }
    let intent = match step.as_str() {
        "photo" => CaptureIntent::TakePhoto,
        "start" => CaptureIntent::StartVideo,
        "stop" => CaptureIntent::StopVideo,
        "switch" => CaptureIntent::SwitchCamera,
        "pause" => CaptureIntent::Pause,
        "resume" => CaptureIntent::Resume,
        other => return Err(format!("unknown step '{}'", other)),
    };
    Ok(Step::Intent(intent))
}

/// Run `steps` in order, waiting for the dispatcher to settle after each
pub async fn run_script(backend: Option<CameraBackendType>, steps: &[String]) -> CliResult {
    let steps = steps
        .iter()
        .map(|s| parse_step(s))
        .collect::<Result<Vec<_>, _>>()?;
    let config = load_config(backend)?;

    let mut harness = Harness::start(config);
    println!("start");
    harness.settle().await?;

    for step in steps {
        match step {
            Step::Intent(intent) => {
                println!("{:?}", intent);
                harness.handle.intent(intent);
            }
            Step::Wait(duration) => {
                println!("wait {} ms", duration.as_millis());
                tokio::time::sleep(duration).await;
            }
        }
        let snapshot = harness.settle().await?;
        println!(
            "  -> {:?} / {:?} ({})",
            snapshot.lifecycle,
            snapshot.status,
            snapshot
                .facing
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no camera".to_string())
        );
    }

    harness.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        assert_eq!(
            parse_step("Photo"),
            Ok(Step::Intent(CaptureIntent::TakePhoto))
        );
        assert_eq!(
            parse_step("wait=250"),
            Ok(Step::Wait(Duration::from_millis(250)))
        );
        assert!(parse_step("wait=soon").is_err());
        assert!(parse_step("zoom").is_err());
    }
}
