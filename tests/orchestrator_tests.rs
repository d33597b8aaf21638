// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the intent dispatcher against the virtual rig

use camera_orchestrator::app::{
    CaptureIntent, ChannelCallback, Collaborators, DisplaySurfaceProvider, Lifecycle, Orchestrator,
    OrchestratorHandle, PreviewSurface, SessionStatus, StateSnapshot, UiEvent, VirtualDisplay,
};
use camera_orchestrator::backends::camera::virtual_rig::{
    ConvergenceBehavior, HardwareCall, VirtualDeviceSpec,
};
use camera_orchestrator::backends::camera::{
    CameraBackendType, DeviceFault, DeviceId, Facing, Size, SurfaceKind, VirtualRig,
    get_virtual_backend,
};
use camera_orchestrator::config::Config;
use camera_orchestrator::constants::timing::CONVERGE_TIMEOUT;
use camera_orchestrator::errors::ErrorKind;
use camera_orchestrator::pipelines::photo::FileImageSaver;
use camera_orchestrator::pipelines::video::VirtualRecorder;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const VIEW: Size = Size::new(1080, 1920);

struct Fixture {
    rig: VirtualRig,
    display: Arc<VirtualDisplay>,
    handle: OrchestratorHandle,
    task: JoinHandle<()>,
    events: UnboundedReceiver<UiEvent>,
    dir: TempDir,
}

impl Fixture {
    fn spawn(rig: VirtualRig, backend: CameraBackendType) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            backend,
            photo_dir: Some(dir.path().join("photos")),
            video_dir: Some(dir.path().join("videos")),
            ..Config::default()
        };
        let display = Arc::new(VirtualDisplay::new());
        let (callback, events) = ChannelCallback::new();
        let parts = Collaborators::new(
            get_virtual_backend(backend, rig.clone()),
            display.clone(),
            Arc::new(FileImageSaver),
            Arc::new(callback),
            config,
        );
        let (handle, task) = Orchestrator::spawn(parts, Box::new(VirtualRecorder::new()));
        Self {
            rig,
            display,
            handle,
            task,
            events,
            dir,
        }
    }

    /// Surface attached before resume, then create + resume
    async fn previewing(rig: VirtualRig, backend: CameraBackendType) -> Self {
        let mut fixture = Self::spawn(rig, backend);
        fixture.display.attach(VIEW);
        fixture.handle.create();
        fixture.handle.resume();
        let snapshot = fixture.settled().await;
        assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
        fixture.drain();
        fixture
    }

    async fn phone() -> Self {
        Self::previewing(VirtualRig::phone(), CameraBackendType::Modern).await
    }

    async fn settled(&self) -> StateSnapshot {
        self.handle.settled().await.unwrap()
    }

    async fn send(&self, intent: CaptureIntent) -> StateSnapshot {
        self.handle.intent(intent);
        self.settled().await
    }

    fn drain(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn errors(events: &[UiEvent]) -> Vec<ErrorKind> {
        events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Error { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    fn assert_released(&self) {
        let stats = self.rig.stats();
        assert_eq!(stats.open_devices, 0, "device left open");
        assert_eq!(stats.live_sessions, 0, "session left open");
    }
}

fn photo_kinds() -> Option<Vec<SurfaceKind>> {
    Some(vec![SurfaceKind::Preview, SurfaceKind::Still])
}

fn video_kinds() -> Option<Vec<SurfaceKind>> {
    Some(vec![
        SurfaceKind::Preview,
        SurfaceKind::Still,
        SurfaceKind::Recording,
    ])
}

#[tokio::test(start_paused = true)]
async fn test_warm_resume_configures_without_surface_notification() {
    let mut fixture = Fixture::spawn(VirtualRig::phone(), CameraBackendType::Modern);
    fixture.display.attach(VIEW);
    fixture.handle.create();
    fixture.handle.resume();

    let snapshot = fixture.settled().await;
    assert_eq!(snapshot.lifecycle, Lifecycle::Resumed);
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    assert_eq!(snapshot.facing, Some(Facing::Back));
    assert_eq!(snapshot.surfaces, photo_kinds());
    assert!(snapshot.preview_bound);
    assert!(fixture.display.bound().is_some());

    let events = fixture.drain();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, UiEvent::SessionConfigured(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_cold_resume_waits_for_surface() {
    let fixture = Fixture::spawn(VirtualRig::phone(), CameraBackendType::Modern);
    fixture.handle.create();
    fixture.handle.resume();

    let snapshot = fixture.settled().await;
    assert_eq!(snapshot.status, SessionStatus::Closed);
    assert!(!snapshot.device_open);
    assert_eq!(fixture.rig.stats().open_devices, 0);

    let surface = fixture.display.attach(VIEW);
    fixture.handle.surface_available(surface);
    let snapshot = fixture.settled().await;
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    assert_eq!(fixture.rig.stats().open_devices, 1);
}

#[tokio::test(start_paused = true)]
async fn test_take_photo_saves_image() {
    let mut fixture = Fixture::phone().await;

    let snapshot = fixture.send(CaptureIntent::TakePhoto).await;
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);

    let events = fixture.drain();
    let saved = events.iter().find_map(|e| match e {
        UiEvent::PhotoSaved(path) => Some(path.clone()),
        _ => None,
    });
    let path = saved.expect("photo saved");
    assert!(path.starts_with(fixture.dir.path().join("photos")));
    assert!(path.exists());

    let focus_started = events.iter().position(|e| *e == UiEvent::FocusStarted);
    let focus_finished = events.iter().position(|e| *e == UiEvent::FocusFinished);
    assert!(focus_started < focus_finished);
    assert_eq!(fixture.rig.stats().still_captures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_capture_intents_ignored_while_busy() {
    let mut fixture = Fixture::phone().await;

    fixture.handle.intent(CaptureIntent::TakePhoto);
    fixture.handle.intent(CaptureIntent::TakePhoto);
    fixture.handle.intent(CaptureIntent::SwitchCamera);
    let snapshot = fixture.settled().await;

    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    assert_eq!(snapshot.facing, Some(Facing::Back));
    let saved = fixture
        .drain()
        .iter()
        .filter(|e| matches!(e, UiEvent::PhotoSaved(_)))
        .count();
    assert_eq!(saved, 1);
    assert_eq!(fixture.rig.stats().still_captures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_closes_device_and_session() {
    let fixture = Fixture::phone().await;

    let snapshot = fixture.send(CaptureIntent::Pause).await;
    assert_eq!(snapshot.lifecycle, Lifecycle::Paused);
    assert_eq!(snapshot.status, SessionStatus::Closed);
    assert!(!snapshot.device_open);
    assert!(!snapshot.session_open);
    assert!(!snapshot.preview_bound);
    assert_eq!(fixture.display.bound(), None);
    assert_eq!(fixture.display.release_count(), 1);
    fixture.assert_released();

    // Warm resume reopens
    let snapshot = fixture.send(CaptureIntent::Resume).await;
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
}

#[tokio::test(start_paused = true)]
async fn test_pause_while_recording_abandons_video() {
    let mut fixture = Fixture::phone().await;
    fixture.send(CaptureIntent::StartVideo).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = fixture.send(CaptureIntent::Pause).await;
    assert_eq!(snapshot.status, SessionStatus::Closed);
    assert!(!snapshot.recording);
    fixture.assert_released();
    assert!(
        !fixture
            .drain()
            .iter()
            .any(|e| matches!(e, UiEvent::VideoSaved(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_switch_then_pause_does_not_leak() {
    let fixture = Fixture::phone().await;

    fixture.handle.intent(CaptureIntent::SwitchCamera);
    fixture.handle.intent(CaptureIntent::Pause);
    let snapshot = fixture.settled().await;

    assert_eq!(snapshot.lifecycle, Lifecycle::Paused);
    assert_eq!(snapshot.status, SessionStatus::Closed);
    fixture.assert_released();
    assert!(fixture.rig.stats().max_open_devices <= 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_cancels_slow_photo() {
    let rig = VirtualRig::new(vec![
        VirtualDeviceSpec::back("0").with_exposure(ConvergenceBehavior::Never),
        VirtualDeviceSpec::front("1"),
    ]);
    let mut fixture = Fixture::previewing(rig, CameraBackendType::Modern).await;

    fixture.handle.intent(CaptureIntent::TakePhoto);
    tokio::time::sleep(Duration::from_millis(500)).await;
    let start = Instant::now();
    let snapshot = fixture.send(CaptureIntent::Pause).await;

    assert!(start.elapsed() < CONVERGE_TIMEOUT);
    assert_eq!(snapshot.status, SessionStatus::Closed);
    fixture.assert_released();
    let events = fixture.drain();
    assert!(!events.iter().any(|e| matches!(e, UiEvent::PhotoSaved(_))));
    assert!(Fixture::errors(&events).is_empty());
    let focus: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, UiEvent::FocusStarted | UiEvent::FocusFinished))
        .collect();
    assert_eq!(focus, [&UiEvent::FocusStarted, &UiEvent::FocusFinished]);
}

#[tokio::test(start_paused = true)]
async fn test_start_video_twice_is_noop() {
    let fixture = Fixture::phone().await;

    let snapshot = fixture.send(CaptureIntent::StartVideo).await;
    assert_eq!(snapshot.status, SessionStatus::Recording);
    assert_eq!(snapshot.surfaces, video_kinds());
    let sessions = fixture
        .rig
        .stats()
        .calls
        .iter()
        .filter(|c| matches!(c, HardwareCall::CreateSession(_)))
        .count();

    let snapshot = fixture.send(CaptureIntent::StartVideo).await;
    assert_eq!(snapshot.status, SessionStatus::Recording);
    let after = fixture
        .rig
        .stats()
        .calls
        .iter()
        .filter(|c| matches!(c, HardwareCall::CreateSession(_)))
        .count();
    assert_eq!(sessions, after);
}

#[tokio::test(start_paused = true)]
async fn test_stop_video_without_recording_is_noop() {
    let fixture = Fixture::phone().await;
    let calls = fixture.rig.stats().calls.len();

    let snapshot = fixture.send(CaptureIntent::StopVideo).await;
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    assert_eq!(fixture.rig.stats().calls.len(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_record_and_stop_saves_video() {
    let mut fixture = Fixture::phone().await;

    fixture.send(CaptureIntent::StartVideo).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let snapshot = fixture.send(CaptureIntent::StopVideo).await;

    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    assert_eq!(snapshot.surfaces, photo_kinds());
    assert!(!snapshot.recording);

    let saved = fixture.drain().into_iter().find_map(|e| match e {
        UiEvent::VideoSaved(path) => Some(path),
        _ => None,
    });
    let path = saved.expect("video saved");
    assert!(path.starts_with(fixture.dir.path().join("videos")));
    assert!(path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_photo_during_recording_keeps_surfaces() {
    let mut fixture = Fixture::phone().await;
    fixture.send(CaptureIntent::StartVideo).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let sessions_before = fixture.rig.stats().count(&HardwareCall::CloseSession);

    let snapshot = fixture.send(CaptureIntent::TakePhoto).await;
    assert_eq!(snapshot.status, SessionStatus::Recording);
    assert_eq!(snapshot.surfaces, video_kinds());
    assert_eq!(
        fixture.rig.stats().count(&HardwareCall::CloseSession),
        sessions_before
    );
    assert!(
        fixture
            .drain()
            .iter()
            .any(|e| matches!(e, UiEvent::PhotoSaved(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_switch_twice_restores_facing() {
    let fixture = Fixture::phone().await;

    let snapshot = fixture.send(CaptureIntent::SwitchCamera).await;
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    assert_eq!(snapshot.facing, Some(Facing::Front));
    assert_eq!(snapshot.device_id, Some(DeviceId::new("1")));

    let snapshot = fixture.send(CaptureIntent::SwitchCamera).await;
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    assert_eq!(snapshot.facing, Some(Facing::Back));
    assert_eq!(fixture.rig.stats().open_devices, 1);
}

#[tokio::test(start_paused = true)]
async fn test_switch_while_recording_saves_video() {
    let mut fixture = Fixture::phone().await;
    fixture.send(CaptureIntent::StartVideo).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = fixture.send(CaptureIntent::SwitchCamera).await;
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    assert_eq!(snapshot.facing, Some(Facing::Front));
    assert!(!snapshot.recording);
    assert!(
        fixture
            .drain()
            .iter()
            .any(|e| matches!(e, UiEvent::VideoSaved(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_serial_execution_under_intent_flood() {
    let fixture = Fixture::phone().await;

    for intent in [
        CaptureIntent::TakePhoto,
        CaptureIntent::SwitchCamera,
        CaptureIntent::StartVideo,
        CaptureIntent::Pause,
        CaptureIntent::Resume,
        CaptureIntent::StartVideo,
        CaptureIntent::SwitchCamera,
        CaptureIntent::StopVideo,
    ] {
        fixture.handle.intent(intent);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    fixture.settled().await;

    let stats = fixture.rig.stats();
    assert!(stats.max_open_devices <= 1, "{:?}", stats.max_open_devices);
    assert!(stats.max_live_sessions <= 1, "{:?}", stats.max_live_sessions);
    assert_eq!(stats.close_order_violations, 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_ordering_observed_by_driver() {
    let fixture = Fixture::phone().await;
    fixture.send(CaptureIntent::StartVideo).await;
    fixture.send(CaptureIntent::Pause).await;

    let stats = fixture.rig.stats();
    assert_eq!(stats.close_order_violations, 0);
    let calls = &stats.calls;
    let closes: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == HardwareCall::CloseSession)
        .map(|(i, _)| i)
        .collect();
    assert!(!closes.is_empty());
    for i in closes {
        assert_eq!(calls[i - 1], HardwareCall::AbortCaptures);
        assert_eq!(calls[i - 2], HardwareCall::StopRepeating);
    }
}

#[tokio::test(start_paused = true)]
async fn test_configure_failure_releases_device() {
    let mut fixture = Fixture::spawn(
        VirtualRig::new(vec![VirtualDeviceSpec::back("0").rejecting_configuration()]),
        CameraBackendType::Modern,
    );
    fixture.display.attach(VIEW);
    fixture.handle.create();
    fixture.handle.resume();

    let snapshot = fixture.settled().await;
    assert_eq!(snapshot.status, SessionStatus::Closed);
    assert!(!snapshot.device_open);
    assert_eq!(Fixture::errors(&fixture.drain()), vec![ErrorKind::OpenFailed]);
    fixture.assert_released();
    assert_eq!(fixture.rig.stats().max_open_devices, 1);
}

#[tokio::test(start_paused = true)]
async fn test_busy_camera_reports_access_denied() {
    let rig = VirtualRig::phone();
    rig.hold_externally(&DeviceId::new("0"));
    let mut fixture = Fixture::spawn(rig, CameraBackendType::Modern);
    fixture.display.attach(VIEW);
    fixture.handle.create();
    fixture.handle.resume();

    let snapshot = fixture.settled().await;
    assert_eq!(snapshot.status, SessionStatus::Closed);
    assert_eq!(
        Fixture::errors(&fixture.drain()),
        vec![ErrorKind::AccessDenied]
    );
    fixture.assert_released();
}

#[tokio::test(start_paused = true)]
async fn test_still_capture_failure_releases_device() {
    let rig = VirtualRig::new(vec![VirtualDeviceSpec::back("0").failing_still_capture()]);
    let mut fixture = Fixture::previewing(rig, CameraBackendType::Modern).await;

    let snapshot = fixture.send(CaptureIntent::TakePhoto).await;
    assert_eq!(snapshot.status, SessionStatus::Closed);
    assert_eq!(
        Fixture::errors(&fixture.drain()),
        vec![ErrorKind::CaptureFailed]
    );
    fixture.assert_released();
}

#[tokio::test(start_paused = true)]
async fn test_device_fault_while_previewing_releases_everything() {
    let mut fixture = Fixture::phone().await;

    fixture
        .rig
        .fail_device(&DeviceId::new("0"), DeviceFault::CameraDevice);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = fixture.settled().await;
    assert_eq!(snapshot.status, SessionStatus::Closed);
    assert!(!snapshot.device_open);
    assert!(!snapshot.session_open);
    assert_eq!(Fixture::errors(&fixture.drain()), vec![ErrorKind::OpenFailed]);
    assert_eq!(fixture.display.bound(), None);
    fixture.assert_released();
}

#[tokio::test(start_paused = true)]
async fn test_legacy_disconnect_while_previewing_releases_everything() {
    let mut fixture = Fixture::previewing(VirtualRig::phone(), CameraBackendType::Legacy).await;

    fixture.rig.disconnect(&DeviceId::new("0"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = fixture.settled().await;
    assert_eq!(snapshot.status, SessionStatus::Closed);
    assert!(!snapshot.device_open);
    assert_eq!(Fixture::errors(&fixture.drain()), vec![ErrorKind::OpenFailed]);
    fixture.assert_released();
}

#[tokio::test(start_paused = true)]
async fn test_no_camera_is_generic_error() {
    let mut fixture = Fixture::spawn(VirtualRig::new(Vec::new()), CameraBackendType::Modern);
    fixture.display.attach(VIEW);
    fixture.handle.create();
    fixture.handle.resume();

    let snapshot = fixture.settled().await;
    assert_eq!(snapshot.status, SessionStatus::Closed);
    assert_eq!(Fixture::errors(&fixture.drain()), vec![ErrorKind::Generic]);
}

#[tokio::test(start_paused = true)]
async fn test_never_converging_exposure_times_out_at_deadline() {
    let rig = VirtualRig::new(vec![
        VirtualDeviceSpec::back("0").with_exposure(ConvergenceBehavior::Never),
    ]);
    let mut fixture = Fixture::previewing(rig, CameraBackendType::Modern).await;

    let start = Instant::now();
    fixture.handle.intent(CaptureIntent::TakePhoto);
    loop {
        match fixture.events.recv().await.unwrap() {
            UiEvent::PhotoSaved(_) => break,
            UiEvent::Error { kind, detail } => panic!("{}: {}", kind, detail),
            _ => {}
        }
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= CONVERGE_TIMEOUT);
    assert!(elapsed < CONVERGE_TIMEOUT + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_legacy_backend_takes_photo() {
    let mut fixture = Fixture::previewing(VirtualRig::phone(), CameraBackendType::Legacy).await;

    let start = Instant::now();
    let snapshot = fixture.send(CaptureIntent::TakePhoto).await;
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    // Unreported AE state never waits for the deadline
    assert!(start.elapsed() < CONVERGE_TIMEOUT);
    assert!(
        fixture
            .drain()
            .iter()
            .any(|e| matches!(e, UiEvent::PhotoSaved(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_surface_resize_rebinds_preview() {
    let fixture = Fixture::phone().await;
    let bound = fixture.display.bound();
    assert!(bound.is_some());

    let surface = fixture.display.available_surface().unwrap();
    let resized = PreviewSurface {
        size: Size::new(720, 1280),
        ..surface
    };
    fixture.handle.surface_size_changed(resized);
    let snapshot = fixture.settled().await;
    assert_eq!(snapshot.status, SessionStatus::PreviewOnly);
    assert_eq!(fixture.display.bound(), bound);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_stops_dispatcher() {
    let fixture = Fixture::phone().await;

    let Fixture {
        rig, handle, task, ..
    } = fixture;
    handle.destroy();
    task.await.unwrap();
    assert_eq!(rig.stats().open_devices, 0);
    assert_eq!(rig.stats().live_sessions, 0);
    assert!(!handle.create());
}
