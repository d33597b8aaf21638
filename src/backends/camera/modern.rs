// SPDX-License-Identifier: GPL-3.0-only

//! Adapter for the metadata-rich camera API
//!
//! Device and session callbacks are delivered on unbounded channels (they are
//! rare and must never be lost). Repeating frame results use a small bounded
//! channel and are dropped when the consumer falls behind, the same way a
//! preview pipeline drops frames instead of queueing them.

use super::CameraService;
use super::types::*;
use super::virtual_rig::{
    AcquireError, HardwareCall, VirtualRig, bounded_events, unbounded_events,
};
use crate::constants::timing;
use crate::errors::{CameraError, CameraResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Frame results buffered per repeating request before frames are dropped
const FRAME_CHANNEL_CAPACITY: usize = 8;

struct ModernSession {
    handle: SessionHandle,
    events: mpsc::UnboundedSender<SessionEvent>,
    repeating: Option<JoinHandle<()>>,
    pending: Vec<JoinHandle<()>>,
}

impl ModernSession {
    fn stop_repeating(&mut self) {
        if let Some(task) = self.repeating.take() {
            task.abort();
        }
    }

    fn abort_pending(&mut self) {
        for task in self.pending.drain(..) {
            task.abort();
        }
    }
}

#[derive(Default)]
struct Registry {
    devices: HashMap<Uuid, (DeviceHandle, mpsc::UnboundedSender<DeviceEvent>)>,
    sessions: HashMap<Uuid, ModernSession>,
}

/// Metadata-rich camera API backed by the virtual rig
pub struct ModernCameraService {
    rig: VirtualRig,
    registry: Arc<Mutex<Registry>>,
}

impl ModernCameraService {
    pub fn new(rig: VirtualRig) -> Self {
        Self {
            rig,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    fn session_closed(session: &SessionHandle) -> CameraError {
        CameraError::CaptureFailed(format!("session {} is closed", session.id))
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CameraService for ModernCameraService {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Modern
    }

    async fn list_devices(&self) -> CameraResult<Vec<DeviceId>> {
        Ok(self.rig.device_ids())
    }

    async fn characteristics(&self, id: &DeviceId) -> CameraResult<CameraCharacteristics> {
        self.rig
            .spec(id)
            .map(|spec| spec.characteristics)
            .ok_or_else(|| CameraError::DeviceUnavailable(id.to_string()))
    }

    async fn open_device(&self, id: &DeviceId) -> CameraResult<DeviceEvents> {
        self.rig.record(HardwareCall::OpenDevice(id.clone()));
        if self.rig.spec(id).is_none() {
            return Err(CameraError::DeviceUnavailable(id.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let rig = self.rig.clone();
        let registry = Arc::clone(&self.registry);
        let id = id.clone();
        tokio::spawn(async move {
            // Driver open latency
            tokio::time::sleep(rig.frame_interval()).await;
            let event = match rig.acquire(&id) {
                Ok(handle) => {
                    info!(device = %id, "Device opened");
                    lock(&registry)
                        .devices
                        .insert(handle.id, (handle.clone(), tx.clone()));
                    let faults = tx.clone();
                    rig.watch(
                        &handle,
                        Box::new(move |event| {
                            let _ = faults.send(event);
                        }),
                    );
                    DeviceEvent::Opened(handle)
                }
                Err(AcquireError::Fault(fault)) => DeviceEvent::Error(fault),
                Err(AcquireError::Disconnected) => DeviceEvent::Disconnected,
                Err(AcquireError::Unknown) => DeviceEvent::Error(DeviceFault::CameraService),
            };
            let _ = tx.send(event);
        });

        Ok(unbounded_events(rx))
    }

    async fn close_device(&self, device: &DeviceHandle) -> CameraResult<()> {
        self.rig.record(HardwareCall::CloseDevice(device.device_id.clone()));
        let mut registry = self.registry();
        let Some((_, events)) = registry.devices.remove(&device.id) else {
            debug!(device = %device.device_id, "Close of a device that is not open");
            return Ok(());
        };

        let orphaned: Vec<Uuid> = registry
            .sessions
            .iter()
            .filter(|(_, s)| s.handle.device.id == device.id)
            .map(|(id, _)| *id)
            .collect();
        for id in orphaned {
            if let Some(mut session) = registry.sessions.remove(&id) {
                session.stop_repeating();
                session.abort_pending();
                let _ = session.events.send(SessionEvent::Closed);
            }
        }
        drop(registry);

        self.rig.release(device);
        info!(device = %device.device_id, "Device closed");
        let _ = events.send(DeviceEvent::Closed);
        Ok(())
    }

    async fn create_session(
        &self,
        device: &DeviceHandle,
        surfaces: &SurfaceSet,
    ) -> CameraResult<SessionEvents> {
        self.rig.record(HardwareCall::CreateSession(surfaces.kinds()));

        let (tx, rx) = mpsc::unbounded_channel();
        let rig = self.rig.clone();
        let registry = Arc::clone(&self.registry);
        let device = device.clone();
        let surfaces = surfaces.clone();
        tokio::spawn(async move {
            tokio::time::sleep(rig.frame_interval()).await;
            match rig.open_session(&device, &surfaces) {
                Ok(handle) => {
                    debug!(device = %device.device_id, kinds = ?surfaces.kinds(), "Session configured");
                    lock(&registry).sessions.insert(
                        handle.id,
                        ModernSession {
                            handle: handle.clone(),
                            events: tx.clone(),
                            repeating: None,
                            pending: Vec::new(),
                        },
                    );
                    let _ = tx.send(SessionEvent::Configured(handle));
                    let _ = tx.send(SessionEvent::Ready);
                }
                Err(reason) => {
                    warn!(device = %device.device_id, %reason, "Session configuration failed");
                    let _ = tx.send(SessionEvent::ConfigureFailed(reason));
                }
            }
        });

        Ok(unbounded_events(rx))
    }

    async fn capture(
        &self,
        session: &SessionHandle,
        request: CaptureRequest,
    ) -> CameraResult<CaptureEvents> {
        self.rig.record(HardwareCall::Capture(request.template));
        let mut registry = self.registry();
        let Some(slot) = registry.sessions.get_mut(&session.id) else {
            return Err(Self::session_closed(session));
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let rig = self.rig.clone();
        let session_id = session.id;
        let task = tokio::spawn(async move {
            tokio::time::sleep(rig.frame_interval()).await;
            let event = match rig.produce_result(session_id, &request) {
                Ok(result) => CaptureEvent::Completed(result),
                Err(reason) => CaptureEvent::Failed(reason),
            };
            let _ = tx.send(event);
        });
        slot.pending.retain(|t| !t.is_finished());
        slot.pending.push(task);

        Ok(unbounded_events(rx))
    }

    async fn set_repeating(
        &self,
        session: &SessionHandle,
        request: CaptureRequest,
    ) -> CameraResult<CaptureEvents> {
        self.rig.record(HardwareCall::SetRepeating(request.template));
        let mut registry = self.registry();
        let Some(slot) = registry.sessions.get_mut(&session.id) else {
            return Err(Self::session_closed(session));
        };
        slot.stop_repeating();
        self.rig.set_repeating(session.id, true);

        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let rig = self.rig.clone();
        let session_id = session.id;
        let task = tokio::spawn(async move {
            let period = rig.frame_interval();
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match rig.produce_result(session_id, &request) {
                    Ok(result) => {
                        let frame = result.frame_number;
                        if frame % timing::FRAME_LOG_INTERVAL == 0 {
                            debug!(frame, "Repeating request running");
                        }
                        match tx.try_send(CaptureEvent::Completed(result)) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                debug!(frame, "Frame result dropped (consumer busy)");
                            }
                            // Nobody is listening; the request keeps running.
                            Err(mpsc::error::TrySendError::Closed(_)) => {}
                        }
                    }
                    Err(reason) => {
                        let _ = tx.try_send(CaptureEvent::Failed(reason));
                        break;
                    }
                }
            }
        });
        slot.repeating = Some(task);

        Ok(bounded_events(rx))
    }

    async fn stop_repeating(&self, session: &SessionHandle) -> CameraResult<()> {
        self.rig.record(HardwareCall::StopRepeating);
        if let Some(slot) = self.registry().sessions.get_mut(&session.id) {
            slot.stop_repeating();
        }
        self.rig.set_repeating(session.id, false);
        Ok(())
    }

    async fn abort_captures(&self, session: &SessionHandle) -> CameraResult<()> {
        self.rig.record(HardwareCall::AbortCaptures);
        if let Some(slot) = self.registry().sessions.get_mut(&session.id) {
            slot.abort_pending();
        }
        Ok(())
    }

    async fn close_session(&self, session: &SessionHandle) -> CameraResult<()> {
        self.rig.record(HardwareCall::CloseSession);
        let removed = self.registry().sessions.remove(&session.id);
        // The rig checks ordering before the tasks are torn down
        self.rig.close_session(session.id);
        if let Some(mut slot) = removed {
            slot.stop_repeating();
            slot.abort_pending();
            let _ = slot.events.send(SessionEvent::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::virtual_rig::VirtualDeviceSpec;
    use futures::StreamExt;

    async fn open(service: &ModernCameraService, id: &str) -> (DeviceHandle, DeviceEvents) {
        let mut events = service.open_device(&DeviceId::new(id)).await.unwrap();
        match events.next().await {
            Some(DeviceEvent::Opened(handle)) => (handle, events),
            other => panic!("unexpected device event {:?}", other),
        }
    }

    fn photo_surfaces() -> SurfaceSet {
        SurfaceSet::photo(
            OutputSurface::new(SurfaceKind::Preview, Size::new(1280, 960)),
            OutputSurface::new(SurfaceKind::Still, Size::new(1920, 1440)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_device_fails_synchronously() {
        let service = ModernCameraService::new(VirtualRig::phone());
        let result = service.open_device(&DeviceId::new("9")).await;
        assert!(matches!(result, Err(CameraError::DeviceUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_fault_arrives_on_stream() {
        let rig = VirtualRig::new(vec![
            VirtualDeviceSpec::back("0").with_open_fault(DeviceFault::CameraDisabled),
        ]);
        let service = ModernCameraService::new(rig);
        let mut events = service.open_device(&DeviceId::new("0")).await.unwrap();
        assert_eq!(
            events.next().await,
            Some(DeviceEvent::Error(DeviceFault::CameraDisabled))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_results_flow_until_stopped() {
        let rig = VirtualRig::phone();
        let service = ModernCameraService::new(rig.clone());
        let (device, _device_events) = open(&service, "0").await;

        let mut session_events = service
            .create_session(&device, &photo_surfaces())
            .await
            .unwrap();
        let Some(SessionEvent::Configured(session)) = session_events.next().await else {
            panic!("session not configured");
        };

        let mut frames = service
            .set_repeating(&session, CaptureRequest::new(RequestTemplate::Preview))
            .await
            .unwrap();
        let first = frames.next().await;
        assert!(matches!(first, Some(CaptureEvent::Completed(r)) if r.frame_number == 1));

        service.stop_repeating(&session).await.unwrap();
        service.close_session(&session).await.unwrap();
        assert_eq!(rig.stats().close_order_violations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_device_emits_closed() {
        let rig = VirtualRig::phone();
        let service = ModernCameraService::new(rig.clone());
        let (device, mut events) = open(&service, "0").await;
        service.close_device(&device).await.unwrap();
        assert_eq!(events.next().await, Some(DeviceEvent::Closed));
        assert_eq!(rig.stats().open_devices, 0);

        // Second close is a no-op
        service.close_device(&device).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_fault_follows_open() {
        let rig = VirtualRig::phone();
        let service = ModernCameraService::new(rig.clone());
        let (device, mut events) = open(&service, "0").await;

        rig.fail_device(&DeviceId::new("0"), DeviceFault::CameraService);
        assert_eq!(
            events.next().await,
            Some(DeviceEvent::Error(DeviceFault::CameraService))
        );

        service.close_device(&device).await.unwrap();
        assert_eq!(events.next().await, Some(DeviceEvent::Closed));
    }
}
