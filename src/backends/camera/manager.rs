// SPDX-License-Identifier: GPL-3.0-only

//! Device lifecycle manager
//!
//! The manager provides:
//! - Device open / close over a [`CameraService`]
//! - Fault classification of the open outcome
//! - Per-device state tracking (`Closed -> Opening -> Open -> Closing -> Closed`)
//!
//! It never retries; the dispatcher decides what to do with a failed open.

use super::CameraService;
use super::types::*;
use crate::errors::{CameraError, CameraResult};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Lifecycle state of one camera device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Closed,
    Opening,
    Open,
    Closing,
}

/// An opened device and the notification stream that belongs to it
///
/// Exactly one stream exists per handle; it stays with the handle until the
/// device is closed.
pub struct OpenDevice {
    handle: DeviceHandle,
    // Sync wrapper; only ever accessed through `get_mut`
    events: tokio::sync::Mutex<DeviceEvents>,
    state: DeviceState,
}

impl OpenDevice {
    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.handle.device_id
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Resolves with the first fault the driver reports after the open
    ///
    /// A disconnect or a driver-initiated close counts as a fault. Never
    /// resolves once the device is closing or closed.
    pub async fn next_fault(&mut self) -> CameraError {
        if self.state != DeviceState::Open {
            return std::future::pending().await;
        }
        let id = self.handle.device_id.clone();
        loop {
            match self.events.get_mut().next().await {
                Some(DeviceEvent::Error(fault)) => return fault_error(&id, fault),
                Some(DeviceEvent::Disconnected) => {
                    return CameraError::DeviceError(format!("{}: disconnected", id));
                }
                Some(DeviceEvent::Closed) | None => {
                    return CameraError::DeviceError(format!("{}: closed by the driver", id));
                }
                Some(DeviceEvent::Opened(_)) => debug!(device = %id, "Repeated open notification"),
            }
        }
    }
}

/// Busy faults are access problems, everything else a device error
fn fault_error(id: &DeviceId, fault: DeviceFault) -> CameraError {
    if fault.is_busy() {
        CameraError::DeviceBusy(format!("{}: {}", id, fault))
    } else {
        CameraError::DeviceError(format!("{}: {}", id, fault))
    }
}

impl std::fmt::Debug for OpenDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenDevice")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Device lifecycle manager
///
/// Cheap to clone; clones share state tracking.
#[derive(Clone)]
pub struct DeviceLifecycleManager {
    service: Arc<dyn CameraService>,
    states: Arc<Mutex<HashMap<DeviceId, DeviceState>>>,
}

impl DeviceLifecycleManager {
    pub fn new(service: Arc<dyn CameraService>) -> Self {
        info!(backend = %service.backend_type(), "Creating device lifecycle manager");
        Self {
            service,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn service(&self) -> &Arc<dyn CameraService> {
        &self.service
    }

    pub fn backend_type(&self) -> CameraBackendType {
        self.service.backend_type()
    }

    /// Current state of a device, `Closed` if never opened
    pub fn state(&self, id: &DeviceId) -> DeviceState {
        self.states
            .lock()
            .map(|states| states.get(id).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of devices not in the `Closed` state
    pub fn open_count(&self) -> usize {
        self.states
            .lock()
            .map(|states| {
                states
                    .values()
                    .filter(|s| **s != DeviceState::Closed)
                    .count()
            })
            .unwrap_or_default()
    }

    fn set_state(&self, id: &DeviceId, state: DeviceState) {
        debug!(device = %id, ?state, "Device state");
        if let Ok(mut states) = self.states.lock() {
            states.insert(id.clone(), state);
        }
    }

    /// Enumerate cameras
    pub async fn list_devices(&self) -> CameraResult<Vec<DeviceId>> {
        let devices = self.service.list_devices().await?;
        if devices.is_empty() {
            Err(CameraError::NoCameraFound)
        } else {
            Ok(devices)
        }
    }

    /// Characteristics of every listed camera, in driver order
    pub async fn all_characteristics(&self) -> CameraResult<Vec<CameraCharacteristics>> {
        let mut all = Vec::new();
        for id in self.list_devices().await? {
            all.push(self.service.characteristics(&id).await?);
        }
        Ok(all)
    }

    pub async fn characteristics(&self, id: &DeviceId) -> CameraResult<CameraCharacteristics> {
        self.service.characteristics(id).await
    }

    /// Open a device and wait for the driver's verdict
    ///
    /// # Errors
    /// - `DeviceUnavailable` for unknown identifiers
    /// - `DeviceBusy` when another client holds the camera
    /// - `DeviceError` for driver faults and disconnects before open
    pub async fn open(&self, id: &DeviceId) -> CameraResult<OpenDevice> {
        info!(device = %id, "Opening device");
        self.set_state(id, DeviceState::Opening);

        let mut events = match self.service.open_device(id).await {
            Ok(events) => events,
            Err(e) => {
                self.set_state(id, DeviceState::Closed);
                return Err(e);
            }
        };

        let outcome = match events.next().await {
            Some(DeviceEvent::Opened(handle)) => Ok(handle),
            Some(DeviceEvent::Error(fault)) => Err(fault_error(id, fault)),
            Some(DeviceEvent::Disconnected) => Err(CameraError::DeviceError(format!(
                "{}: disconnected before open",
                id
            ))),
            Some(DeviceEvent::Closed) | None => Err(CameraError::DeviceError(format!(
                "{}: closed before open",
                id
            ))),
        };

        match outcome {
            Ok(handle) => {
                self.set_state(id, DeviceState::Open);
                info!(device = %id, "Device open");
                Ok(OpenDevice {
                    handle,
                    events: tokio::sync::Mutex::new(events),
                    state: DeviceState::Open,
                })
            }
            Err(error) => {
                warn!(device = %id, %error, "Device open failed");
                self.set_state(id, DeviceState::Closed);
                Err(error)
            }
        }
    }

    /// Close a device and wait for `Closed`
    ///
    /// Always terminates. Closing an already closed device is a no-op, and a
    /// driver that ends the stream without `Closed` counts as closed.
    pub async fn close(&self, device: &mut OpenDevice) {
        if device.state == DeviceState::Closed {
            debug!(device = %device.device_id(), "Device already closed");
            return;
        }
        info!(device = %device.device_id(), "Closing device");
        device.state = DeviceState::Closing;
        self.set_state(device.device_id(), DeviceState::Closing);

        match self.service.close_device(&device.handle).await {
            Ok(()) => {
                while let Some(event) = device.events.get_mut().next().await {
                    match event {
                        DeviceEvent::Closed => break,
                        other => debug!(device = %device.device_id(), ?other, "Event while closing"),
                    }
                }
            }
            Err(error) => {
                warn!(device = %device.device_id(), %error, "Device close failed; treating as closed");
            }
        }

        device.state = DeviceState::Closed;
        self.set_state(device.device_id(), DeviceState::Closed);
        info!(device = %device.device_id(), "Device closed");
    }
}
