// SPDX-License-Identifier: GPL-3.0-only

//! Display surface provider
//!
//! The display owns the renderable preview target. It tells the orchestrator
//! when the target appears, resizes or goes away (as [`Message`]s), and the
//! orchestrator binds the camera's preview buffer size to it.
//!
//! [`Message`]: super::Message

use crate::backends::camera::Size;
use crate::backends::camera::orientation::DisplayRotation;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// A renderable preview target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSurface {
    pub id: Uuid,
    pub size: Size,
}

impl PreviewSurface {
    pub fn new(size: Size) -> Self {
        Self {
            id: Uuid::new_v4(),
            size,
        }
    }
}

pub trait DisplaySurfaceProvider: Send + Sync {
    /// Surface that is already available, checked on resume
    fn available_surface(&self) -> Option<PreviewSurface>;

    fn rotation(&self) -> DisplayRotation;

    /// Size the surface's buffers for a `buffer`-sized preview stream
    fn bind_preview(&self, surface: &PreviewSurface, buffer: Size);

    fn release(&self, surface: &PreviewSurface);
}

#[derive(Debug, Default)]
struct DisplayState {
    surface: Option<PreviewSurface>,
    rotation: DisplayRotation,
    bound: Option<(Uuid, Size)>,
    releases: usize,
}

/// In-process display used by the CLI and tests
#[derive(Debug, Default)]
pub struct VirtualDisplay {
    state: Mutex<DisplayState>,
}

impl VirtualDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a surface of `size`; it stays available until detached
    pub fn attach(&self, size: Size) -> PreviewSurface {
        let surface = PreviewSurface::new(size);
        self.lock().surface = Some(surface);
        surface
    }

    pub fn detach(&self) {
        self.lock().surface = None;
    }

    pub fn set_rotation(&self, rotation: DisplayRotation) {
        self.lock().rotation = rotation;
    }

    /// Buffer size currently bound, if any
    pub fn bound(&self) -> Option<Size> {
        self.lock().bound.map(|(_, size)| size)
    }

    pub fn release_count(&self) -> usize {
        self.lock().releases
    }
}

impl DisplaySurfaceProvider for VirtualDisplay {
    fn available_surface(&self) -> Option<PreviewSurface> {
        self.lock().surface
    }

    fn rotation(&self) -> DisplayRotation {
        self.lock().rotation
    }

    fn bind_preview(&self, surface: &PreviewSurface, buffer: Size) {
        debug!(surface = %surface.id, %buffer, "Binding preview buffer");
        self.lock().bound = Some((surface.id, buffer));
    }

    fn release(&self, surface: &PreviewSurface) {
        let mut state = self.lock();
        if state.bound.is_some_and(|(id, _)| id == surface.id) {
            state.bound = None;
        }
        state.releases += 1;
    }
}
