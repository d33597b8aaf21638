// SPDX-License-Identifier: GPL-3.0-only

//! Result callbacks towards the UI

use crate::backends::camera::SurfaceSet;
use crate::errors::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// What the orchestrator reports back to the UI
pub trait CameraCallback: Send + Sync {
    fn on_photo_saved(&self, path: &Path);
    fn on_video_saved(&self, path: &Path);
    fn on_focus_started(&self);
    fn on_focus_finished(&self);
    fn on_message(&self, text: &str);
    fn on_error(&self, kind: ErrorKind, detail: &str);
    fn on_session_configured(&self, surfaces: &SurfaceSet);
    fn on_session_closed(&self);
}

/// Callback invocations as values
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    PhotoSaved(PathBuf),
    VideoSaved(PathBuf),
    FocusStarted,
    FocusFinished,
    Message(String),
    Error { kind: ErrorKind, detail: String },
    SessionConfigured(SurfaceSet),
    SessionClosed,
}

impl std::fmt::Display for UiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiEvent::PhotoSaved(path) => write!(f, "photo saved: {}", path.display()),
            UiEvent::VideoSaved(path) => write!(f, "video saved: {}", path.display()),
            UiEvent::FocusStarted => write!(f, "focus started"),
            UiEvent::FocusFinished => write!(f, "focus finished"),
            UiEvent::Message(text) => write!(f, "{}", text),
            UiEvent::Error { kind, detail } => write!(f, "{}: {}", kind, detail),
            UiEvent::SessionConfigured(surfaces) => {
                write!(f, "session configured: {:?}", surfaces.kinds())
            }
            UiEvent::SessionClosed => write!(f, "session closed"),
        }
    }
}

/// Forwards every callback as a [`UiEvent`] on a channel
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    sender: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelCallback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn emit(&self, event: UiEvent) {
        // UI gone; nothing left to notify
        let _ = self.sender.send(event);
    }
}

impl CameraCallback for ChannelCallback {
    fn on_photo_saved(&self, path: &Path) {
        self.emit(UiEvent::PhotoSaved(path.to_path_buf()));
    }

    fn on_video_saved(&self, path: &Path) {
        self.emit(UiEvent::VideoSaved(path.to_path_buf()));
    }

    fn on_focus_started(&self) {
        self.emit(UiEvent::FocusStarted);
    }

    fn on_focus_finished(&self) {
        self.emit(UiEvent::FocusFinished);
    }

    fn on_message(&self, text: &str) {
        self.emit(UiEvent::Message(text.to_string()));
    }

    fn on_error(&self, kind: ErrorKind, detail: &str) {
        self.emit(UiEvent::Error {
            kind,
            detail: detail.to_string(),
        });
    }

    fn on_session_configured(&self, surfaces: &SurfaceSet) {
        self.emit(UiEvent::SessionConfigured(surfaces.clone()));
    }

    fn on_session_closed(&self) {
        self.emit(UiEvent::SessionClosed);
    }
}
