// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture session orchestrator
//!
//! Lower layers return [`CameraError`] untranslated. Only the dispatcher's
//! error sink maps them onto the coarse [`ErrorKind`] shown to the user.

use thiserror::Error;

/// Result type alias using CameraError
pub type CameraResult<T> = Result<T, CameraError>;

/// Errors raised by the device, session, capture and recorder layers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// The requested device identifier does not exist
    #[error("Camera device not available: {0}")]
    DeviceUnavailable(String),
    /// Another client holds the device
    #[error("Camera device is busy: {0}")]
    DeviceBusy(String),
    /// Driver-level fault while opening or operating the device
    #[error("Camera device error: {0}")]
    DeviceError(String),
    /// The driver refused the requested surface set
    #[error("Capture session configuration failed: {0}")]
    SessionConfigureFailed(String),
    /// A session is already being configured on this device
    #[error("Capture session is busy configuring")]
    SessionBusy,
    /// A single or repeating capture request failed
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
    /// The recorder resource rejected an operation
    #[error("Recorder failed: {0}")]
    RecorderFailed(#[from] RecorderError),
    /// No usable camera was found while choosing one
    #[error("No camera devices found")]
    NoCameraFound,
    /// Saving a photo failed
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Recorder resource errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("recorder is not configured")]
    NotConfigured,
    #[error("recorder was stopped before any frame was recorded")]
    EmptyRecording,
    #[error("recorder is already recording")]
    AlreadyRecording,
    #[error("recorder must be reset before it can be configured again")]
    NeedsReset,
    #[error("invalid recorder parameters: {0}")]
    InvalidParameters(String),
}

/// User-visible error categories forwarded to the UI collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The camera is held by someone else
    AccessDenied,
    /// The camera or its session could not be opened
    OpenFailed,
    /// A photo or video could not be produced
    CaptureFailed,
    /// Anything else
    Generic,
}

impl CameraError {
    /// Classify into the category shown to the user
    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::DeviceBusy(_) => ErrorKind::AccessDenied,
            CameraError::DeviceUnavailable(_)
            | CameraError::DeviceError(_)
            | CameraError::SessionConfigureFailed(_)
            | CameraError::SessionBusy => ErrorKind::OpenFailed,
            CameraError::CaptureFailed(_)
            | CameraError::RecorderFailed(_)
            | CameraError::Storage(_) => ErrorKind::CaptureFailed,
            CameraError::NoCameraFound => ErrorKind::Generic,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::AccessDenied => write!(f, "Camera access denied"),
            ErrorKind::OpenFailed => write!(f, "Could not open camera"),
            ErrorKind::CaptureFailed => write!(f, "Capture failed"),
            ErrorKind::Generic => write!(f, "Camera error"),
        }
    }
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::Storage(err.to_string())
    }
}
