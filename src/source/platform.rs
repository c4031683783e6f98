//! Capability interfaces the host platform implements.
//!
//! Each trait wraps exactly one browser capability. The session monitor only
//! ever talks to these traits, so the same policy code runs against a real
//! browser bridge, the HTTP relay, or a test double.

use crate::source::media::{MediaRequest, MediaStreamHandle, StreamView};
use crate::source::types::{AudioFrame, DisplayGeometry, Face};

/// Errors raised while acquiring a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// The user (or browser policy) refused the request
    PermissionDenied(String),
    /// The capability does not exist on this platform
    Unsupported(String),
    /// The capability is already held by this session
    AlreadyAcquired,
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireError::PermissionDenied(what) => write!(f, "Permission denied: {what}"),
            AcquireError::Unsupported(what) => write!(f, "Unsupported capability: {what}"),
            AcquireError::AlreadyAcquired => write!(f, "Capability already acquired"),
        }
    }
}

impl std::error::Error for AcquireError {}

/// Errors raised while sampling an acquired capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// The sample could not be classified (probe threw, inference failed)
    Ambiguous(String),
    /// The underlying source is gone (track stopped, no frame yet)
    Unavailable(String),
}

impl std::fmt::Display for DetectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionError::Ambiguous(msg) => write!(f, "Detection ambiguous: {msg}"),
            DetectionError::Unavailable(msg) => write!(f, "Source unavailable: {msg}"),
        }
    }
}

impl std::error::Error for DetectionError {}

/// One fullscreen implementation strategy (standard or vendor-prefixed).
pub trait FullscreenBackend: Send {
    /// Strategy name for diagnostics, e.g. `webkit`.
    fn name(&self) -> &'static str;

    /// Whether this strategy exists on the current platform.
    fn is_supported(&self) -> bool;

    /// Request fullscreen on the document element.
    fn request(&mut self) -> Result<(), AcquireError>;

    /// Leave fullscreen.
    fn exit(&mut self) -> Result<(), AcquireError>;

    /// Whether a fullscreen element is currently set.
    fn is_active(&self) -> bool;
}

/// Read access to screen and window geometry.
pub trait ScreenProbe: Send + Sync {
    fn geometry(&self) -> Result<DisplayGeometry, DetectionError>;
}

/// Camera/microphone acquisition (`getUserMedia`).
pub trait MediaDevices: Send {
    fn get_user_media(&mut self, request: MediaRequest) -> Result<MediaStreamHandle, AcquireError>;
}

/// Face-detection inference over the current camera frame.
pub trait FaceModel: Send {
    fn estimate_faces(&mut self, stream: &StreamView) -> Result<Vec<Face>, DetectionError>;
}

/// Audio analyser attached to the microphone track.
pub trait AudioAnalyser: Send {
    fn sample(&mut self, stream: &StreamView) -> Result<AudioFrame, DetectionError>;
}
