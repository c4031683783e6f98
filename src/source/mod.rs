//! Signal sources for the session monitor.
//!
//! This module normalizes browser capabilities (fullscreen, visibility,
//! focus, keyboard, screen geometry, camera and microphone) into uniform
//! signal and sample types, behind one interface per capability.

pub mod fullscreen;
pub mod listeners;
pub mod media;
pub mod platform;
pub mod relay;
pub mod types;

use std::sync::Arc;

// Re-export commonly used types
pub use fullscreen::FullscreenSource;
pub use listeners::{ListenerId, ListenerRegistry};
pub use media::{MediaRequest, MediaStreamHandle, MediaTrack, StreamView, TrackKind};
pub use platform::{
    AcquireError, AudioAnalyser, DetectionError, FaceModel, FullscreenBackend, MediaDevices,
    ScreenProbe,
};
pub use relay::{Device, Relay, Sample};
pub use types::{
    AudioFrame, DisplayGeometry, Face, FaceBox, KeyStroke, Keypoint, Signal, SignalEnvelope,
    SignalKind,
};

/// Every capability a session needs, supplied by the host.
pub struct Platform {
    pub fullscreen: FullscreenSource,
    pub screen: Arc<dyn ScreenProbe>,
    pub devices: Box<dyn MediaDevices>,
    pub face_model: Box<dyn FaceModel>,
    pub audio: Box<dyn AudioAnalyser>,
}
