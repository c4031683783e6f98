//! Relay adapters fed by pushed samples.
//!
//! When the browser side cannot be called directly (HTTP shim, recorded
//! replay, tests) its answers are pushed into a shared [`RelayState`] and
//! the capability traits read from there.

use crate::source::fullscreen::FullscreenSource;
use crate::source::media::{MediaRequest, MediaStreamHandle, MediaTrack, StreamView, TrackKind};
use crate::source::platform::{
    AcquireError, AudioAnalyser, DetectionError, FaceModel, FullscreenBackend, MediaDevices,
    ScreenProbe,
};
use crate::source::types::{AudioFrame, DisplayGeometry, Face};
use crate::source::Platform;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Device a permission answer applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Camera,
    Microphone,
    Fullscreen,
}

/// A polled-source answer pushed from the browser side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sample {
    /// Latest screen/window geometry
    Geometry(DisplayGeometry),
    /// Latest face-detection result for the camera frame
    Faces { faces: Vec<Face> },
    /// Latest analyser frame
    Audio(AudioFrame),
    /// Answer to a permission prompt
    Permission { device: Device, granted: bool },
    /// Inference failed on the latest frame
    InferenceError { message: String },
}

/// Last known answers for every relayed capability.
#[derive(Debug)]
pub struct RelayState {
    geometry: Option<DisplayGeometry>,
    faces: Option<Vec<Face>>,
    inference_error: Option<String>,
    audio: Option<AudioFrame>,
    camera_granted: bool,
    microphone_granted: bool,
    fullscreen_granted: bool,
    fullscreen_active: bool,
    issued_tracks: Vec<MediaTrack>,
    next_track: u32,
}

impl Default for RelayState {
    fn default() -> Self {
        Self {
            geometry: None,
            faces: None,
            inference_error: None,
            audio: None,
            camera_granted: true,
            microphone_granted: true,
            fullscreen_granted: true,
            fullscreen_active: false,
            issued_tracks: Vec::new(),
            next_track: 0,
        }
    }
}

impl RelayState {
    pub fn apply(&mut self, sample: Sample) {
        match sample {
            Sample::Geometry(geometry) => self.geometry = Some(geometry),
            Sample::Faces { faces } => {
                self.faces = Some(faces);
                self.inference_error = None;
            }
            Sample::Audio(frame) => self.audio = Some(frame),
            Sample::Permission { device, granted } => match device {
                Device::Camera => self.camera_granted = granted,
                Device::Microphone => self.microphone_granted = granted,
                Device::Fullscreen => self.fullscreen_granted = granted,
            },
            Sample::InferenceError { message } => self.inference_error = Some(message),
        }
    }
}

/// Cloneable handle to the shared relay state.
#[derive(Debug, Clone, Default)]
pub struct Relay {
    state: Arc<Mutex<RelayState>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Push a sample from the browser side.
    pub fn push(&self, sample: Sample) {
        self.lock().apply(sample);
    }

    /// Mirror the browser's fullscreen state (from a change event).
    pub fn set_fullscreen_active(&self, active: bool) {
        self.lock().fullscreen_active = active;
    }

    pub fn fullscreen_active(&self) -> bool {
        self.lock().fullscreen_active
    }

    /// Number of issued media tracks that have not been stopped.
    pub fn live_track_count(&self) -> usize {
        self.lock()
            .issued_tracks
            .iter()
            .filter(|t| t.is_live())
            .count()
    }

    /// Build a full platform whose capabilities all read from this relay.
    pub fn platform(&self) -> Platform {
        Platform {
            fullscreen: FullscreenSource::new(vec![Box::new(RelayFullscreen {
                relay: self.clone(),
            })]),
            screen: Arc::new(RelayScreen {
                relay: self.clone(),
            }),
            devices: Box::new(RelayMedia {
                relay: self.clone(),
            }),
            face_model: Box::new(RelayFaceModel {
                relay: self.clone(),
            }),
            audio: Box::new(RelayAudio {
                relay: self.clone(),
            }),
        }
    }
}

struct RelayFullscreen {
    relay: Relay,
}

impl FullscreenBackend for RelayFullscreen {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn request(&mut self) -> Result<(), AcquireError> {
        let mut state = self.relay.lock();
        if !state.fullscreen_granted {
            return Err(AcquireError::PermissionDenied("fullscreen".into()));
        }
        state.fullscreen_active = true;
        Ok(())
    }

    fn exit(&mut self) -> Result<(), AcquireError> {
        self.relay.lock().fullscreen_active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.relay.lock().fullscreen_active
    }
}

struct RelayScreen {
    relay: Relay,
}

impl ScreenProbe for RelayScreen {
    fn geometry(&self) -> Result<DisplayGeometry, DetectionError> {
        self.relay
            .lock()
            .geometry
            .clone()
            .ok_or_else(|| DetectionError::Ambiguous("no geometry reported yet".into()))
    }
}

struct RelayMedia {
    relay: Relay,
}

impl MediaDevices for RelayMedia {
    fn get_user_media(&mut self, request: MediaRequest) -> Result<MediaStreamHandle, AcquireError> {
        let mut state = self.relay.lock();
        if request.video && !state.camera_granted {
            return Err(AcquireError::PermissionDenied("camera".into()));
        }
        if request.audio && !state.microphone_granted {
            return Err(AcquireError::PermissionDenied("microphone".into()));
        }

        let mut tracks = Vec::new();
        for (wanted, kind, label) in [
            (request.video, TrackKind::Video, "video"),
            (request.audio, TrackKind::Audio, "audio"),
        ] {
            if wanted {
                state.next_track += 1;
                let track = MediaTrack::new(format!("{label}-{}", state.next_track), kind);
                state.issued_tracks.push(track.clone());
                tracks.push(track);
            }
        }
        Ok(MediaStreamHandle::new(tracks))
    }
}

struct RelayFaceModel {
    relay: Relay,
}

impl FaceModel for RelayFaceModel {
    fn estimate_faces(&mut self, stream: &StreamView) -> Result<Vec<Face>, DetectionError> {
        if !stream.has_live(TrackKind::Video) {
            return Err(DetectionError::Unavailable("camera track stopped".into()));
        }
        let state = self.relay.lock();
        if let Some(ref message) = state.inference_error {
            return Err(DetectionError::Ambiguous(message.clone()));
        }
        state
            .faces
            .clone()
            .ok_or_else(|| DetectionError::Unavailable("no camera frame yet".into()))
    }
}

struct RelayAudio {
    relay: Relay,
}

impl AudioAnalyser for RelayAudio {
    fn sample(&mut self, stream: &StreamView) -> Result<AudioFrame, DetectionError> {
        if !stream.has_live(TrackKind::Audio) {
            return Err(DetectionError::Unavailable("microphone track stopped".into()));
        }
        self.relay
            .lock()
            .audio
            .clone()
            .ok_or_else(|| DetectionError::Unavailable("no audio frame yet".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_permission_denied() {
        let relay = Relay::new();
        relay.push(Sample::Permission {
            device: Device::Camera,
            granted: false,
        });
        let mut platform = relay.platform();
        let result = platform.devices.get_user_media(MediaRequest {
            video: true,
            audio: true,
        });
        assert_eq!(
            result.err(),
            Some(AcquireError::PermissionDenied("camera".into()))
        );
    }

    #[test]
    fn test_issued_tracks_are_tracked() {
        let relay = Relay::new();
        let mut platform = relay.platform();
        let mut handle = platform
            .devices
            .get_user_media(MediaRequest {
                video: true,
                audio: true,
            })
            .unwrap();
        assert_eq!(relay.live_track_count(), 2);
        handle.stop_all();
        assert_eq!(relay.live_track_count(), 0);
    }

    #[test]
    fn test_face_model_reads_latest_sample() {
        let relay = Relay::new();
        let mut platform = relay.platform();
        let handle = platform
            .devices
            .get_user_media(MediaRequest {
                video: true,
                audio: false,
            })
            .unwrap();
        let view = handle.view();

        assert!(platform.face_model.estimate_faces(&view).is_err());
        relay.push(Sample::Faces {
            faces: vec![Face::default()],
        });
        assert_eq!(platform.face_model.estimate_faces(&view).unwrap().len(), 1);

        relay.push(Sample::InferenceError {
            message: "webgl context lost".into(),
        });
        assert!(matches!(
            platform.face_model.estimate_faces(&view),
            Err(DetectionError::Ambiguous(_))
        ));
    }
}
