//! Detectors: stateful classifiers turning raw signals and samples into
//! violation or clear results for one concern each.
//!
//! Event-driven detectors declare the signal kinds they listen to and react
//! in [`Detector::on_signal`]. Polled detectors declare an interval and are
//! sampled through a [`Probes`] context built by the monitor for each tick,
//! so they never own a device or a stream themselves.

pub mod devtools;
pub mod display;
pub mod face;
pub mod fullscreen;
pub mod head;
pub mod keys;
pub mod noise;
pub mod tab_switch;

use crate::core::types::ViolationEvent;
use crate::source::media::StreamView;
use crate::source::platform::{AudioAnalyser, DetectionError, FaceModel, ScreenProbe};
use crate::source::types::{AudioFrame, DisplayGeometry, Face, Signal, SignalKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use devtools::DevToolsDetector;
pub use display::{evaluate, DisplayAssessment, ExternalDisplayDetector, MethodResult};
pub use face::FacePresenceDetector;
pub use fullscreen::FullscreenExitDetector;
pub use head::{estimate_orientation, HeadOrientation, HeadOrientationDetector};
pub use keys::BlockedKeyDetector;
pub use noise::AmbientNoiseDetector;
pub use tab_switch::TabSwitchDetector;

/// Identifies a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    FullscreenExit,
    TabSwitch,
    DevTools,
    ExternalDisplay,
    FacePresence,
    HeadOrientation,
    AmbientNoise,
    BlockedKey,
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DetectorKind::FullscreenExit => "fullscreen_exit",
            DetectorKind::TabSwitch => "tab_switch",
            DetectorKind::DevTools => "devtools",
            DetectorKind::ExternalDisplay => "external_display",
            DetectorKind::FacePresence => "face_presence",
            DetectorKind::HeadOrientation => "head_orientation",
            DetectorKind::AmbientNoise => "ambient_noise",
            DetectorKind::BlockedKey => "blocked_key",
        };
        f.write_str(name)
    }
}

/// Output of a detector step.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Violation(ViolationEvent),
    /// The condition the detector watches has cleared
    Clear(DetectorKind),
    /// Operator-facing note (probe failure, inference error); never a violation
    Diagnostic {
        source: DetectorKind,
        message: String,
    },
}

/// Whether the host should let a captured event's default action happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    #[default]
    Allow,
    Block,
}

/// Per-detector counters. Owned by exactly one detector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorState {
    pub last_warning_at: Option<DateTime<Utc>>,
    pub consecutive_count: u32,
}

impl DetectorState {
    /// Note a positive observation; returns the new consecutive count.
    pub fn observe(&mut self, now: DateTime<Utc>) -> u32 {
        self.last_warning_at = Some(now);
        self.consecutive_count += 1;
        self.consecutive_count
    }

    /// Reset the run. Returns whether there was a run to clear.
    pub fn clear(&mut self) -> bool {
        let had_run = self.consecutive_count > 0;
        self.consecutive_count = 0;
        had_run
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Borrowed access to polled capabilities for one tick.
///
/// Face inference runs at most once per context, so the presence and
/// head-orientation detectors look at the same frame.
pub struct Probes<'a> {
    screen: &'a dyn ScreenProbe,
    face_model: &'a mut dyn FaceModel,
    audio: &'a mut dyn AudioAnalyser,
    stream: Option<&'a StreamView>,
    frame: Option<Result<Vec<Face>, DetectionError>>,
}

impl<'a> Probes<'a> {
    pub fn new(
        screen: &'a dyn ScreenProbe,
        face_model: &'a mut dyn FaceModel,
        audio: &'a mut dyn AudioAnalyser,
        stream: Option<&'a StreamView>,
    ) -> Self {
        Self {
            screen,
            face_model,
            audio,
            stream,
            frame: None,
        }
    }

    pub fn geometry(&self) -> Result<DisplayGeometry, DetectionError> {
        self.screen.geometry()
    }

    /// Faces in the current camera frame.
    pub fn faces(&mut self) -> Result<Vec<Face>, DetectionError> {
        if self.frame.is_none() {
            let result = match self.stream {
                Some(stream) => self.face_model.estimate_faces(stream),
                None => Err(DetectionError::Unavailable("no camera stream".into())),
            };
            self.frame = Some(result);
        }
        self.frame
            .clone()
            .unwrap_or_else(|| Err(DetectionError::Unavailable("no camera frame".into())))
    }

    /// Latest analyser frame from the microphone track.
    pub fn audio(&mut self) -> Result<AudioFrame, DetectionError> {
        match self.stream {
            Some(stream) => self.audio.sample(&stream.audio_only()),
            None => Err(DetectionError::Unavailable("no microphone stream".into())),
        }
    }
}

/// Common detector contract.
pub trait Detector: Send {
    fn kind(&self) -> DetectorKind;

    /// Signal kinds this detector listens to.
    fn subscriptions(&self) -> &'static [SignalKind] {
        &[]
    }

    /// Polling cadence, for polled detectors.
    fn poll_interval_ms(&self) -> Option<u64> {
        None
    }

    fn start(&mut self, _now: DateTime<Utc>) {}

    fn stop(&mut self) {}

    /// Whether the default action of a captured signal should be prevented.
    fn disposition(&self, _signal: &Signal) -> Disposition {
        Disposition::Allow
    }

    fn on_signal(&mut self, _signal: &Signal, _now: DateTime<Utc>) -> Vec<Detection> {
        Vec::new()
    }

    /// Whether a signal should trigger an immediate out-of-schedule poll.
    fn poll_on_signal(&self, _signal: &Signal) -> bool {
        false
    }

    fn poll(&mut self, _probes: &mut Probes<'_>, _now: DateTime<Utc>) -> Vec<Detection> {
        Vec::new()
    }

    fn state(&self) -> &DetectorState;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixed-answer probes for detector tests.

    use super::*;
    use crate::source::media::{MediaStreamHandle, MediaTrack, TrackKind};

    pub struct FixedScreen(pub Result<DisplayGeometry, DetectionError>);

    impl ScreenProbe for FixedScreen {
        fn geometry(&self) -> Result<DisplayGeometry, DetectionError> {
            self.0.clone()
        }
    }

    pub struct FixedFaces {
        pub answer: Result<Vec<Face>, DetectionError>,
        pub calls: usize,
    }

    impl FaceModel for FixedFaces {
        fn estimate_faces(&mut self, _stream: &StreamView) -> Result<Vec<Face>, DetectionError> {
            self.calls += 1;
            self.answer.clone()
        }
    }

    pub struct FixedAudio(pub Result<AudioFrame, DetectionError>);

    impl AudioAnalyser for FixedAudio {
        fn sample(&mut self, _stream: &StreamView) -> Result<AudioFrame, DetectionError> {
            self.0.clone()
        }
    }

    pub fn stream() -> MediaStreamHandle {
        MediaStreamHandle::new(vec![
            MediaTrack::new("video-1", TrackKind::Video),
            MediaTrack::new("audio-2", TrackKind::Audio),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_face_frame_shared_within_tick() {
        let screen = FixedScreen(Ok(DisplayGeometry::default()));
        let mut faces = FixedFaces {
            answer: Ok(vec![Face::default()]),
            calls: 0,
        };
        let mut audio = FixedAudio(Ok(AudioFrame::default()));
        let handle = stream();
        let view = handle.view();

        {
            let mut probes = Probes::new(&screen, &mut faces, &mut audio, Some(&view));
            assert_eq!(probes.faces().unwrap().len(), 1);
            assert_eq!(probes.faces().unwrap().len(), 1);
        }
        assert_eq!(faces.calls, 1);
    }

    #[test]
    fn test_detector_state_run() {
        let mut state = DetectorState::default();
        let now = Utc::now();
        assert_eq!(state.observe(now), 1);
        assert_eq!(state.observe(now), 2);
        assert!(state.clear());
        assert!(!state.clear());
        assert_eq!(state.last_warning_at, Some(now));
    }
}
