//! Face presence over the shared camera stream.

use super::{Detection, Detector, DetectorKind, DetectorState, Probes};
use crate::config::FaceConfig;
use crate::core::types::{ViolationEvent, ViolationKind};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// No face → `NoFace`, several → `MultipleFaces`, exactly one → clear.
///
/// Inference failures are reported as diagnostics only; a bad frame is
/// never held against the candidate.
pub struct FacePresenceDetector {
    config: FaceConfig,
    state: DetectorState,
    no_face_since: Option<DateTime<Utc>>,
}

impl FacePresenceDetector {
    pub fn new(config: FaceConfig) -> Self {
        Self {
            config,
            state: DetectorState::default(),
            no_face_since: None,
        }
    }
}

impl Detector for FacePresenceDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::FacePresence
    }

    fn poll_interval_ms(&self) -> Option<u64> {
        Some(self.config.poll_interval_ms)
    }

    fn start(&mut self, _now: DateTime<Utc>) {
        self.state.reset();
        self.no_face_since = None;
    }

    fn poll(&mut self, probes: &mut Probes<'_>, now: DateTime<Utc>) -> Vec<Detection> {
        let faces = match probes.faces() {
            Ok(faces) => faces,
            Err(e) => {
                debug!(error = %e, "face inference skipped");
                return vec![Detection::Diagnostic {
                    source: DetectorKind::FacePresence,
                    message: e.to_string(),
                }];
            }
        };

        match faces.len() {
            0 => {
                let since = *self.no_face_since.get_or_insert(now);
                let grace = Duration::milliseconds(self.config.no_face_grace_ms as i64);
                if now - since < grace {
                    return Vec::new();
                }
                self.state.observe(now);
                vec![Detection::Violation(ViolationEvent::warn(
                    ViolationKind::NoFace,
                    now,
                ))]
            }
            1 => {
                self.no_face_since = None;
                if self.state.clear() {
                    vec![Detection::Clear(DetectorKind::FacePresence)]
                } else {
                    Vec::new()
                }
            }
            n => {
                self.no_face_since = None;
                self.state.observe(now);
                vec![Detection::Violation(
                    ViolationEvent::warn(ViolationKind::MultipleFaces, now)
                        .with_detail(format!("{n} faces in frame")),
                )]
            }
        }
    }

    fn state(&self) -> &DetectorState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::testing::*;
    use crate::source::platform::DetectionError;
    use crate::source::types::{AudioFrame, DisplayGeometry, Face};

    fn poll_with(
        detector: &mut FacePresenceDetector,
        answer: Result<Vec<Face>, DetectionError>,
        now: DateTime<Utc>,
    ) -> Vec<Detection> {
        let screen = FixedScreen(Ok(DisplayGeometry::default()));
        let mut faces = FixedFaces { answer, calls: 0 };
        let mut audio = FixedAudio(Ok(AudioFrame::default()));
        let handle = stream();
        let view = handle.view();
        let mut probes = Probes::new(&screen, &mut faces, &mut audio, Some(&view));
        detector.poll(&mut probes, now)
    }

    fn kinds(detections: &[Detection]) -> Vec<ViolationKind> {
        detections
            .iter()
            .filter_map(|d| match d {
                Detection::Violation(e) => Some(e.kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_presence_classification() {
        let now = Utc::now();
        let mut detector = FacePresenceDetector::new(FaceConfig::default());

        assert_eq!(
            kinds(&poll_with(&mut detector, Ok(vec![]), now)),
            vec![ViolationKind::NoFace]
        );
        assert_eq!(
            kinds(&poll_with(&mut detector, Ok(vec![Face::default(); 2]), now)),
            vec![ViolationKind::MultipleFaces]
        );
        assert_eq!(
            poll_with(&mut detector, Ok(vec![Face::default()]), now),
            vec![Detection::Clear(DetectorKind::FacePresence)]
        );
    }

    #[test]
    fn test_inference_error_is_diagnostic() {
        let mut detector = FacePresenceDetector::new(FaceConfig::default());
        let out = poll_with(
            &mut detector,
            Err(DetectionError::Ambiguous("webgl context lost".into())),
            Utc::now(),
        );
        assert!(matches!(out[..], [Detection::Diagnostic { .. }]));
        assert_eq!(detector.state().consecutive_count, 0);
    }

    #[test]
    fn test_no_face_grace_period() {
        let t0 = Utc::now();
        let mut detector = FacePresenceDetector::new(FaceConfig {
            no_face_grace_ms: 2000,
            ..FaceConfig::default()
        });
        assert!(poll_with(&mut detector, Ok(vec![]), t0).is_empty());
        assert!(poll_with(&mut detector, Ok(vec![]), t0 + Duration::seconds(1)).is_empty());
        assert_eq!(
            kinds(&poll_with(&mut detector, Ok(vec![]), t0 + Duration::seconds(2))),
            vec![ViolationKind::NoFace]
        );
    }
}
