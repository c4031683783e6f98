//! Head orientation from face keypoints.

use super::{Detection, Detector, DetectorKind, DetectorState, Probes};
use crate::core::types::{ViolationEvent, ViolationKind};
use crate::source::types::Face;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keypoint names emitted by the face-detection model.
pub const NOSE_TIP: &str = "noseTip";
pub const LEFT_EYE: &str = "leftEye";
pub const RIGHT_EYE: &str = "rightEye";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadOrientation {
    Straight,
    Left,
    Right,
}

impl HeadOrientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeadOrientation::Straight => "straight",
            HeadOrientation::Left => "left",
            HeadOrientation::Right => "right",
        }
    }
}

/// Nose offset from the eye-line midpoint, normalized by eye distance.
///
/// `None` when a keypoint is missing or the eyes coincide.
pub fn normalized_offset(face: &Face) -> Option<f64> {
    let nose = face.keypoint(NOSE_TIP)?;
    let left = face.keypoint(LEFT_EYE)?;
    let right = face.keypoint(RIGHT_EYE)?;

    let center_x = (left.x + right.x) / 2.0;
    let width = (left.x - right.x).abs();
    if width == 0.0 {
        return None;
    }
    Some((nose.x - center_x) / width)
}

/// Classify a face as looking straight, left or right.
///
/// Incomplete keypoints classify as straight: a bad frame never counts
/// against the candidate.
pub fn estimate_orientation(face: &Face, threshold: f64) -> HeadOrientation {
    match normalized_offset(face) {
        Some(offset) if offset > threshold => HeadOrientation::Left,
        Some(offset) if offset < -threshold => HeadOrientation::Right,
        _ => HeadOrientation::Straight,
    }
}

/// Reports a turned head on frames with exactly one face.
pub struct HeadOrientationDetector {
    threshold: f64,
    interval_ms: u64,
    state: DetectorState,
}

impl HeadOrientationDetector {
    pub fn new(threshold: f64, interval_ms: u64) -> Self {
        Self {
            threshold,
            interval_ms,
            state: DetectorState::default(),
        }
    }
}

impl Detector for HeadOrientationDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::HeadOrientation
    }

    fn poll_interval_ms(&self) -> Option<u64> {
        Some(self.interval_ms)
    }

    fn start(&mut self, _now: DateTime<Utc>) {
        self.state.reset();
    }

    fn poll(&mut self, probes: &mut Probes<'_>, now: DateTime<Utc>) -> Vec<Detection> {
        // Presence problems and inference errors belong to the presence detector.
        let faces = match probes.faces() {
            Ok(faces) if faces.len() == 1 => faces,
            _ => return Vec::new(),
        };

        match estimate_orientation(&faces[0], self.threshold) {
            HeadOrientation::Straight => {
                if self.state.clear() {
                    vec![Detection::Clear(DetectorKind::HeadOrientation)]
                } else {
                    Vec::new()
                }
            }
            turned => {
                self.state.observe(now);
                vec![Detection::Violation(
                    ViolationEvent::warn(ViolationKind::HeadTurned, now)
                        .with_detail(format!("looking {}", turned.as_str())),
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
    use crate::source::types::Keypoint;

    fn face(nose: f64, left: f64, right: f64) -> Face {
        Face {
            keypoints: vec![
                Keypoint::named(NOSE_TIP, nose, 50.0),
                Keypoint::named(LEFT_EYE, left, 40.0),
                Keypoint::named(RIGHT_EYE, right, 40.0),
            ],
            ..Face::default()
        }
    }

    #[test]
    fn test_offset_classifies_right() {
        let f = face(110.0, 100.0, 140.0);
        assert_eq!(normalized_offset(&f), Some(-0.25));
        assert_eq!(estimate_orientation(&f, 0.1), HeadOrientation::Right);
    }

    #[test]
    fn test_left_and_straight() {
        assert_eq!(
            estimate_orientation(&face(130.0, 100.0, 140.0), 0.1),
            HeadOrientation::Left
        );
        assert_eq!(
            estimate_orientation(&face(122.0, 100.0, 140.0), 0.1),
            HeadOrientation::Straight
        );
    }

    #[test]
    fn test_missing_keypoints_are_straight() {
        let mut f = face(10.0, 100.0, 140.0);
        f.keypoints.remove(0);
        assert_eq!(estimate_orientation(&f, 0.1), HeadOrientation::Straight);

        let coincident = face(300.0, 100.0, 100.0);
        assert_eq!(normalized_offset(&coincident), None);
        assert_eq!(
            estimate_orientation(&coincident, 0.1),
            HeadOrientation::Straight
        );
    }
}
