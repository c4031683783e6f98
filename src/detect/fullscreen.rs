//! Fullscreen exit detection.

use super::{Detection, Detector, DetectorKind, DetectorState};
use crate::core::types::{ViolationEvent, ViolationKind};
use crate::source::types::{Signal, SignalKind};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Reports each exit from fullscreen; re-entry clears.
#[derive(Debug, Default)]
pub struct FullscreenExitDetector {
    state: DetectorState,
    in_fullscreen: bool,
}

impl FullscreenExitDetector {
    /// `in_fullscreen` is the browser's state when the detector is built.
    pub fn new(in_fullscreen: bool) -> Self {
        Self {
            state: DetectorState::default(),
            in_fullscreen,
        }
    }
}

impl Detector for FullscreenExitDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::FullscreenExit
    }

    fn subscriptions(&self) -> &'static [SignalKind] {
        &[SignalKind::Fullscreen]
    }

    fn start(&mut self, _now: DateTime<Utc>) {
        self.state.reset();
    }

    fn stop(&mut self) {
        self.in_fullscreen = false;
    }

    fn on_signal(&mut self, signal: &Signal, now: DateTime<Utc>) -> Vec<Detection> {
        let Signal::FullscreenChanged { active } = signal else {
            return Vec::new();
        };

        match (*active, self.in_fullscreen) {
            (false, true) => {
                self.in_fullscreen = false;
                let run = self.state.observe(now);
                debug!(exits = run, "fullscreen exited");
                vec![Detection::Violation(ViolationEvent::warn(
                    ViolationKind::FullscreenExit,
                    now,
                ))]
            }
            (true, false) => {
                self.in_fullscreen = true;
                vec![Detection::Clear(DetectorKind::FullscreenExit)]
            }
            // Duplicate change events from several vendor listeners.
            _ => Vec::new(),
        }
    }

    fn state(&self) -> &DetectorState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_and_reenter() {
        let now = Utc::now();
        let mut detector = FullscreenExitDetector::new(true);
        detector.start(now);

        let exit = Signal::FullscreenChanged { active: false };
        let enter = Signal::FullscreenChanged { active: true };

        assert!(matches!(
            detector.on_signal(&exit, now)[..],
            [Detection::Violation(ViolationEvent {
                kind: ViolationKind::FullscreenExit,
                ..
            })]
        ));
        assert!(detector.on_signal(&exit, now).is_empty());
        assert_eq!(
            detector.on_signal(&enter, now),
            vec![Detection::Clear(DetectorKind::FullscreenExit)]
        );
        assert_eq!(detector.on_signal(&exit, now).len(), 1);
        assert_eq!(detector.state().consecutive_count, 2);
    }

    #[test]
    fn test_started_outside_fullscreen() {
        let now = Utc::now();
        let mut detector = FullscreenExitDetector::new(false);
        detector.start(now);

        assert!(detector
            .on_signal(&Signal::FullscreenChanged { active: false }, now)
            .is_empty());
        assert_eq!(
            detector.on_signal(&Signal::FullscreenChanged { active: true }, now),
            vec![Detection::Clear(DetectorKind::FullscreenExit)]
        );
    }
}
