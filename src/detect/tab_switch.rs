//! Tab switch and focus loss detection.

use super::{Detection, Detector, DetectorKind, DetectorState};
use crate::core::types::{ViolationEvent, ViolationKind};
use crate::source::types::{Signal, SignalKind};
use chrono::{DateTime, Utc};

/// Hidden page → `TabSwitch`; window blur → `WindowBlur`. Every occurrence counts.
#[derive(Debug, Default)]
pub struct TabSwitchDetector {
    state: DetectorState,
}

impl TabSwitchDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn violation(&mut self, kind: ViolationKind, now: DateTime<Utc>) -> Vec<Detection> {
        self.state.observe(now);
        vec![Detection::Violation(ViolationEvent::warn(kind, now))]
    }
}

impl Detector for TabSwitchDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::TabSwitch
    }

    fn subscriptions(&self) -> &'static [SignalKind] {
        &[SignalKind::Visibility, SignalKind::Blur, SignalKind::Focus]
    }

    fn start(&mut self, _now: DateTime<Utc>) {
        self.state.reset();
    }

    fn on_signal(&mut self, signal: &Signal, now: DateTime<Utc>) -> Vec<Detection> {
        match signal {
            Signal::VisibilityChanged { hidden: true } => {
                self.violation(ViolationKind::TabSwitch, now)
            }
            Signal::WindowBlur => self.violation(ViolationKind::WindowBlur, now),
            Signal::VisibilityChanged { hidden: false } | Signal::WindowFocus => {
                if self.state.clear() {
                    vec![Detection::Clear(DetectorKind::TabSwitch)]
                } else {
                    Vec::new()
                }
            }
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
    fn test_hidden_and_blur() {
        let now = Utc::now();
        let mut detector = TabSwitchDetector::new();
        detector.start(now);

        let kinds: Vec<ViolationKind> = [
            Signal::VisibilityChanged { hidden: true },
            Signal::WindowBlur,
        ]
        .iter()
        .flat_map(|s| detector.on_signal(s, now))
        .filter_map(|d| match d {
            Detection::Violation(e) => Some(e.kind),
            _ => None,
        })
        .collect();
        assert_eq!(kinds, vec![ViolationKind::TabSwitch, ViolationKind::WindowBlur]);

        assert_eq!(detector.on_signal(&Signal::WindowFocus, now).len(), 1);
        assert!(detector
            .on_signal(&Signal::VisibilityChanged { hidden: false }, now)
            .is_empty());
    }
}
