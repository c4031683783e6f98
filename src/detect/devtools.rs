//! Developer tools detection.
//!
//! Two heuristics: the outer-minus-inner window delta left by docked
//! devtools, and a console/debugger trap probe that fires when the
//! console evaluates it. The first misfires on narrow or oddly resized
//! windows, so the threshold is configurable.

use super::{Detection, Detector, DetectorKind, DetectorState, Probes};
use crate::config::DevToolsConfig;
use crate::core::types::{ViolationEvent, ViolationKind};
use crate::source::types::{DisplayGeometry, Signal, SignalKind};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub struct DevToolsDetector {
    config: DevToolsConfig,
    state: DetectorState,
    open: bool,
}

impl DevToolsDetector {
    pub fn new(config: DevToolsConfig) -> Self {
        Self {
            config,
            state: DetectorState::default(),
            open: false,
        }
    }

    /// Width and height deltas when either exceeds the threshold.
    pub fn size_delta(&self, geometry: &DisplayGeometry) -> Option<(f64, f64)> {
        let width = geometry.outer_width - geometry.inner_width;
        let height = geometry.outer_height - geometry.inner_height;
        let threshold = self.config.size_threshold_px;
        (width > threshold || height > threshold).then_some((width, height))
    }

    fn violation(&mut self, detail: String, now: DateTime<Utc>) -> Detection {
        self.open = true;
        self.state.observe(now);
        let event = if self.config.strict {
            ViolationEvent::critical(ViolationKind::DevToolsOpened, now)
        } else {
            ViolationEvent::warn(ViolationKind::DevToolsOpened, now)
        };
        Detection::Violation(event.with_detail(detail))
    }
}

impl Detector for DevToolsDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::DevTools
    }

    fn subscriptions(&self) -> &'static [SignalKind] {
        &[SignalKind::ConsoleProbe, SignalKind::Resize]
    }

    fn poll_on_signal(&self, signal: &Signal) -> bool {
        matches!(signal, Signal::Resize)
    }

    fn poll_interval_ms(&self) -> Option<u64> {
        Some(self.config.poll_interval_ms)
    }

    fn start(&mut self, _now: DateTime<Utc>) {
        self.state.reset();
        self.open = false;
    }

    fn on_signal(&mut self, signal: &Signal, now: DateTime<Utc>) -> Vec<Detection> {
        if !matches!(signal, Signal::ConsoleProbeTriggered) {
            return Vec::new();
        }
        if !self.config.trap_enabled {
            debug!("console trap fired but trap detection is disabled");
            return Vec::new();
        }
        warn!("console trap probe fired");
        vec![self.violation("console trap probe fired".into(), now)]
    }

    fn poll(&mut self, probes: &mut Probes<'_>, now: DateTime<Utc>) -> Vec<Detection> {
        let geometry = match probes.geometry() {
            Ok(g) => g,
            Err(e) => {
                return vec![Detection::Diagnostic {
                    source: DetectorKind::DevTools,
                    message: e.to_string(),
                }]
            }
        };

        match self.size_delta(&geometry) {
            Some((width, height)) => vec![self.violation(
                format!("window size delta {width:.0}x{height:.0}px"),
                now,
            )],
            None if self.open => {
                self.open = false;
                self.state.clear();
                vec![Detection::Clear(DetectorKind::DevTools)]
            }
            None => Vec::new(),
        }
    }

    fn state(&self) -> &DetectorState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Severity;
    use crate::detect::testing::*;
    use crate::source::types::{AudioFrame, Face};

    fn poll_with(detector: &mut DevToolsDetector, geometry: DisplayGeometry) -> Vec<Detection> {
        let screen = FixedScreen(Ok(geometry));
        let mut faces = FixedFaces {
            answer: Ok(Vec::<Face>::new()),
            calls: 0,
        };
        let mut audio = FixedAudio(Ok(AudioFrame::default()));
        let mut probes = Probes::new(&screen, &mut faces, &mut audio, None);
        detector.poll(&mut probes, Utc::now())
    }

    #[test]
    fn test_docked_devtools_then_clear() {
        let mut detector = DevToolsDetector::new(DevToolsConfig::default());
        let docked = DisplayGeometry {
            inner_width: 1400.0,
            ..DisplayGeometry::default()
        };

        match &poll_with(&mut detector, docked)[..] {
            [Detection::Violation(event)] => {
                assert_eq!(event.kind, ViolationKind::DevToolsOpened);
                assert_eq!(event.severity, Severity::Critical);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(
            poll_with(&mut detector, DisplayGeometry::default()),
            vec![Detection::Clear(DetectorKind::DevTools)]
        );
        assert!(poll_with(&mut detector, DisplayGeometry::default()).is_empty());
    }

    #[test]
    fn test_threshold_is_tunable() {
        let geometry = DisplayGeometry {
            outer_height: 1280.0,
            ..DisplayGeometry::default()
        };
        let mut lenient = DevToolsDetector::new(DevToolsConfig {
            size_threshold_px: 300.0,
            ..DevToolsConfig::default()
        });
        assert!(poll_with(&mut lenient, geometry.clone()).is_empty());

        let mut strict = DevToolsDetector::new(DevToolsConfig::default());
        assert_eq!(poll_with(&mut strict, geometry).len(), 1);
    }

    #[test]
    fn test_trap_can_be_disabled() {
        let now = Utc::now();
        let mut detector = DevToolsDetector::new(DevToolsConfig {
            trap_enabled: false,
            strict: false,
            ..DevToolsConfig::default()
        });
        assert!(detector
            .on_signal(&Signal::ConsoleProbeTriggered, now)
            .is_empty());

        let mut detector = DevToolsDetector::new(DevToolsConfig {
            strict: false,
            ..DevToolsConfig::default()
        });
        match &detector.on_signal(&Signal::ConsoleProbeTriggered, now)[..] {
            [Detection::Violation(event)] => assert_eq!(event.severity, Severity::Warn),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
