//! External display detection.
//!
//! Six independent heuristics over the reported geometry. The result is
//! the OR of all of them except the media query, which only corroborates
//! a detection another method already made.

use super::{Detection, Detector, DetectorKind, DetectorState, Probes};
use crate::config::DisplayConfig;
use crate::core::types::{ViolationEvent, ViolationKind};
use crate::source::platform::DetectionError;
use crate::source::types::{DisplayGeometry, Signal, SignalKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single heuristic, kept for operator diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: String,
    pub result: bool,
    pub details: String,
}

impl MethodResult {
    fn new(method: &str, result: bool, details: String) -> Self {
        Self {
            method: method.to_string(),
            result,
            details,
        }
    }
}

/// Fused outcome of all heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayAssessment {
    pub detected: bool,
    pub methods: Vec<MethodResult>,
}

impl DisplayAssessment {
    /// One line per method, for a debug panel or log.
    pub fn debug_lines(&self) -> Vec<String> {
        self.methods
            .iter()
            .map(|m| {
                let mark = if m.result { "yes" } else { "no" };
                format!("{}: {} - {}", m.method, mark, m.details)
            })
            .collect()
    }
}

/// Evaluate every heuristic against one geometry sample.
pub fn evaluate(
    geometry: &DisplayGeometry,
    config: &DisplayConfig,
) -> Result<DisplayAssessment, DetectionError> {
    let g = geometry;
    if g.inner_width <= 0.0 || g.inner_height <= 0.0 {
        return Err(DetectionError::Ambiguous(format!(
            "window reports {}x{} inner size",
            g.inner_width, g.inner_height
        )));
    }

    let mut methods = Vec::with_capacity(6);
    let limit = config.ratio_threshold;

    let (wr, hr) = (g.screen_width / g.inner_width, g.screen_height / g.inner_height);
    methods.push(MethodResult::new(
        "screen_ratio",
        wr > limit || hr > limit,
        format!(
            "screen {}x{}, window {}x{}, ratios {wr:.2}/{hr:.2}",
            g.screen_width, g.screen_height, g.inner_width, g.inner_height
        ),
    ));

    let (awr, ahr) = (g.avail_width / g.inner_width, g.avail_height / g.inner_height);
    methods.push(MethodResult::new(
        "avail_ratio",
        awr > limit || ahr > limit,
        format!(
            "available {}x{}, ratios {awr:.2}/{ahr:.2}",
            g.avail_width, g.avail_height
        ),
    ));

    let (wd, hd) = (
        (g.screen_width - g.avail_width).abs(),
        (g.screen_height - g.avail_height).abs(),
    );
    methods.push(MethodResult::new(
        "avail_diff",
        wd > config.avail_diff_px || hd > config.avail_diff_px,
        format!("differences {wd}/{hd}px"),
    ));

    let dpr = g.device_pixel_ratio;
    methods.push(MethodResult::new(
        "pixel_ratio",
        dpr < config.min_pixel_ratio || dpr > config.max_pixel_ratio,
        format!("device pixel ratio {dpr}"),
    ));

    methods.push(match g.is_extended {
        Some(extended) => MethodResult::new("is_extended", extended, format!("isExtended {extended}")),
        None => MethodResult::new("is_extended", false, "API not available".into()),
    });

    let primary = methods.iter().any(|m| m.result);

    methods.push(match g.media_query_matches {
        Some(matches) => MethodResult::new(
            "media_query",
            matches,
            if primary || !matches {
                format!("matches {matches}")
            } else {
                format!("matches {matches}, ignored without corroboration")
            },
        ),
        None => MethodResult::new("media_query", false, "matchMedia not available".into()),
    });

    Ok(DisplayAssessment {
        detected: primary,
        methods,
    })
}

/// Periodic external display check while the session is active.
///
/// The entry check is driven by the monitor via [`evaluate`]; this
/// detector covers displays attached after the session started.
pub struct ExternalDisplayDetector {
    config: DisplayConfig,
    state: DetectorState,
    detected: bool,
}

impl ExternalDisplayDetector {
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            config,
            state: DetectorState::default(),
            detected: false,
        }
    }

    fn check(&mut self, probes: &mut Probes<'_>, now: DateTime<Utc>) -> Vec<Detection> {
        let assessment = match probes.geometry().and_then(|g| evaluate(&g, &self.config)) {
            Ok(a) => a,
            Err(e) => {
                return vec![Detection::Diagnostic {
                    source: DetectorKind::ExternalDisplay,
                    message: e.to_string(),
                }]
            }
        };

        let detected = assessment.detected;
        let detail = assessment
            .methods
            .iter()
            .filter(|m| m.result)
            .map(|m| m.method.as_str())
            .collect::<Vec<_>>()
            .join(",");

        if detected {
            self.detected = true;
            self.state.observe(now);
            vec![Detection::Violation(
                ViolationEvent::warn(ViolationKind::ExternalDisplay, now).with_detail(detail),
            )]
        } else if self.detected {
            self.detected = false;
            self.state.clear();
            vec![Detection::Clear(DetectorKind::ExternalDisplay)]
        } else {
            Vec::new()
        }
    }
}

impl Detector for ExternalDisplayDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ExternalDisplay
    }

    fn subscriptions(&self) -> &'static [SignalKind] {
        &[SignalKind::Resize]
    }

    fn poll_interval_ms(&self) -> Option<u64> {
        Some(self.config.poll_interval_ms)
    }

    fn start(&mut self, _now: DateTime<Utc>) {
        self.state.reset();
        self.detected = false;
    }

    fn poll_on_signal(&self, signal: &Signal) -> bool {
        matches!(signal, Signal::Resize)
    }

    fn poll(&mut self, probes: &mut Probes<'_>, now: DateTime<Utc>) -> Vec<Detection> {
        self.check(probes, now)
    }

    fn state(&self) -> &DetectorState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DisplayConfig {
        DisplayConfig::default()
    }

    #[test]
    fn test_single_display_is_clear() {
        let assessment = evaluate(&DisplayGeometry::default(), &config()).unwrap();
        assert!(!assessment.detected);
        assert_eq!(assessment.methods.len(), 6);
    }

    #[test]
    fn test_half_width_window_detects() {
        let geometry = DisplayGeometry {
            inner_width: 960.0,
            is_extended: None,
            ..DisplayGeometry::default()
        };
        let assessment = evaluate(&geometry, &config()).unwrap();
        assert!(assessment.detected);
        assert!(assessment.methods[0].result);
        assert_eq!(assessment.methods[4].details, "API not available");
    }

    #[test]
    fn test_media_query_alone_does_not_detect() {
        let geometry = DisplayGeometry {
            media_query_matches: Some(true),
            ..DisplayGeometry::default()
        };
        let assessment = evaluate(&geometry, &config()).unwrap();
        assert!(!assessment.detected);
        assert!(assessment.methods[5].result);
        assert!(assessment.methods[5].details.contains("ignored"));
    }

    #[test]
    fn test_is_extended_detects() {
        let geometry = DisplayGeometry {
            is_extended: Some(true),
            ..DisplayGeometry::default()
        };
        assert!(evaluate(&geometry, &config()).unwrap().detected);
    }

    #[test]
    fn test_pixel_ratio_and_avail_diff() {
        let hidpi = DisplayGeometry {
            device_pixel_ratio: 2.0,
            ..DisplayGeometry::default()
        };
        assert!(evaluate(&hidpi, &config()).unwrap().detected);

        let taskbar = DisplayGeometry {
            avail_height: 800.0,
            ..DisplayGeometry::default()
        };
        let assessment = evaluate(&taskbar, &config()).unwrap();
        assert!(assessment.methods[2].result);
    }

    #[test]
    fn test_zero_window_is_ambiguous() {
        let geometry = DisplayGeometry {
            inner_width: 0.0,
            ..DisplayGeometry::default()
        };
        assert!(matches!(
            evaluate(&geometry, &config()),
            Err(DetectionError::Ambiguous(_))
        ));
    }

    #[test]
    fn test_debug_lines() {
        let assessment = evaluate(&DisplayGeometry::default(), &config()).unwrap();
        let lines = assessment.debug_lines();
        assert!(lines[0].starts_with("screen_ratio: no"));
    }
}
