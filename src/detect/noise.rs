//! Ambient noise from the microphone analyser.

use super::{Detection, Detector, DetectorKind, DetectorState, Probes};
use crate::config::{NoiseConfig, NoiseMeasure};
use crate::core::types::{ViolationEvent, ViolationKind};
use crate::source::types::AudioFrame;
use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;

/// Offset keeping the dB conversion finite on digital silence.
const DB_FLOOR: f64 = 1e-5;

/// Mean byte amplitude across frequency bins.
pub fn average_amplitude(frame: &AudioFrame) -> Option<f64> {
    if frame.frequency.is_empty() {
        return None;
    }
    Some(frame.frequency.iter().map(|&b| b as f64).mean())
}

/// RMS of the time-domain buffer in dBFS.
pub fn rms_decibels(frame: &AudioFrame) -> Option<f64> {
    if frame.time_domain.is_empty() {
        return None;
    }
    let rms = frame.time_domain.iter().quadratic_mean();
    Some(20.0 * (rms + DB_FLOOR).log10())
}

/// Loudness of a frame and whether it exceeds the configured threshold.
pub fn measure(frame: &AudioFrame, measure: &NoiseMeasure) -> Option<(f64, bool)> {
    match *measure {
        NoiseMeasure::AverageAmplitude { threshold } => {
            average_amplitude(frame).map(|level| (level, level > threshold))
        }
        NoiseMeasure::RmsDecibels { threshold_db } => {
            rms_decibels(frame).map(|level| (level, level > threshold_db))
        }
    }
}

pub struct AmbientNoiseDetector {
    config: NoiseConfig,
    state: DetectorState,
}

impl AmbientNoiseDetector {
    pub fn new(config: NoiseConfig) -> Self {
        Self {
            config,
            state: DetectorState::default(),
        }
    }
}

impl Detector for AmbientNoiseDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::AmbientNoise
    }

    fn poll_interval_ms(&self) -> Option<u64> {
        Some(self.config.sample_interval_ms)
    }

    fn start(&mut self, _now: DateTime<Utc>) {
        self.state.reset();
    }

    fn poll(&mut self, probes: &mut Probes<'_>, now: DateTime<Utc>) -> Vec<Detection> {
        let frame = match probes.audio() {
            Ok(frame) => frame,
            Err(e) => {
                return vec![Detection::Diagnostic {
                    source: DetectorKind::AmbientNoise,
                    message: e.to_string(),
                }]
            }
        };

        match measure(&frame, &self.config.measure) {
            Some((level, true)) => {
                self.state.observe(now);
                vec![Detection::Violation(
                    ViolationEvent::warn(ViolationKind::ExcessiveNoise, now)
                        .with_detail(format!("level {level:.1}")),
                )]
            }
            Some((_, false)) if self.state.clear() => {
                vec![Detection::Clear(DetectorKind::AmbientNoise)]
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
    fn test_average_amplitude() {
        let quiet = AudioFrame {
            frequency: vec![10, 20, 30],
            ..AudioFrame::default()
        };
        let loud = AudioFrame {
            frequency: vec![80, 90, 100],
            ..AudioFrame::default()
        };
        let m = NoiseMeasure::AverageAmplitude { threshold: 50.0 };
        assert_eq!(measure(&quiet, &m), Some((20.0, false)));
        assert_eq!(measure(&loud, &m), Some((90.0, true)));
        assert_eq!(measure(&AudioFrame::default(), &m), None);
    }

    #[test]
    fn test_rms_decibels() {
        let m = NoiseMeasure::RmsDecibels { threshold_db: -50.0 };
        let silence = AudioFrame {
            time_domain: vec![0.0; 128],
            ..AudioFrame::default()
        };
        let (level, loud) = measure(&silence, &m).unwrap();
        assert!((level - -100.0).abs() < 1e-6);
        assert!(!loud);

        let speech = AudioFrame {
            time_domain: vec![0.1, -0.1, 0.1, -0.1],
            ..AudioFrame::default()
        };
        let (level, loud) = measure(&speech, &m).unwrap();
        assert!((level - -20.0).abs() < 0.01);
        assert!(loud);
    }
}
