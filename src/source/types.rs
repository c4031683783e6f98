//! Normalized browser signal and sample types.
//!
//! Raw browser callbacks are reduced to these shapes before any detector
//! sees them. Vendor-specific variance stays behind the adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discrete browser event relevant to session integrity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// Fullscreen state changed (any vendor-prefixed change event)
    FullscreenChanged { active: bool },
    /// Page visibility changed
    VisibilityChanged { hidden: bool },
    /// The window lost focus
    WindowBlur,
    /// The window regained focus
    WindowFocus,
    /// A keydown captured before the page handles it
    KeyDown(KeyStroke),
    /// A context menu was requested
    ContextMenu,
    /// The window was resized
    Resize,
    /// The console/debugger trap probe fired
    ConsoleProbeTriggered,
}

/// Listener categories a signal can be delivered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Fullscreen,
    Visibility,
    Blur,
    Focus,
    KeyDown,
    ContextMenu,
    Resize,
    ConsoleProbe,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::FullscreenChanged { .. } => SignalKind::Fullscreen,
            Signal::VisibilityChanged { .. } => SignalKind::Visibility,
            Signal::WindowBlur => SignalKind::Blur,
            Signal::WindowFocus => SignalKind::Focus,
            Signal::KeyDown(_) => SignalKind::KeyDown,
            Signal::ContextMenu => SignalKind::ContextMenu,
            Signal::Resize => SignalKind::Resize,
            Signal::ConsoleProbeTriggered => SignalKind::ConsoleProbe,
        }
    }
}

/// A key press with its modifier state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStroke {
    /// `KeyboardEvent.key` value, e.g. "Escape", "F12", "i"
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyStroke {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Case-insensitive key comparison.
    pub fn is(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }

    /// Human-readable chord such as `Ctrl+Shift+I`.
    pub fn chord(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("Ctrl".to_string());
        }
        if self.alt {
            parts.push("Alt".to_string());
        }
        if self.shift {
            parts.push("Shift".to_string());
        }
        if self.meta {
            parts.push("Meta".to_string());
        }
        if self.key.chars().count() == 1 {
            parts.push(self.key.to_uppercase());
        } else {
            parts.push(self.key.clone());
        }
        parts.join("+")
    }
}

/// A signal stamped with the time it was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub at: DateTime<Utc>,
    pub signal: Signal,
}

impl SignalEnvelope {
    pub fn new(signal: Signal) -> Self {
        Self {
            at: Utc::now(),
            signal,
        }
    }

    pub fn at(at: DateTime<Utc>, signal: Signal) -> Self {
        Self { at, signal }
    }
}

/// Screen and window geometry as reported by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub screen_width: f64,
    pub screen_height: f64,
    pub avail_width: f64,
    pub avail_height: f64,
    pub inner_width: f64,
    pub inner_height: f64,
    pub outer_width: f64,
    pub outer_height: f64,
    pub device_pixel_ratio: f64,
    /// `screen.isExtended`, absent where the API is unavailable
    #[serde(default)]
    pub is_extended: Option<bool>,
    /// Result of the device-pixel-ratio media query, absent without `matchMedia`
    #[serde(default)]
    pub media_query_matches: Option<bool>,
}

impl Default for DisplayGeometry {
    /// A single 1920x1080 display with a maximized browser window.
    fn default() -> Self {
        Self {
            screen_width: 1920.0,
            screen_height: 1080.0,
            avail_width: 1920.0,
            avail_height: 1040.0,
            inner_width: 1920.0,
            inner_height: 1080.0,
            outer_width: 1920.0,
            outer_height: 1080.0,
            device_pixel_ratio: 1.0,
            is_extended: None,
            media_query_matches: None,
        }
    }
}

/// A named facial landmark in frame coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub name: Option<String>,
}

impl Keypoint {
    pub fn named(name: &str, x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            name: Some(name.to_string()),
        }
    }
}

/// Face bounding box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x_min: f64,
    pub y_min: f64,
    pub width: f64,
    pub height: f64,
}

/// One face returned by the face-detection model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Face {
    #[serde(default)]
    pub bounding_box: FaceBox,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub keypoints: Vec<Keypoint>,
}

impl Face {
    /// Look up a keypoint by model name (e.g. `noseTip`, `leftEye`).
    pub fn keypoint(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints
            .iter()
            .find(|k| k.name.as_deref() == Some(name))
    }
}

/// One analyser read of the microphone track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// `getByteFrequencyData` output (0-255 per bin)
    #[serde(default)]
    pub frequency: Vec<u8>,
    /// `getFloatTimeDomainData` output (-1.0..1.0)
    #[serde(default)]
    pub time_domain: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_json_shape() {
        let signal: Signal =
            serde_json::from_str(r#"{"type":"key_down","key":"I","ctrl":true,"shift":true}"#)
                .unwrap();
        match signal {
            Signal::KeyDown(ref stroke) => {
                assert!(stroke.is("i"));
                assert_eq!(stroke.chord(), "Ctrl+Shift+I");
            }
            _ => panic!("expected key_down"),
        }
        assert_eq!(signal.kind(), SignalKind::KeyDown);

        let blur: Signal = serde_json::from_str(r#"{"type":"window_blur"}"#).unwrap();
        assert_eq!(blur, Signal::WindowBlur);
    }

    #[test]
    fn test_face_keypoint_lookup() {
        let face = Face {
            keypoints: vec![
                Keypoint::named("leftEye", 100.0, 50.0),
                Keypoint::named("noseTip", 110.0, 70.0),
            ],
            ..Face::default()
        };
        assert_eq!(face.keypoint("noseTip").map(|k| k.x), Some(110.0));
        assert!(face.keypoint("rightEye").is_none());
    }
}
