//! Restricted keyboard shortcuts and context menu.

use super::{Detection, Detector, DetectorKind, DetectorState, Disposition};
use crate::core::types::{ViolationEvent, ViolationKind};
use crate::source::types::{KeyStroke, Signal, SignalKind};
use chrono::{DateTime, Utc};
use tracing::info;

/// Reason used when a window-switching shortcut ends the session.
pub const SHORTCUT_REASON: &str =
    "You attempted to use keyboard shortcuts to switch tabs or close the window.";

/// How a keystroke is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyVerdict {
    Allowed,
    /// Developer-tools or fullscreen-escape shortcut
    Blocked,
    /// Switches away from or closes the test window
    WindowSwitch,
}

pub fn classify(key: &KeyStroke) -> KeyVerdict {
    if (key.alt && (key.is("Tab") || key.is("F4"))) || (key.ctrl && key.is("w")) {
        return KeyVerdict::WindowSwitch;
    }
    if key.is("Escape") || key.is("F12") {
        return KeyVerdict::Blocked;
    }
    if key.ctrl && key.shift && (key.is("i") || key.is("j") || key.is("c")) {
        return KeyVerdict::Blocked;
    }
    KeyVerdict::Allowed
}

/// Blocks restricted keys and the context menu.
#[derive(Debug, Default)]
pub struct BlockedKeyDetector {
    state: DetectorState,
}

impl BlockedKeyDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Detector for BlockedKeyDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::BlockedKey
    }

    fn subscriptions(&self) -> &'static [SignalKind] {
        &[SignalKind::KeyDown, SignalKind::ContextMenu]
    }

    fn start(&mut self, _now: DateTime<Utc>) {
        self.state.reset();
    }

    fn disposition(&self, signal: &Signal) -> Disposition {
        match signal {
            Signal::ContextMenu => Disposition::Block,
            Signal::KeyDown(key) if classify(key) != KeyVerdict::Allowed => Disposition::Block,
            _ => Disposition::Allow,
        }
    }

    fn on_signal(&mut self, signal: &Signal, now: DateTime<Utc>) -> Vec<Detection> {
        let event = match signal {
            Signal::ContextMenu => ViolationEvent::warn(ViolationKind::ContextMenuAttempt, now),
            Signal::KeyDown(key) => match classify(key) {
                KeyVerdict::Allowed => return Vec::new(),
                KeyVerdict::Blocked => ViolationEvent::warn(ViolationKind::BlockedKeyAttempt, now)
                    .with_detail(key.chord()),
                KeyVerdict::WindowSwitch => {
                    info!(chord = %key.chord(), "window switch shortcut");
                    ViolationEvent::critical(ViolationKind::TabSwitch, now)
                        .with_detail(key.chord())
                        .with_reason(SHORTCUT_REASON)
                }
            },
            _ => return Vec::new(),
        };
        self.state.observe(now);
        vec![Detection::Violation(event)]
    }

    fn state(&self) -> &DetectorState {
        &self.state
    }
}
