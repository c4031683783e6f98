//! Violation data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The concern a violation was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    FullscreenExit,
    TabSwitch,
    WindowBlur,
    DevToolsOpened,
    ExternalDisplay,
    NoFace,
    MultipleFaces,
    HeadTurned,
    ExcessiveNoise,
    BlockedKeyAttempt,
    ContextMenuAttempt,
    /// Camera or microphone access refused
    DevicePermissionDenied,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 12] = [
        ViolationKind::FullscreenExit,
        ViolationKind::TabSwitch,
        ViolationKind::WindowBlur,
        ViolationKind::DevToolsOpened,
        ViolationKind::ExternalDisplay,
        ViolationKind::NoFace,
        ViolationKind::MultipleFaces,
        ViolationKind::HeadTurned,
        ViolationKind::ExcessiveNoise,
        ViolationKind::BlockedKeyAttempt,
        ViolationKind::ContextMenuAttempt,
        ViolationKind::DevicePermissionDenied,
    ];

    /// Reason shown to the candidate when this kind ends the session.
    pub fn termination_reason(&self) -> &'static str {
        match self {
            ViolationKind::FullscreenExit => "You exited full screen mode multiple times.",
            ViolationKind::TabSwitch => "You switched to another tab or minimized the window.",
            ViolationKind::WindowBlur => "You switched focus away from the test window.",
            ViolationKind::DevToolsOpened => "Developer tools were opened during the test.",
            ViolationKind::ExternalDisplay => {
                "External display detected during the test. This is not allowed for security reasons."
            }
            ViolationKind::NoFace => "Too many no-face detections. Please stay in camera view.",
            ViolationKind::MultipleFaces => "Too many multiple-face detections.",
            ViolationKind::HeadTurned => "You repeatedly looked away from the screen.",
            ViolationKind::ExcessiveNoise => "Excessive background noise detected.",
            ViolationKind::BlockedKeyAttempt | ViolationKind::ContextMenuAttempt => {
                "You repeatedly attempted to use restricted browser features."
            }
            ViolationKind::DevicePermissionDenied => {
                "Camera or microphone access was denied during the test."
            }
        }
    }

    /// Short title and guidance for a counted warning.
    pub fn warning_text(&self) -> (&'static str, &'static str) {
        match self {
            ViolationKind::FullscreenExit => (
                "Full screen mode required",
                "Please return to full screen mode to continue with your test.",
            ),
            ViolationKind::TabSwitch | ViolationKind::WindowBlur => (
                "Tab switch detected",
                "Switching tabs is not allowed during the test.",
            ),
            ViolationKind::DevToolsOpened => (
                "Developer tools detected",
                "Developer tools access is prohibited during the test.",
            ),
            ViolationKind::ExternalDisplay => (
                "External display detected",
                "Disconnect all external monitors from your device.",
            ),
            ViolationKind::NoFace => ("No face detected", "Please stay in the camera view."),
            ViolationKind::MultipleFaces => (
                "Multiple faces detected",
                "Only one person is allowed during the test.",
            ),
            ViolationKind::HeadTurned => (
                "Looking away detected",
                "Please keep your eyes on the screen.",
            ),
            ViolationKind::ExcessiveNoise => (
                "Audio detected",
                "Please avoid making noise during the test.",
            ),
            ViolationKind::BlockedKeyAttempt | ViolationKind::ContextMenuAttempt => (
                "This action is not allowed during the test",
                "Developer tools access is restricted in secure test mode.",
            ),
            ViolationKind::DevicePermissionDenied => (
                "Camera or microphone access denied",
                "Proctoring requires access to your camera and microphone.",
            ),
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ViolationKind::FullscreenExit => "fullscreen_exit",
            ViolationKind::TabSwitch => "tab_switch",
            ViolationKind::WindowBlur => "window_blur",
            ViolationKind::DevToolsOpened => "devtools_opened",
            ViolationKind::ExternalDisplay => "external_display",
            ViolationKind::NoFace => "no_face",
            ViolationKind::MultipleFaces => "multiple_faces",
            ViolationKind::HeadTurned => "head_turned",
            ViolationKind::ExcessiveNoise => "excessive_noise",
            ViolationKind::BlockedKeyAttempt => "blocked_key_attempt",
            ViolationKind::ContextMenuAttempt => "context_menu_attempt",
            ViolationKind::DevicePermissionDenied => "device_permission_denied",
        };
        f.write_str(name)
    }
}

/// Severity attached by the detector. `Critical` always terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warn,
    Critical,
}

/// An immutable violation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub detected_at: DateTime<Utc>,
    pub severity: Severity,
    /// Operator-facing diagnostic detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Candidate-facing reason overriding the kind default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ViolationEvent {
    pub fn warn(kind: ViolationKind, detected_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            detected_at,
            severity: Severity::Warn,
            detail: None,
            reason: None,
        }
    }

    pub fn critical(kind: ViolationKind, detected_at: DateTime<Utc>) -> Self {
        Self {
            severity: Severity::Critical,
            ..Self::warn(kind, detected_at)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Reason to surface if this event ends the session.
    pub fn termination_reason(&self) -> String {
        self.reason
            .clone()
            .unwrap_or_else(|| self.kind.termination_reason().to_string())
    }
}

/// How the aggregator escalates a violation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum ViolationClass {
    /// Terminate on first occurrence
    Immediate,
    /// Debounced, feeds the shared score and warning popups
    Scored,
    /// Own counter; terminate when the counter reaches `limit`
    Limited { limit: u32 },
    /// Debounced and counted, notice only
    Counted,
    /// Notice only, tiered by attempt count
    Advisory,
}

impl ViolationClass {
    /// Processing order within one tick: lower runs first.
    pub fn priority(&self) -> u8 {
        match self {
            ViolationClass::Immediate => 0,
            ViolationClass::Limited { .. } => 1,
            ViolationClass::Scored => 2,
            ViolationClass::Counted | ViolationClass::Advisory => 3,
        }
    }
}

/// Warning popup shown when the shared score reaches its limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningPopup {
    /// Which popup this is (1-based) within the session
    pub open_count: u32,
    pub message: String,
}

/// The problem the candidate is attempting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemContext {
    pub problem_id: String,
    #[serde(default)]
    pub title: String,
}

impl ProblemContext {
    pub fn new(problem_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            problem_id: problem_id.into(),
            title: title.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_override() {
        let now = Utc::now();
        let plain = ViolationEvent::warn(ViolationKind::WindowBlur, now);
        assert_eq!(
            plain.termination_reason(),
            "You switched focus away from the test window."
        );

        let custom = ViolationEvent::critical(ViolationKind::TabSwitch, now)
            .with_reason("You attempted to use keyboard shortcuts to switch tabs or close the window.");
        assert_eq!(custom.severity, Severity::Critical);
        assert!(custom.termination_reason().contains("keyboard shortcuts"));
    }

    #[test]
    fn test_class_serde() {
        let limited: ViolationClass =
            serde_json::from_str(r#"{"class":"limited","limit":3}"#).unwrap();
        assert_eq!(limited, ViolationClass::Limited { limit: 3 });
        assert!(ViolationClass::Immediate.priority() < limited.priority());
        assert!(ViolationClass::Scored.priority() < ViolationClass::Advisory.priority());
    }
}
