//! Callbacks from the session monitor into the host application.

use crate::core::aggregator::Notice;
use crate::detect::display::MethodResult;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Message appended to every termination dialog.
pub const RULE_VIOLATION_NOTICE: &str =
    "This is treated as a violation of the test rules. Your test has been ended.";

/// A modal the host must render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dialog", rename_all = "snake_case")]
pub enum Dialog {
    /// Entry display check running
    DisplayCheckInProgress,
    /// An external display was found at entry
    ExternalDisplayBlocked {
        diagnostics: Vec<MethodResult>,
        can_override: bool,
    },
    /// Camera, microphone or fullscreen was refused
    PermissionDenied { capability: String, message: String },
    /// Preconditions cleared and the test is running
    ReadyToStart,
    /// Fullscreen was left; the candidate must return or end the test
    FullscreenRequired { attempt: u32, limit: u32 },
    /// Shared violation score reached its limit
    Warning {
        attempt: u32,
        limit: u32,
        message: String,
    },
    /// The session ended for a rule violation
    Terminated { reason: String, notice: String },
}

impl Dialog {
    pub fn terminated(reason: impl Into<String>) -> Self {
        Dialog::Terminated {
            reason: reason.into(),
            notice: RULE_VIOLATION_NOTICE.to_string(),
        }
    }
}

/// Implemented by the host application.
pub trait SessionHost: Send {
    fn on_dialog(&mut self, dialog: Dialog);

    fn on_notice(&mut self, notice: Notice);

    /// Called exactly once when a session terminates.
    fn on_terminate(&mut self, reason: &str);
}

/// Everything a host was told, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostInbox {
    pub dialogs: Vec<Dialog>,
    pub notices: Vec<Notice>,
    pub terminations: Vec<String>,
}

impl HostInbox {
    pub fn last_dialog(&self) -> Option<&Dialog> {
        self.dialogs.last()
    }
}

/// Host that records callbacks into a shared inbox.
///
/// Used by the relay server, replay and tests, where no UI exists.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    inbox: Arc<Mutex<HostInbox>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostInbox> {
        self.inbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> HostInbox {
        self.lock().clone()
    }

    /// Take everything received so far, leaving the inbox empty.
    pub fn drain(&self) -> HostInbox {
        std::mem::take(&mut *self.lock())
    }
}

impl SessionHost for RecordingHost {
    fn on_dialog(&mut self, dialog: Dialog) {
        self.lock().dialogs.push(dialog);
    }

    fn on_notice(&mut self, notice: Notice) {
        self.lock().notices.push(notice);
    }

    fn on_terminate(&mut self, reason: &str) {
        self.lock().terminations.push(reason.to_string());
    }
}
