//! Proctor Sentinel - session integrity monitor for proctored coding tests.
//!
//! This library watches a candidate's browser session for rule violations
//! (leaving fullscreen, switching tabs, opening developer tools, external
//! displays, missing or extra faces, looking away, background noise,
//! restricted shortcuts), escalates them through a configurable policy, and
//! tells the host application which dialogs and notices to show.
//!
//! # Guarantees
//!
//! - **Local only**: camera frames and audio never leave the session; only
//!   face counts, keypoints and loudness are inspected
//! - **Bounded escalation**: every violation maps to exactly one policy
//!   outcome, and termination happens at most once per session
//! - **Clean teardown**: ending a session stops every timer, listener and
//!   media track it started
//! - **Transparency**: all counts and diagnostics are logged and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Proctor Sentinel                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐    │
//! │  │   Signal    │──▶│  Detectors  │──▶│    Violation     │    │
//! │  │   Sources   │   │  (8 kinds)  │   │    Aggregator    │    │
//! │  └─────────────┘   └─────────────┘   └──────────────────┘    │
//! │         ▲                                     │              │
//! │         │                                     ▼              │
//! │  ┌─────────────┐                     ┌──────────────────┐    │
//! │  │   Session   │◀────────────────────│   Host dialogs   │    │
//! │  │   Monitor   │                     │   and notices    │    │
//! │  └─────────────┘                     └──────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use proctor_sentinel::{audit, core, source, Config};
//!
//! let relay = source::Relay::new();
//! relay.push(source::Sample::Geometry(source::DisplayGeometry::default()));
//! let host = core::RecordingHost::new();
//! let mut monitor = core::SessionMonitor::new(
//!     Config::default(),
//!     relay.platform(),
//!     Box::new(host.clone()),
//!     audit::create_shared_log(),
//! );
//!
//! monitor
//!     .start(core::ProblemContext::new("two-sum", "Two Sum"), Utc::now())
//!     .expect("session did not start");
//! monitor.handle_signal(source::Signal::WindowBlur, Utc::now());
//! assert!(!host.snapshot().terminations.is_empty());
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod detect;
pub mod replay;
pub mod source;

#[cfg(feature = "judge")]
pub mod judge;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use audit::{AuditLog, AuditStats, SharedAuditLog};
pub use config::{Config, DetectorConfig, PolicyConfig};
pub use core::{
    Dialog, MonitorError, MonitorState, Notice, PolicyEvent, ProblemContext, RecordingHost,
    SessionHost, SessionMonitor, SessionReport, ViolationAggregator, ViolationEvent,
    ViolationKind,
};
pub use detect::{Detector, DetectorKind, Disposition};
pub use source::{Platform, Relay, Sample, Signal};

#[cfg(feature = "judge")]
pub use judge::{
    BlockingJudgeClient, ExecutionRequest, ExecutionResult, JudgeClient, JudgeConfig, JudgeError,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Test rules shown to the candidate before a proctored session starts.
pub const RULES_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              PROCTOR SENTINEL - TEST RULES                       ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This test is proctored. Stay in full screen until you finish.   ║
║                                                                  ║
║  ✗ NOT ALLOWED DURING THE TEST:                                  ║
║    • Switching tabs or windows, or minimizing the browser        ║
║    • Opening developer tools or the context menu                 ║
║    • Connecting an external display                              ║
║    • Leaving the camera's view or letting others join you        ║
║    • Repeatedly looking away from the screen                     ║
║    • Sustained background noise                                  ║
║                                                                  ║
║  ✓ WHAT HAPPENS:                                                 ║
║    • Leaving full screen: warning, ended after 3 exits           ║
║    • Switching tabs or focus: the test ends immediately          ║
║    • Camera and noise violations: warning after 5, ended after   ║
║      the 3rd warning is dismissed                                ║
║                                                                  ║
║  Camera and microphone are analysed locally and never recorded.  ║
║                                                                  ║
║  You can view monitoring statistics anytime with:                ║
║    proctor-sentinel status                                       ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_declaration_contents() {
        assert!(RULES_DECLARATION.contains("TEST RULES"));
        assert!(RULES_DECLARATION.contains("NOT ALLOWED"));
        assert!(RULES_DECLARATION.contains("external display"));
    }
}
