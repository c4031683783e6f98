//! Core session logic.
//!
//! This module contains:
//! - The violation data model
//! - The aggregator that debounces, counts and escalates violations
//! - The session monitor state machine and its host callbacks
//! - Scheduling, the blocking runner, and end-of-session reports

pub mod aggregator;
pub mod host;
pub mod monitor;
pub mod report;
pub mod runner;
pub mod schedule;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use aggregator::{Acknowledgement, Notice, NoticeLevel, PolicyEvent, ViolationAggregator};
pub use host::{Dialog, HostInbox, RecordingHost, SessionHost};
pub use monitor::{MonitorError, MonitorState, SessionMonitor, END_TEST_REASON};
pub use report::{ReportBuilder, SessionOutcome, SessionReport, PRODUCER_NAME, REPORT_VERSION};
pub use runner::{RunOutcome, Runner};
pub use schedule::{Schedule, TaskTarget};
pub use session::{Session, TimelineEntry};
pub use types::{
    ProblemContext, Severity, ViolationClass, ViolationEvent, ViolationKind, WarningPopup,
};
