//! End-of-session report for operators.

use crate::core::session::{Session, TimelineEntry};
use crate::core::types::{ProblemContext, ViolationKind};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Report format version.
pub const REPORT_VERSION: &str = "1.0";

/// Name of this producer.
pub const PRODUCER_NAME: &str = "proctor-sentinel";

/// How the session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The host stopped the session without a violation ending it
    Completed,
    Terminated { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub session_id: String,
    pub device_id: String,
    pub problem: ProblemContext,
    pub timezone: String,
    pub started_at_utc: DateTime<Utc>,
    pub started_at_local: String,
    pub ended_at_utc: DateTime<Utc>,
    pub ended_at_local: String,
    pub duration_secs: i64,
    #[serde(flatten)]
    pub outcome: SessionOutcome,
    pub violation_counts: BTreeMap<ViolationKind, u32>,
    pub total_violations: u32,
    pub warning_popups_shown: u32,
    /// Raw violations suppressed by debouncing
    pub debounced: u64,
    pub timeline: Vec<TimelineEntry>,
}

impl SessionReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Write `session-<id>.json` into `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, std::io::Error> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("session-{}.json", self.session_id));
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// Builds session reports for one monitor instance.
pub struct ReportBuilder {
    instance_id: Uuid,
    device_id: String,
    tz: Tz,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::with_timezone(Tz::UTC)
    }

    pub fn with_timezone(tz: Tz) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let instance_id = Uuid::new_v4();
        Self {
            device_id: format!("proctor-{}-{}", hostname, &instance_id.to_string()[..8]),
            instance_id,
            tz,
        }
    }

    /// Parse an IANA timezone name, falling back to UTC.
    pub fn from_timezone_name(name: &str) -> Self {
        match name.parse::<Tz>() {
            Ok(tz) => Self::with_timezone(tz),
            Err(_) => {
                warn!(timezone = name, "unknown report timezone, using UTC");
                Self::new()
            }
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    fn local(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz).to_rfc3339()
    }

    /// Build the report for an ended (or ending) session.
    pub fn build(&self, session: &Session, ended_at: DateTime<Utc>) -> SessionReport {
        let aggregator = session.aggregator();
        let counts = aggregator.violation_counts().clone();
        let outcome = match session.termination_reason() {
            Some(reason) => SessionOutcome::Terminated {
                reason: reason.to_string(),
            },
            None => SessionOutcome::Completed,
        };

        SessionReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instance_id: self.instance_id.to_string(),
            },
            session_id: session.id().to_string(),
            device_id: self.device_id.clone(),
            problem: session.problem().clone(),
            timezone: self.tz.to_string(),
            started_at_utc: session.started_at(),
            started_at_local: self.local(session.started_at()),
            ended_at_utc: ended_at,
            ended_at_local: self.local(ended_at),
            duration_secs: (ended_at - session.started_at()).num_seconds(),
            outcome,
            total_violations: counts.values().sum(),
            violation_counts: counts,
            warning_popups_shown: aggregator.warning_popups_shown(),
            debounced: aggregator.debounced(),
            timeline: session.timeline().to_vec(),
        }
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::core::types::ViolationEvent;
    use chrono::Duration;

    #[test]
    fn test_report_for_terminated_session() {
        let t0 = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut session = Session::new(
            ProblemContext::new("valid-parentheses", "Valid Parentheses"),
            PolicyConfig::default(),
            t0,
        );
        session.activate(t0);
        let end = t0 + Duration::seconds(90);
        session.record(&[ViolationEvent::warn(ViolationKind::WindowBlur, end)], end);

        let builder = ReportBuilder::from_timezone_name("Asia/Kolkata");
        let report = builder.build(&session, end);

        assert_eq!(report.duration_secs, 90);
        assert_eq!(report.total_violations, 1);
        assert_eq!(report.started_at_local, "2024-03-01T17:30:00+05:30");
        assert!(matches!(report.outcome, SessionOutcome::Terminated { .. }));

        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(json["outcome"], "terminated");
        assert_eq!(json["violation_counts"]["window_blur"], 1);
        assert_eq!(json["producer"]["name"], PRODUCER_NAME);
    }

    #[test]
    fn test_unknown_timezone_falls_back() {
        let builder = ReportBuilder::from_timezone_name("Mars/Olympus");
        assert_eq!(builder.timezone(), Tz::UTC);
    }
}
