//! Central counting, debouncing and escalation policy.
//!
//! Every detector feeds this one aggregator, which is the only place that
//! decides whether a violation warns, opens a popup, or ends the session.

use crate::config::PolicyConfig;
use crate::core::types::{Severity, ViolationClass, ViolationEvent, ViolationKind, WarningPopup};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Reason used when the popup budget is exhausted.
pub const POPUP_LIMIT_REASON: &str =
    "Too many proctoring violations were detected after repeated warnings.";

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A transient, non-blocking message for the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ViolationKind>,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
            kind: None,
        }
    }

    fn for_kind(mut self, kind: ViolationKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Decision produced by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    /// Show a toast; the session continues
    Notice(Notice),
    /// A limited kind was seen again but is under its limit
    LimitWarning {
        kind: ViolationKind,
        attempt: u32,
        limit: u32,
    },
    /// The shared score reached the limit and a popup opened
    PopupOpened(WarningPopup),
    /// End the session
    Terminate { reason: String },
}

/// One violation's share of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded<'a> {
    pub event: &'a ViolationEvent,
    /// False when the event was debounced or arrived after termination
    pub counted: bool,
    pub decisions: Vec<PolicyEvent>,
}

/// Result of acknowledging the open popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// No popup was open
    NoPopup,
    /// The popup closed and the session continues
    Resumed,
    /// The popup budget is exhausted
    Terminate { reason: String },
}

/// Tier of an advisory notice, escalating with the attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryTier {
    Mild,
    Strong,
    Final,
}

impl AdvisoryTier {
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt {
            0..=3 => AdvisoryTier::Mild,
            4..=5 => AdvisoryTier::Strong,
            _ => AdvisoryTier::Final,
        }
    }

    fn notice(&self) -> Notice {
        match self {
            AdvisoryTier::Mild => Notice::new(
                NoticeLevel::Warning,
                "This action is not allowed during the test",
                "Developer tools access is restricted in secure test mode.",
            ),
            AdvisoryTier::Strong => Notice::new(
                NoticeLevel::Error,
                "Multiple attempts to access developer tools detected",
                "Further attempts may result in test termination.",
            ),
            AdvisoryTier::Final => Notice::new(
                NoticeLevel::Error,
                "Final warning: Developer tools access is prohibited",
                "Your test will be terminated if developer tools are opened.",
            ),
        }
    }
}

/// Counters and policy state for one session.
#[derive(Debug)]
pub struct ViolationAggregator {
    policy: PolicyConfig,
    violation_counts: BTreeMap<ViolationKind, u32>,
    total_violation_score: u32,
    warning_popups_shown: u32,
    popup: Option<WarningPopup>,
    last_recorded: HashMap<ViolationKind, DateTime<Utc>>,
    advisory_attempts: u32,
    debounced: u64,
    termination_reason: Option<String>,
}

impl ViolationAggregator {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy,
            violation_counts: BTreeMap::new(),
            total_violation_score: 0,
            warning_popups_shown: 0,
            popup: None,
            last_recorded: HashMap::new(),
            advisory_attempts: 0,
            debounced: 0,
            termination_reason: None,
        }
    }

    /// Record one violation and return the resulting policy decisions.
    pub fn record(&mut self, event: &ViolationEvent) -> Vec<PolicyEvent> {
        if self.termination_reason.is_some() {
            debug!(kind = %event.kind, "violation dropped after termination");
            return Vec::new();
        }

        if event.severity == Severity::Critical {
            self.bump(event.kind);
            return self.terminate(event.termination_reason()).into_iter().collect();
        }

        match self.policy.class_of(event.kind) {
            ViolationClass::Immediate => {
                self.bump(event.kind);
                self.terminate(event.termination_reason())
                    .into_iter()
                    .collect()
            }
            ViolationClass::Limited { limit } => {
                let attempt = self.bump(event.kind);
                if attempt >= limit {
                    self.terminate(event.termination_reason())
                        .into_iter()
                        .collect()
                } else {
                    info!(kind = %event.kind, attempt, limit, "limited violation");
                    vec![PolicyEvent::LimitWarning {
                        kind: event.kind,
                        attempt,
                        limit,
                    }]
                }
            }
            ViolationClass::Scored => self.record_scored(event),
            ViolationClass::Counted => {
                if self.debounce(event) {
                    return Vec::new();
                }
                let count = self.bump(event.kind);
                let (title, description) = event.kind.warning_text();
                vec![PolicyEvent::Notice(
                    Notice::new(NoticeLevel::Warning, format!("{title} ({count})"), description)
                        .for_kind(event.kind),
                )]
            }
            ViolationClass::Advisory => {
                self.bump(event.kind);
                self.advisory_attempts += 1;
                let tier = AdvisoryTier::for_attempt(self.advisory_attempts);
                vec![PolicyEvent::Notice(tier.notice().for_kind(event.kind))]
            }
        }
    }

    /// Record violations observed in the same tick.
    ///
    /// Terminating classes are processed first so a session that should end
    /// never shows a warning instead. Processing stops at the first Terminate.
    pub fn record_batch<'a>(&mut self, events: &'a [ViolationEvent]) -> Vec<Recorded<'a>> {
        let mut outcomes = Vec::new();
        for event in self.in_priority_order(events) {
            let before = self.count(event.kind);
            let decisions = self.record(event);
            outcomes.push(Recorded {
                event,
                counted: self.count(event.kind) > before,
                decisions,
            });
            if self.is_terminated() {
                break;
            }
        }
        outcomes
    }

    /// Acknowledge the open warning popup.
    pub fn acknowledge(&mut self) -> Acknowledgement {
        if self.termination_reason.is_some() || self.popup.is_none() {
            return Acknowledgement::NoPopup;
        }

        if self.warning_popups_shown >= self.policy.popup_limit {
            self.popup = None;
            return match self.terminate(POPUP_LIMIT_REASON.to_string()) {
                Some(PolicyEvent::Terminate { reason }) => Acknowledgement::Terminate { reason },
                _ => Acknowledgement::NoPopup,
            };
        }

        self.popup = None;
        Acknowledgement::Resumed
    }

    /// Terminate for a reason outside the violation stream (e.g. the
    /// candidate ended the test). Returns `None` if already terminated.
    pub fn terminate(&mut self, reason: String) -> Option<PolicyEvent> {
        if self.termination_reason.is_some() {
            return None;
        }
        warn!(%reason, "session termination decided");
        self.termination_reason = Some(reason.clone());
        Some(PolicyEvent::Terminate { reason })
    }

    /// Whether `event` falls inside its kind's debounce window. Events
    /// outside the window restart it.
    fn debounce(&mut self, event: &ViolationEvent) -> bool {
        let window = Duration::milliseconds(self.policy.debounce_ms_for(event.kind) as i64);
        if let Some(last) = self.last_recorded.get(&event.kind) {
            if event.detected_at - *last < window {
                self.debounced += 1;
                return true;
            }
        }
        self.last_recorded.insert(event.kind, event.detected_at);
        false
    }

    fn record_scored(&mut self, event: &ViolationEvent) -> Vec<PolicyEvent> {
        if self.debounce(event) {
            return Vec::new();
        }
        let count = self.bump(event.kind);

        // Candidate is already looking at a warning; keep counting only.
        if self.popup.is_some() {
            return Vec::new();
        }

        self.total_violation_score += 1;
        let limit = self.policy.violation_limit;

        if self.total_violation_score >= limit {
            self.total_violation_score = 0;
            self.warning_popups_shown += 1;
            let popup = WarningPopup {
                open_count: self.warning_popups_shown,
                message: format!(
                    "Multiple proctoring violations detected (warning {} of {}). \
                     Further violations will terminate your test.",
                    self.warning_popups_shown, self.policy.popup_limit
                ),
            };
            info!(
                popups = self.warning_popups_shown,
                limit = self.policy.popup_limit,
                "warning popup opened"
            );
            self.popup = Some(popup.clone());
            return vec![PolicyEvent::PopupOpened(popup)];
        }

        let (title, description) = event.kind.warning_text();
        vec![PolicyEvent::Notice(
            Notice::new(
                NoticeLevel::Warning,
                format!("{title} ({count})"),
                format!(
                    "{description} Violation score {}/{limit}.",
                    self.total_violation_score
                ),
            )
            .for_kind(event.kind),
        )]
    }

    fn bump(&mut self, kind: ViolationKind) -> u32 {
        let count = self.violation_counts.entry(kind).or_insert(0);
        *count += 1;
        *count
    }

    /// Events sorted into processing order; stable for equal priorities.
    fn in_priority_order<'a>(&self, events: &'a [ViolationEvent]) -> Vec<&'a ViolationEvent> {
        let mut ordered: Vec<&ViolationEvent> = events.iter().collect();
        ordered.sort_by_key(|e| self.priority(e));
        ordered
    }

    fn priority(&self, event: &ViolationEvent) -> u8 {
        if event.severity == Severity::Critical {
            0
        } else {
            self.policy.class_of(event.kind).priority()
        }
    }

    pub fn violation_counts(&self) -> &BTreeMap<ViolationKind, u32> {
        &self.violation_counts
    }

    pub fn count(&self, kind: ViolationKind) -> u32 {
        self.violation_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_violation_score(&self) -> u32 {
        self.total_violation_score
    }

    pub fn warning_popups_shown(&self) -> u32 {
        self.warning_popups_shown
    }

    pub fn open_popup(&self) -> Option<&WarningPopup> {
        self.popup.as_ref()
    }

    /// Number of raw violations swallowed by the debounce window.
    pub fn debounced(&self) -> u64 {
        self.debounced
    }

    pub fn is_terminated(&self) -> bool {
        self.termination_reason.is_some()
    }

    pub fn termination_reason(&self) -> Option<&str> {
        self.termination_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn no_face(ms: i64) -> ViolationEvent {
        ViolationEvent::warn(ViolationKind::NoFace, at(ms))
    }

    fn aggregator() -> ViolationAggregator {
        ViolationAggregator::new(PolicyConfig::default())
    }

    #[test]
    fn test_debounce_within_window() {
        let mut agg = aggregator();
        for ms in [0, 100, 200, 500, 999] {
            agg.record(&no_face(ms));
        }
        assert_eq!(agg.count(ViolationKind::NoFace), 1);
        assert_eq!(agg.debounced(), 4);
        assert_eq!(agg.total_violation_score(), 1);
    }

    #[test]
    fn test_five_spaced_violations_open_one_popup() {
        let mut agg = aggregator();
        let mut popups = 0;
        for i in 0..5 {
            for decision in agg.record(&no_face(i * 1200)) {
                if matches!(decision, PolicyEvent::PopupOpened(_)) {
                    popups += 1;
                }
            }
        }
        assert_eq!(agg.count(ViolationKind::NoFace), 5);
        assert_eq!(popups, 1);
        assert_eq!(agg.total_violation_score(), 0);
        assert_eq!(agg.warning_popups_shown(), 1);
        assert!(agg.open_popup().is_some());
    }

    #[test]
    fn test_no_second_popup_while_open() {
        let mut agg = aggregator();
        for i in 0..10 {
            agg.record(&no_face(i * 1200));
        }
        assert_eq!(agg.warning_popups_shown(), 1);
        assert_eq!(agg.count(ViolationKind::NoFace), 10);
        assert_eq!(agg.total_violation_score(), 0);
    }

    #[test]
    fn test_popup_budget_terminates_on_ack() {
        let mut agg = aggregator();
        let mut t = 0;
        for round in 1..=3 {
            for _ in 0..5 {
                agg.record(&no_face(t));
                t += 1200;
            }
            assert_eq!(agg.warning_popups_shown(), round);
            if round < 3 {
                assert_eq!(agg.acknowledge(), Acknowledgement::Resumed);
            }
        }
        assert_eq!(
            agg.acknowledge(),
            Acknowledgement::Terminate {
                reason: POPUP_LIMIT_REASON.to_string()
            }
        );
        assert!(agg.is_terminated());
        assert_eq!(agg.acknowledge(), Acknowledgement::NoPopup);
        assert!(agg.record(&no_face(t)).is_empty());
    }

    #[test]
    fn test_immediate_bypasses_score() {
        let mut agg = aggregator();
        for i in 0..4 {
            agg.record(&no_face(i * 1200));
        }
        let decisions = agg.record(&ViolationEvent::warn(ViolationKind::WindowBlur, at(6000)));
        assert_eq!(
            decisions,
            vec![PolicyEvent::Terminate {
                reason: "You switched focus away from the test window.".into()
            }]
        );
        assert_eq!(agg.total_violation_score(), 4);
    }

    #[test]
    fn test_noise_is_counted_without_score() {
        let mut agg = aggregator();
        let noise = |ms| ViolationEvent::warn(ViolationKind::ExcessiveNoise, at(ms));

        for ms in [0, 1000, 5000, 10_000, 15_000, 20_000, 25_000] {
            for decision in agg.record(&noise(ms)) {
                assert!(matches!(decision, PolicyEvent::Notice(_)));
            }
        }
        assert_eq!(agg.count(ViolationKind::ExcessiveNoise), 6);
        assert_eq!(agg.debounced(), 1);
        assert_eq!(agg.total_violation_score(), 0);
        assert_eq!(agg.warning_popups_shown(), 0);
    }

    #[test]
    fn test_third_fullscreen_exit_terminates() {
        let mut agg = aggregator();
        let exit = |ms| ViolationEvent::warn(ViolationKind::FullscreenExit, at(ms));

        assert_eq!(
            agg.record(&exit(0)),
            vec![PolicyEvent::LimitWarning {
                kind: ViolationKind::FullscreenExit,
                attempt: 1,
                limit: 3
            }]
        );
        assert_eq!(agg.record(&exit(10)).len(), 1);
        let decisions = agg.record(&exit(20));
        match &decisions[..] {
            [PolicyEvent::Terminate { reason }] => assert!(reason.contains("full screen")),
            other => panic!("unexpected decisions: {other:?}"),
        }
    }

    #[test]
    fn test_batch_orders_terminate_first() {
        let mut agg = aggregator();
        for i in 0..4 {
            agg.record(&no_face(i * 1200));
        }
        // The fifth no-face would open a popup; the blur in the same tick wins.
        let batch = [
            no_face(6000),
            ViolationEvent::warn(ViolationKind::WindowBlur, at(6000)),
        ];
        let outcomes = agg.record_batch(&batch);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].event.kind, ViolationKind::WindowBlur);
        assert!(outcomes[0].counted);
        assert!(matches!(
            outcomes[0].decisions[..],
            [PolicyEvent::Terminate { .. }]
        ));
        assert_eq!(agg.warning_popups_shown(), 0);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let mut agg = aggregator();
        assert!(agg.terminate("first".into()).is_some());
        assert!(agg.terminate("second".into()).is_none());
        assert_eq!(agg.termination_reason(), Some("first"));
    }

    #[test]
    fn test_advisory_tiers() {
        let mut agg = aggregator();
        let mut levels = Vec::new();
        for i in 0..7 {
            let kind = if i % 2 == 0 {
                ViolationKind::BlockedKeyAttempt
            } else {
                ViolationKind::ContextMenuAttempt
            };
            for decision in agg.record(&ViolationEvent::warn(kind, at(i))) {
                if let PolicyEvent::Notice(notice) = decision {
                    levels.push(notice.title);
                }
            }
        }
        assert_eq!(levels.len(), 7);
        assert!(levels[2].starts_with("This action"));
        assert!(levels[3].starts_with("Multiple attempts"));
        assert!(levels[6].starts_with("Final warning"));
        assert!(!agg.is_terminated());
    }

    #[test]
    fn test_critical_terminates_any_class() {
        let mut agg = aggregator();
        let event = ViolationEvent::critical(ViolationKind::ExcessiveNoise, at(0));
        assert!(matches!(
            agg.record(&event)[..],
            [PolicyEvent::Terminate { .. }]
        ));
    }
}
