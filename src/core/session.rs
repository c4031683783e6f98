//! Lifecycle container for one proctored attempt.

use crate::config::PolicyConfig;
use crate::core::aggregator::{PolicyEvent, ViolationAggregator};
use crate::core::types::{ProblemContext, ViolationEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recorded moment in the session, kept for the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum TimelineEntry {
    Started {
        at: DateTime<Utc>,
    },
    Activated {
        at: DateTime<Utc>,
    },
    Violation {
        event: ViolationEvent,
    },
    PopupOpened {
        at: DateTime<Utc>,
        open_count: u32,
    },
    PopupAcknowledged {
        at: DateTime<Utc>,
    },
    Terminated {
        at: DateTime<Utc>,
        reason: String,
    },
    Stopped {
        at: DateTime<Utc>,
    },
}

/// One proctored attempt, from entry to termination or voluntary exit.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    problem: ProblemContext,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    active: bool,
    timeline: Vec<TimelineEntry>,
    aggregator: ViolationAggregator,
}

impl Session {
    pub fn new(problem: ProblemContext, policy: PolicyConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            problem,
            started_at: now,
            ended_at: None,
            active: false,
            timeline: vec![TimelineEntry::Started { at: now }],
            aggregator: ViolationAggregator::new(policy),
        }
    }

    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.active = true;
        self.timeline.push(TimelineEntry::Activated { at: now });
    }

    /// Record violations from one tick and log the outcome on the timeline.
    pub fn record(&mut self, events: &[ViolationEvent], now: DateTime<Utc>) -> Vec<PolicyEvent> {
        let mut decisions = Vec::new();
        for outcome in self.aggregator.record_batch(events) {
            // Debounced or post-termination events leave no trace.
            if outcome.counted {
                self.timeline.push(TimelineEntry::Violation {
                    event: outcome.event.clone(),
                });
            }
            for decision in &outcome.decisions {
                match decision {
                    PolicyEvent::PopupOpened(popup) => {
                        self.timeline.push(TimelineEntry::PopupOpened {
                            at: now,
                            open_count: popup.open_count,
                        })
                    }
                    PolicyEvent::Terminate { reason } => self.end(now, Some(reason.clone())),
                    _ => {}
                }
            }
            decisions.extend(outcome.decisions);
        }
        decisions
    }

    /// Mark the session as over. The first call wins.
    pub fn end(&mut self, now: DateTime<Utc>, reason: Option<String>) {
        if self.ended_at.is_some() {
            return;
        }
        self.active = false;
        self.ended_at = Some(now);
        self.timeline.push(match reason {
            Some(reason) => TimelineEntry::Terminated { at: now, reason },
            None => TimelineEntry::Stopped { at: now },
        });
    }

    pub fn note_acknowledged(&mut self, now: DateTime<Utc>) {
        self.timeline
            .push(TimelineEntry::PopupAcknowledged { at: now });
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn problem(&self) -> &ProblemContext {
        &self.problem
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn termination_reason(&self) -> Option<&str> {
        self.aggregator.termination_reason()
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn aggregator(&self) -> &ViolationAggregator {
        &self.aggregator
    }

    pub fn aggregator_mut(&mut self) -> &mut ViolationAggregator {
        &mut self.aggregator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ViolationKind;
    use chrono::Duration;

    #[test]
    fn test_debounced_violations_not_on_timeline() {
        let t0 = Utc::now();
        let mut session = Session::new(ProblemContext::new("two-sum", "Two Sum"), PolicyConfig::default(), t0);
        session.activate(t0);

        let events = [
            ViolationEvent::warn(ViolationKind::NoFace, t0),
            ViolationEvent::warn(ViolationKind::NoFace, t0 + Duration::milliseconds(300)),
        ];
        session.record(&events[..1], t0);
        session.record(&events[1..], t0 + Duration::milliseconds(300));

        let logged = session
            .timeline()
            .iter()
            .filter(|e| matches!(e, TimelineEntry::Violation { .. }))
            .count();
        assert_eq!(logged, 1);
        assert!(session.is_active());
    }

    #[test]
    fn test_terminate_ends_once() {
        let t0 = Utc::now();
        let mut session = Session::new(ProblemContext::default(), PolicyConfig::default(), t0);
        session.activate(t0);

        let decisions = session.record(&[ViolationEvent::warn(ViolationKind::TabSwitch, t0)], t0);
        assert!(matches!(decisions[..], [PolicyEvent::Terminate { .. }]));
        assert!(!session.is_active());
        assert_eq!(session.ended_at(), Some(t0));

        session.end(t0 + Duration::seconds(1), None);
        assert_eq!(session.ended_at(), Some(t0));
        assert!(matches!(
            session.timeline().last(),
            Some(TimelineEntry::Terminated { .. })
        ));
    }
}
