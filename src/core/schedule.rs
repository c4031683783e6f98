//! Cancellable timers for polled detectors and display rechecks.
//!
//! Nothing here sleeps: the caller passes the current time and gets back
//! the tasks that are due. Teardown is a single `cancel_all`.

use chrono::{DateTime, Duration, Utc};

/// What a scheduled task drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTarget {
    /// Poll the detector at this index
    Detector(usize),
    /// Retry an ambiguous entry display check
    DisplayRecheck,
}

/// Identifier for cancelling one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Task {
    id: TaskId,
    target: TaskTarget,
    next_at: DateTime<Utc>,
    every: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct Schedule {
    tasks: Vec<Task>,
    next_id: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `target` every `every_ms`, first at `now + every_ms`.
    pub fn schedule_repeating(
        &mut self,
        target: TaskTarget,
        every_ms: u64,
        now: DateTime<Utc>,
    ) -> TaskId {
        let every = Duration::milliseconds(every_ms.max(1) as i64);
        self.push(target, now + every, Some(every))
    }

    /// Run `target` once after `delay_ms`.
    pub fn schedule_once(&mut self, target: TaskTarget, delay_ms: u64, now: DateTime<Utc>) -> TaskId {
        self.push(target, now + Duration::milliseconds(delay_ms as i64), None)
    }

    fn push(&mut self, target: TaskTarget, next_at: DateTime<Utc>, every: Option<Duration>) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.tasks.push(Task {
            id,
            target,
            next_at,
            every,
        });
        id
    }

    /// Collect every task due at `now`, earliest first.
    ///
    /// A repeating task that fell several periods behind fires once and is
    /// re-armed relative to `now`; one-shot tasks are removed.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<TaskTarget> {
        let mut fired: Vec<(DateTime<Utc>, TaskTarget)> = Vec::new();
        self.tasks.retain_mut(|task| {
            if task.next_at > now {
                return true;
            }
            fired.push((task.next_at, task.target));
            match task.every {
                Some(every) => {
                    task.next_at = now + every;
                    true
                }
                None => false,
            }
        });
        fired.sort_by_key(|(at, _)| *at);
        fired.into_iter().map(|(_, target)| target).collect()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.tasks.iter().map(|t| t.next_at).min()
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Cancel every pending task. Returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.tasks.len();
        self.tasks.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeating_and_once() {
        let t0 = Utc::now();
        let mut schedule = Schedule::new();
        schedule.schedule_repeating(TaskTarget::Detector(0), 1000, t0);
        schedule.schedule_once(TaskTarget::DisplayRecheck, 500, t0);

        assert!(schedule.due(t0 + Duration::milliseconds(100)).is_empty());
        assert_eq!(
            schedule.due(t0 + Duration::milliseconds(500)),
            vec![TaskTarget::DisplayRecheck]
        );
        assert_eq!(schedule.len(), 1);
        assert_eq!(
            schedule.due(t0 + Duration::milliseconds(1000)),
            vec![TaskTarget::Detector(0)]
        );
        assert!(schedule.due(t0 + Duration::milliseconds(1500)).is_empty());
        assert_eq!(schedule.due(t0 + Duration::milliseconds(2000)).len(), 1);
    }

    #[test]
    fn test_missed_periods_fire_once() {
        let t0 = Utc::now();
        let mut schedule = Schedule::new();
        schedule.schedule_repeating(TaskTarget::Detector(0), 100, t0);
        assert_eq!(schedule.due(t0 + Duration::seconds(5)).len(), 1);
        assert_eq!(
            schedule.next_deadline(),
            Some(t0 + Duration::seconds(5) + Duration::milliseconds(100))
        );
    }

    #[test]
    fn test_cancel_all() {
        let t0 = Utc::now();
        let mut schedule = Schedule::new();
        let id = schedule.schedule_repeating(TaskTarget::Detector(1), 50, t0);
        schedule.schedule_repeating(TaskTarget::Detector(2), 50, t0);
        assert!(schedule.cancel(id));
        assert!(!schedule.cancel(id));
        assert_eq!(schedule.cancel_all(), 1);
        assert!(schedule.due(t0 + Duration::seconds(1)).is_empty());
    }
}
