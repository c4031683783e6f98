//! Blocking driver for a monitor on its own thread.

use crate::core::monitor::{MonitorState, SessionMonitor};
use chrono::Utc;
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Why the run loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The stop flag was cleared
    Stopped,
    /// The session terminated
    Terminated { reason: String },
    /// The monitor went idle (host stopped the session)
    Idle,
}

/// Waits on the signal queue and runs due polls between signals.
pub struct Runner {
    running: Arc<AtomicBool>,
    wait: Duration,
}

impl Runner {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            wait: Duration::from_millis(100),
        }
    }

    /// Flag that keeps the loop alive; store `false` to stop it.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Drive `monitor` until it terminates, goes idle, or the flag clears.
    pub fn run(&self, monitor: &mut SessionMonitor) -> RunOutcome {
        let receiver = monitor.signal_receiver();

        while self.running.load(Ordering::SeqCst) {
            // Wake early when a poll falls due before the regular wait ends.
            let wait = monitor
                .next_deadline()
                .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
                .map_or(self.wait, |until| until.min(self.wait));

            match receiver.recv_timeout(wait) {
                Ok(envelope) => {
                    monitor.handle_signal(envelope.signal, envelope.at);
                    monitor.pump();
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("signal queue disconnected");
                    return RunOutcome::Stopped;
                }
            }

            monitor.tick(Utc::now());

            match monitor.state() {
                MonitorState::Terminated { reason } => {
                    return RunOutcome::Terminated {
                        reason: reason.clone(),
                    }
                }
                MonitorState::Idle => return RunOutcome::Idle,
                _ => {}
            }
        }
        RunOutcome::Stopped
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::create_shared_log;
    use crate::config::{Config, DetectorConfig};
    use crate::core::host::RecordingHost;
    use crate::core::types::ProblemContext;
    use crate::source::relay::Relay;
    use crate::source::types::{Signal, SignalEnvelope};

    fn monitor() -> (SessionMonitor, RecordingHost) {
        let config = Config {
            detectors: DetectorConfig::from_csv("tabs,keys"),
            ..Config::default()
        };
        let host = RecordingHost::new();
        let mut monitor = SessionMonitor::new(
            config,
            Relay::new().platform(),
            Box::new(host.clone()),
            create_shared_log(),
        );
        monitor
            .start(ProblemContext::new("two-sum", "Two Sum"), Utc::now())
            .unwrap();
        (monitor, host)
    }

    #[test]
    fn test_queued_blur_ends_run() {
        let (mut monitor, host) = monitor();
        let sender = monitor.signal_sender();
        std::thread::spawn(move || {
            sender.send(SignalEnvelope::new(Signal::WindowBlur)).unwrap();
        });

        let outcome = Runner::new().run(&mut monitor);

        assert!(matches!(outcome, RunOutcome::Terminated { .. }));
        assert_eq!(host.snapshot().terminations.len(), 1);
    }

    #[test]
    fn test_cleared_flag_stops_immediately() {
        let (mut monitor, _host) = monitor();
        let runner = Runner::new().with_wait(Duration::from_millis(5));
        runner.running_flag().store(false, Ordering::SeqCst);

        assert_eq!(runner.run(&mut monitor), RunOutcome::Stopped);
        assert!(monitor.state().is_running());
    }

    #[test]
    fn test_due_poll_wakes_long_wait() {
        use crate::source::relay::Sample;
        use crate::source::types::DisplayGeometry;

        let relay = Relay::new();
        relay.push(Sample::Geometry(DisplayGeometry {
            inner_width: 960.0,
            outer_width: 960.0,
            ..DisplayGeometry::default()
        }));
        let mut config = Config {
            detectors: DetectorConfig::from_csv("display"),
            ..Config::default()
        };
        config.detectors.display.poll_interval_ms = 30;
        let mut monitor = SessionMonitor::new(
            config,
            relay.platform(),
            Box::new(RecordingHost::new()),
            create_shared_log(),
        );
        monitor
            .start(ProblemContext::new("two-sum", "Two Sum"), Utc::now())
            .unwrap();
        monitor.continue_anyway(Utc::now()).unwrap();

        let started = std::time::Instant::now();
        let outcome = Runner::new()
            .with_wait(Duration::from_secs(30))
            .run(&mut monitor);

        assert!(matches!(outcome, RunOutcome::Terminated { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
