//! Offline replay of recorded browser activity.
//!
//! A script is JSON lines, one step per line, each stamped with milliseconds
//! since the start of the recording:
//!
//! ```text
//! {"at_ms": 0, "op": "sample", "sample": {"type": "faces", "faces": [ ... ]}}
//! {"at_ms": 0, "op": "start", "problem_id": "two-sum", "title": "Two Sum"}
//! {"at_ms": 4200, "op": "signal", "signal": {"type": "window_blur"}}
//! ```
//!
//! Time between steps is walked in small increments so scheduled polls fire
//! as they would live.

use crate::audit::SharedAuditLog;
use crate::config::Config;
use crate::core::host::{HostInbox, RecordingHost};
use crate::core::monitor::{MonitorState, SessionMonitor};
use crate::core::report::SessionReport;
use crate::core::types::ProblemContext;
use crate::detect::Disposition;
use crate::source::relay::{Relay, Sample};
use crate::source::types::Signal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One timed step of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub at_ms: u64,
    #[serde(flatten)]
    pub step: ScriptStep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    Start {
        problem_id: String,
        #[serde(default)]
        title: String,
    },
    Signal {
        signal: Signal,
    },
    Sample {
        sample: Sample,
    },
    /// Advance time without any input
    Tick,
    Acknowledge,
    ReturnToFullscreen,
    ContinueAnyway,
    Recheck,
    EndTest,
    Stop,
}

/// Replay errors.
#[derive(Debug)]
pub enum ReplayError {
    Io(String),
    Parse { line: usize, message: String },
    OutOfOrder { line: usize },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::Io(e) => write!(f, "IO error: {e}"),
            ReplayError::Parse { line, message } => write!(f, "line {line}: {message}"),
            ReplayError::OutOfOrder { line } => {
                write!(f, "line {line}: at_ms goes backwards")
            }
        }
    }
}

impl std::error::Error for ReplayError {}

/// Parse a JSON-lines script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>, ReplayError> {
    let mut lines = Vec::new();
    let mut last_at = 0;
    for (index, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line: ScriptLine = serde_json::from_str(trimmed).map_err(|e| ReplayError::Parse {
            line: index + 1,
            message: e.to_string(),
        })?;
        if line.at_ms < last_at {
            return Err(ReplayError::OutOfOrder { line: index + 1 });
        }
        last_at = line.at_ms;
        lines.push(line);
    }
    Ok(lines)
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptLine>, ReplayError> {
    let text = std::fs::read_to_string(path).map_err(|e| ReplayError::Io(e.to_string()))?;
    parse_script(&text)
}

/// What a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub final_state: MonitorState,
    pub host: HostInbox,
    pub report: Option<SessionReport>,
    /// Host operations the monitor refused, as (at_ms, error)
    pub rejected: Vec<(u64, String)>,
    /// Signals whose default action the host was told to prevent
    pub blocked_signals: u32,
    pub steps: usize,
    /// Whether the stop flag cut the replay short
    pub interrupted: bool,
}

/// Drives a monitor over a relay from a script.
pub struct Replayer {
    relay: Relay,
    host: RecordingHost,
    monitor: SessionMonitor,
    origin: DateTime<Utc>,
    step_ms: u64,
    running: Arc<AtomicBool>,
}

impl Replayer {
    pub fn new(config: Config, audit: SharedAuditLog, origin: DateTime<Utc>) -> Self {
        let relay = Relay::new();
        let host = RecordingHost::new();
        let monitor = SessionMonitor::new(config, relay.platform(), Box::new(host.clone()), audit);
        Self {
            relay,
            host,
            monitor,
            origin,
            step_ms: 50,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Granularity of simulated time between steps.
    pub fn with_step_ms(mut self, step_ms: u64) -> Self {
        self.step_ms = step_ms.max(1);
        self
    }

    /// Flag that keeps the replay going; store `false` to interrupt.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    fn time(&self, at_ms: u64) -> DateTime<Utc> {
        self.origin + Duration::milliseconds(at_ms as i64)
    }

    pub fn run(&mut self, script: &[ScriptLine]) -> ReplayOutcome {
        let mut clock = 0;
        let mut rejected = Vec::new();
        let mut blocked_signals = 0;
        let mut steps = 0;
        let mut interrupted = false;

        for line in script {
            if !self.running.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }
            self.advance(clock, line.at_ms);
            clock = line.at_ms;
            let now = self.time(line.at_ms);

            let result = match &line.step {
                ScriptStep::Start { problem_id, title } => self
                    .monitor
                    .start(ProblemContext::new(problem_id.clone(), title.clone()), now),
                ScriptStep::Signal { signal } => {
                    if let Signal::FullscreenChanged { active } = signal {
                        self.relay.set_fullscreen_active(*active);
                    }
                    if self.monitor.handle_signal(signal.clone(), now) == Disposition::Block {
                        blocked_signals += 1;
                    }
                    Ok(())
                }
                ScriptStep::Sample { sample } => {
                    self.relay.push(sample.clone());
                    Ok(())
                }
                ScriptStep::Tick => {
                    self.monitor.tick(now);
                    Ok(())
                }
                ScriptStep::Acknowledge => self.monitor.acknowledge_warning(now),
                ScriptStep::ReturnToFullscreen => self.monitor.return_to_fullscreen(now),
                ScriptStep::ContinueAnyway => self.monitor.continue_anyway(now),
                ScriptStep::Recheck => self.monitor.recheck(now),
                ScriptStep::EndTest => self.monitor.end_test(now),
                ScriptStep::Stop => {
                    self.monitor.stop(now);
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(at_ms = line.at_ms, error = %e, "replay step refused");
                rejected.push((line.at_ms, e.to_string()));
            }
            steps += 1;
        }

        info!(
            steps,
            state = self.monitor.state().name(),
            "replay finished"
        );
        ReplayOutcome {
            final_state: self.monitor.state().clone(),
            host: self.host.snapshot(),
            report: self.monitor.last_report().cloned(),
            rejected,
            blocked_signals,
            steps,
            interrupted,
        }
    }

    /// Walk simulated time from `from_ms` up to (not including) `to_ms`.
    fn advance(&mut self, from_ms: u64, to_ms: u64) {
        let mut t = from_ms + self.step_ms;
        while t < to_ms {
            self.monitor.tick(self.time(t));
            t += self.step_ms;
        }
        if to_ms > from_ms {
            self.monitor.tick(self.time(to_ms));
        }
        debug!(from_ms, to_ms, "advanced");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::create_shared_log;
    use crate::config::DetectorConfig;

    fn config(detectors: &str) -> Config {
        Config {
            detectors: DetectorConfig::from_csv(detectors),
            ..Config::default()
        }
    }

    #[test]
    fn test_parse_script_skips_comments() {
        let script = parse_script(
            r#"
# entry
{"at_ms": 0, "op": "start", "problem_id": "two-sum"}
{"at_ms": 10, "op": "signal", "signal": {"type": "visibility_changed", "hidden": true}}

{"at_ms": 20, "op": "sample", "sample": {"type": "permission", "device": "camera", "granted": false}}
{"at_ms": 30, "op": "stop"}
"#,
        )
        .unwrap();

        assert_eq!(script.len(), 4);
        assert_eq!(
            script[1].step,
            ScriptStep::Signal {
                signal: Signal::VisibilityChanged { hidden: true }
            }
        );
        assert_eq!(script[3].step, ScriptStep::Stop);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = parse_script("{\"at_ms\": 0, \"op\": \"stop\"}\nnot json").unwrap_err();
        assert!(matches!(err, ReplayError::Parse { line: 2, .. }));

        let err = parse_script(
            "{\"at_ms\": 50, \"op\": \"tick\"}\n{\"at_ms\": 10, \"op\": \"tick\"}",
        )
        .unwrap_err();
        assert!(matches!(err, ReplayError::OutOfOrder { line: 2 }));
    }

    #[test]
    fn test_replay_blur_terminates() {
        let script = parse_script(
            r#"{"at_ms": 0, "op": "start", "problem_id": "two-sum"}
{"at_ms": 2000, "op": "signal", "signal": {"type": "window_blur"}}
{"at_ms": 2500, "op": "acknowledge"}"#,
        )
        .unwrap();

        let mut replayer = Replayer::new(config("fullscreen,tabs"), create_shared_log(), Utc::now());
        let outcome = replayer.run(&script);

        assert!(matches!(outcome.final_state, MonitorState::Terminated { .. }));
        assert_eq!(outcome.host.terminations.len(), 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(outcome.report.is_some());
    }

    #[test]
    fn test_replay_counts_blocked_keys() {
        let script = parse_script(
            r#"{"at_ms": 0, "op": "start", "problem_id": "two-sum"}
{"at_ms": 100, "op": "signal", "signal": {"type": "key_down", "key": "F12"}}
{"at_ms": 200, "op": "signal", "signal": {"type": "context_menu"}}
{"at_ms": 300, "op": "stop"}"#,
        )
        .unwrap();

        let mut replayer = Replayer::new(config("keys"), create_shared_log(), Utc::now());
        let outcome = replayer.run(&script);

        assert_eq!(outcome.blocked_signals, 2);
        assert_eq!(outcome.final_state, MonitorState::Idle);
        assert_eq!(outcome.host.notices.len(), 3);
    }

    #[test]
    fn test_interrupted_replay() {
        let script = parse_script(r#"{"at_ms": 0, "op": "start", "problem_id": "p"}"#).unwrap();
        let mut replayer = Replayer::new(config("keys"), create_shared_log(), Utc::now());
        replayer.running_flag().store(false, Ordering::SeqCst);

        let outcome = replayer.run(&script);
        assert!(outcome.interrupted);
        assert_eq!(outcome.steps, 0);
    }
}
