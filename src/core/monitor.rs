//! Session orchestration.
//!
//! The monitor owns the session lifecycle: it verifies entry preconditions,
//! starts and stops detectors, routes signals and polls through them, feeds
//! the aggregator, and turns policy decisions into host callbacks.
//!
//! ```text
//!   start ──▶ Checking ──(display clear / fail open / override)──▶ Active
//!                │                                              │   ▲
//!                └──(devices or fullscreen required, refused)─▶ Idle │
//!                                                               ▼   │
//!                                                   Warning (popup, fullscreen)
//!                                                               │
//!                         any Terminate decision ─────────────▶ Terminated
//! ```

use crate::audit::SharedAuditLog;
use crate::config::Config;
use crate::core::aggregator::{Acknowledgement, Notice, NoticeLevel, PolicyEvent};
use crate::core::host::{Dialog, SessionHost};
use crate::core::report::{ReportBuilder, SessionReport};
use crate::core::schedule::{Schedule, TaskId, TaskTarget};
use crate::core::session::Session;
use crate::core::types::{ProblemContext, ViolationEvent, ViolationKind, WarningPopup};
use crate::detect::display::evaluate;
use crate::detect::{
    AmbientNoiseDetector, BlockedKeyDetector, Detection, Detector, DetectorKind, DevToolsDetector,
    Disposition, ExternalDisplayDetector, FacePresenceDetector, FullscreenExitDetector,
    HeadOrientationDetector, Probes, TabSwitchDetector,
};
use crate::source::listeners::{ListenerId, ListenerRegistry};
use crate::source::media::{MediaRequest, MediaStreamHandle, StreamView, TrackKind};
use crate::source::platform::AcquireError;
use crate::source::types::{Signal, SignalEnvelope};
use crate::source::Platform;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Reason used when the candidate ends the test voluntarily.
pub const END_TEST_REASON: &str = "You chose to end the test.";

/// Lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorState {
    /// No detectors running
    Idle,
    /// Entry preconditions being verified
    Checking {
        attempts: u32,
        /// An external display was found and must be cleared or overridden
        blocked: bool,
    },
    /// All detectors running
    Active,
    /// A modal is open; detectors keep running
    Warning {
        /// Fullscreen left: (attempt, limit)
        fullscreen: Option<(u32, u32)>,
        popup: Option<WarningPopup>,
    },
    /// Terminal; no further events accepted
    Terminated { reason: String },
}

impl MonitorState {
    /// Whether signals and polls are processed.
    pub fn is_running(&self) -> bool {
        matches!(self, MonitorState::Active | MonitorState::Warning { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            MonitorState::Idle => "idle",
            MonitorState::Checking { .. } => "checking",
            MonitorState::Active => "active",
            MonitorState::Warning { .. } => "warning",
            MonitorState::Terminated { .. } => "terminated",
        }
    }
}

/// Errors returned to the host for invalid or refused operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// A session is already in progress
    AlreadyRunning,
    /// The operation needs a state the monitor is not in
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    /// A required capability was refused; the session did not start
    Precondition(AcquireError),
    /// Continuing past a detected external display is disabled
    OverrideNotAllowed,
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::AlreadyRunning => write!(f, "A session is already in progress"),
            MonitorError::InvalidState { operation, state } => {
                write!(f, "Cannot {operation} while {state}")
            }
            MonitorError::Precondition(e) => write!(f, "Session precondition failed: {e}"),
            MonitorError::OverrideNotAllowed => {
                write!(f, "Continuing with an external display is not allowed")
            }
        }
    }
}

impl std::error::Error for MonitorError {}

pub struct SessionMonitor {
    config: Config,
    platform: Platform,
    host: Box<dyn SessionHost>,
    audit: SharedAuditLog,
    reports: ReportBuilder,
    state: MonitorState,
    session: Option<Session>,
    detectors: Vec<Box<dyn Detector>>,
    listeners: ListenerRegistry,
    listener_ids: Vec<ListenerId>,
    schedule: Schedule,
    recheck_task: Option<TaskId>,
    /// Device refusals from entry, recorded once the session is active
    refusals: Vec<ViolationEvent>,
    stream: Option<MediaStreamHandle>,
    view: Option<StreamView>,
    tx: Sender<SignalEnvelope>,
    rx: Receiver<SignalEnvelope>,
    last_report: Option<SessionReport>,
}

impl SessionMonitor {
    pub fn new(
        config: Config,
        platform: Platform,
        host: Box<dyn SessionHost>,
        audit: SharedAuditLog,
    ) -> Self {
        let (tx, rx) = unbounded();
        let reports = ReportBuilder::from_timezone_name(&config.report_timezone);
        Self {
            config,
            platform,
            host,
            audit,
            reports,
            state: MonitorState::Idle,
            session: None,
            detectors: Vec::new(),
            listeners: ListenerRegistry::new(),
            listener_ids: Vec::new(),
            schedule: Schedule::new(),
            recheck_task: None,
            refusals: Vec::new(),
            stream: None,
            view: None,
            tx,
            rx,
            last_report: None,
        }
    }

    // ========================================================================
    // Host operations
    // ========================================================================

    /// Begin a proctored session for `problem`.
    ///
    /// Acquires camera/microphone, then runs the entry display check. The
    /// session becomes active once every blocking precondition clears.
    pub fn start(&mut self, problem: ProblemContext, now: DateTime<Utc>) -> Result<(), MonitorError> {
        match self.state {
            MonitorState::Idle | MonitorState::Terminated { .. } => {}
            _ => return Err(MonitorError::AlreadyRunning),
        }

        info!(problem = %problem.problem_id, "starting proctored session");
        self.session = Some(Session::new(problem, self.config.policy.clone(), now));
        self.last_report = None;
        self.refusals.clear();
        self.state = MonitorState::Checking {
            attempts: 0,
            blocked: false,
        };
        self.audit.record_session_started();

        if let Err(e) = self.acquire_media(now) {
            self.abort_start(now);
            return Err(e);
        }

        let display = &self.config.detectors.display;
        if display.enabled && display.check_on_entry {
            self.host.on_dialog(Dialog::DisplayCheckInProgress);
            self.run_display_check(now)
        } else {
            self.activate(now)
        }
    }

    /// Re-run the entry display check after the candidate disconnected a display.
    pub fn recheck(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        if !matches!(self.state, MonitorState::Checking { .. }) {
            return Err(self.invalid("recheck displays"));
        }
        if let Some(task) = self.recheck_task.take() {
            self.schedule.cancel(task);
        }
        self.state = MonitorState::Checking {
            attempts: 0,
            blocked: false,
        };
        self.host.on_dialog(Dialog::DisplayCheckInProgress);
        self.run_display_check(now)
    }

    /// Proceed despite a detected external display, when allowed.
    pub fn continue_anyway(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        match self.state {
            MonitorState::Checking { blocked: true, .. } => {}
            _ => return Err(self.invalid("continue past the display check")),
        }
        if !self.config.detectors.display.allow_override {
            return Err(MonitorError::OverrideNotAllowed);
        }
        warn!("candidate continued with an external display detected");
        self.audit
            .add_diagnostic(now, "display", "candidate overrode external display check");
        self.activate(now)
    }

    /// Queue a signal from another thread.
    pub fn signal_sender(&self) -> Sender<SignalEnvelope> {
        self.tx.clone()
    }

    /// Receiving end of the signal queue, for blocking waits.
    pub fn signal_receiver(&self) -> Receiver<SignalEnvelope> {
        self.rx.clone()
    }

    /// Process every queued signal. Returns how many were taken off the queue.
    pub fn pump(&mut self) -> usize {
        let pending: Vec<SignalEnvelope> = self.rx.try_iter().collect();
        let n = pending.len();
        for envelope in pending {
            self.handle_signal(envelope.signal, envelope.at);
        }
        n
    }

    /// Route one signal to its listeners.
    ///
    /// The returned disposition tells the host whether to prevent the
    /// event's default action (restricted keys, context menu).
    pub fn handle_signal(&mut self, signal: Signal, now: DateTime<Utc>) -> Disposition {
        let kind = signal.kind();
        if !self.state.is_running() || !self.listeners.is_listening(kind) {
            debug!(?kind, state = self.state.name(), "signal dropped");
            self.audit.record_dropped_signal();
            return Disposition::Allow;
        }
        self.audit.record_signal();

        let mut disposition = Disposition::Allow;
        let mut detections = Vec::new();
        {
            let mut probes = Probes::new(
                &*self.platform.screen,
                &mut *self.platform.face_model,
                &mut *self.platform.audio,
                self.view.as_ref(),
            );
            for detector in self.detectors.iter_mut() {
                if !detector.subscriptions().contains(&kind) {
                    continue;
                }
                if detector.disposition(&signal) == Disposition::Block {
                    disposition = Disposition::Block;
                }
                detections.extend(detector.on_signal(&signal, now));
                if detector.poll_on_signal(&signal) {
                    detections.extend(detector.poll(&mut probes, now));
                }
            }
        }

        self.process(detections, now);
        disposition
    }

    /// Run every scheduled task due at `now`.
    ///
    /// All polls due in the same tick are collected first and handed to the
    /// aggregator as one batch, so priority ordering applies across them.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let due = self.schedule.due(now);
        if due.is_empty() {
            return;
        }

        if due.contains(&TaskTarget::DisplayRecheck)
            && matches!(self.state, MonitorState::Checking { .. })
        {
            // Failure here already surfaced through a dialog.
            let _ = self.run_display_check(now);
        }

        if !self.state.is_running() {
            return;
        }

        let mut detections = Vec::new();
        {
            let mut probes = Probes::new(
                &*self.platform.screen,
                &mut *self.platform.face_model,
                &mut *self.platform.audio,
                self.view.as_ref(),
            );
            for target in &due {
                if let TaskTarget::Detector(index) = *target {
                    if let Some(detector) = self.detectors.get_mut(index) {
                        detections.extend(detector.poll(&mut probes, now));
                    }
                }
            }
        }
        self.process(detections, now);
    }

    /// Close the open warning popup.
    pub fn acknowledge_warning(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        let fullscreen = match &self.state {
            MonitorState::Warning {
                fullscreen,
                popup: Some(_),
            } => *fullscreen,
            _ => return Err(self.invalid("acknowledge a warning")),
        };
        let Some(session) = self.session.as_mut() else {
            return Err(self.invalid("acknowledge a warning"));
        };

        match session.aggregator_mut().acknowledge() {
            Acknowledgement::Resumed => {
                session.note_acknowledged(now);
                info!("warning acknowledged");
                self.state = match fullscreen {
                    Some(_) => MonitorState::Warning {
                        fullscreen,
                        popup: None,
                    },
                    None => MonitorState::Active,
                };
                Ok(())
            }
            Acknowledgement::Terminate { reason } => {
                self.terminate(reason, now);
                Ok(())
            }
            Acknowledgement::NoPopup => Err(self.invalid("acknowledge a warning")),
        }
    }

    /// Re-enter fullscreen from the fullscreen warning.
    ///
    /// Violation counts are kept; only the modal closes.
    pub fn return_to_fullscreen(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        if !self.state.is_running() {
            return Err(self.invalid("return to full screen"));
        }
        match self.platform.fullscreen.acquire() {
            Ok(backend) => {
                debug!(backend, "fullscreen re-entered");
                self.handle_signal(Signal::FullscreenChanged { active: true }, now);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "fullscreen re-entry refused");
                self.host.on_dialog(Dialog::PermissionDenied {
                    capability: "fullscreen".into(),
                    message: e.to_string(),
                });
                Err(MonitorError::Precondition(e))
            }
        }
    }

    /// The candidate chose to end the test.
    pub fn end_test(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        match self.state {
            MonitorState::Idle | MonitorState::Terminated { .. } => {
                Err(self.invalid("end the test"))
            }
            _ => {
                self.terminate(END_TEST_REASON.to_string(), now);
                Ok(())
            }
        }
    }

    /// Leave the session without a violation (exit to the problem list).
    ///
    /// Also returns a terminated monitor to `Idle`.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        match self.state {
            MonitorState::Idle => return,
            MonitorState::Terminated { .. } => {
                self.state = MonitorState::Idle;
                return;
            }
            _ => {}
        }

        info!("session stopped by host");
        self.teardown();
        if let Some(session) = self.session.as_mut() {
            session.end(now, None);
        }
        self.audit.record_session_completed();
        self.finish_report(now);
        self.state = MonitorState::Idle;
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn audit(&self) -> &SharedAuditLog {
        &self.audit
    }

    /// Kinds of the detectors currently running.
    pub fn running_detectors(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn scheduled_tasks(&self) -> usize {
        self.schedule.len()
    }

    /// When the next scheduled poll or recheck is due.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.schedule.next_deadline()
    }

    /// Live camera/microphone tracks held by this session.
    pub fn live_track_count(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.live_track_count())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn invalid(&self, operation: &'static str) -> MonitorError {
        MonitorError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }

    /// Request camera and microphone separately, so one refusal only
    /// disables the detectors that need that device.
    fn acquire_media(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        let detectors = &self.config.detectors;
        let requests = [
            (
                detectors.face.enabled,
                MediaRequest {
                    video: true,
                    audio: false,
                },
            ),
            (
                detectors.noise.enabled,
                MediaRequest {
                    video: false,
                    audio: true,
                },
            ),
        ];

        let mut stream = MediaStreamHandle::new(Vec::new());
        for (wanted, request) in requests {
            if !wanted {
                continue;
            }
            match self.platform.devices.get_user_media(request) {
                Ok(handle) => stream.absorb(handle),
                Err(e) => {
                    self.refuse_device(&e, now);
                    if self.config.devices.require_devices {
                        // Dropping `stream` stops anything already granted.
                        return Err(MonitorError::Precondition(e));
                    }
                }
            }
        }

        if stream.live_track_count() > 0 {
            debug!(tracks = stream.live_track_count(), "media acquired");
            self.view = Some(stream.view());
            self.stream = Some(stream);
        }
        Ok(())
    }

    fn refuse_device(&mut self, e: &AcquireError, now: DateTime<Utc>) {
        let capability = match e {
            AcquireError::PermissionDenied(what) | AcquireError::Unsupported(what) => what.clone(),
            AcquireError::AlreadyAcquired => "camera".to_string(),
        };
        warn!(error = %e, "media acquisition failed");
        self.audit.add_diagnostic(now, capability.clone(), e.to_string());
        self.host.on_dialog(Dialog::PermissionDenied {
            capability: capability.clone(),
            message: format!("{e}. Camera and microphone access is required for proctoring."),
        });
        self.refusals.push(
            ViolationEvent::warn(ViolationKind::DevicePermissionDenied, now)
                .with_detail(format!("{capability}: {e}")),
        );
    }

    fn run_display_check(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        let attempts = match self.state {
            MonitorState::Checking { attempts, .. } => attempts + 1,
            _ => return Err(self.invalid("check displays")),
        };
        let config = self.config.detectors.display.clone();

        match self
            .platform
            .screen
            .geometry()
            .and_then(|g| evaluate(&g, &config))
        {
            Ok(assessment) if assessment.detected => {
                info!(attempts, "external display detected at entry");
                for line in assessment.debug_lines() {
                    debug!(%line, "display heuristic");
                }
                self.state = MonitorState::Checking {
                    attempts,
                    blocked: true,
                };
                self.host.on_dialog(Dialog::ExternalDisplayBlocked {
                    diagnostics: assessment.methods,
                    can_override: config.allow_override,
                });
                Ok(())
            }
            Ok(_) => self.activate(now),
            Err(e) => {
                self.audit.add_diagnostic(now, "display", e.to_string());
                if attempts >= config.max_check_attempts {
                    warn!(attempts, error = %e, "display check inconclusive, allowing entry");
                    self.activate(now)
                } else {
                    debug!(attempts, error = %e, "display check inconclusive, retrying");
                    self.state = MonitorState::Checking {
                        attempts,
                        blocked: false,
                    };
                    self.recheck_task = Some(self.schedule.schedule_once(
                        TaskTarget::DisplayRecheck,
                        config.retry_delay_ms,
                        now,
                    ));
                    Ok(())
                }
            }
        }
    }

    fn activate(&mut self, now: DateTime<Utc>) -> Result<(), MonitorError> {
        self.schedule.cancel_all();
        self.recheck_task = None;

        if self.config.detectors.fullscreen {
            if let Err(e) = self.platform.fullscreen.acquire() {
                warn!(error = %e, "could not enter fullscreen");
                self.audit.add_diagnostic(now, "fullscreen", e.to_string());
                self.host.on_dialog(Dialog::PermissionDenied {
                    capability: "fullscreen".into(),
                    message: e.to_string(),
                });
                if self.config.devices.require_fullscreen {
                    self.abort_start(now);
                    return Err(MonitorError::Precondition(e));
                }
            }
        }

        self.detectors = self.build_detectors();
        for (index, detector) in self.detectors.iter_mut().enumerate() {
            detector.start(now);
            for kind in detector.subscriptions() {
                self.listener_ids.push(self.listeners.subscribe(*kind));
            }
            if let Some(every) = detector.poll_interval_ms() {
                self.schedule
                    .schedule_repeating(TaskTarget::Detector(index), every, now);
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.activate(now);
        }
        self.state = MonitorState::Active;
        info!(
            detectors = self.detectors.len(),
            listeners = self.listeners.len(),
            "session active"
        );

        self.host.on_dialog(Dialog::ReadyToStart);
        self.host.on_notice(Notice::new(
            NoticeLevel::Info,
            "Secure test mode enabled",
            "Full screen, tab switching, and developer tools are monitored during this test.",
        ));

        // Refused devices and a refused fullscreen count against the session.
        let mut entry: Vec<Detection> = self
            .refusals
            .drain(..)
            .map(Detection::Violation)
            .collect();
        if self.config.detectors.fullscreen && !self.platform.fullscreen.is_fullscreen() {
            entry.push(Detection::Violation(
                ViolationEvent::warn(ViolationKind::FullscreenExit, now)
                    .with_detail("full screen was not entered"),
            ));
        }
        self.process(entry, now);
        Ok(())
    }

    fn build_detectors(&self) -> Vec<Box<dyn Detector>> {
        let cfg = &self.config.detectors;
        let has = |kind: TrackKind| self.view.as_ref().is_some_and(|v| v.has_live(kind));
        let mut detectors: Vec<Box<dyn Detector>> = Vec::new();

        if cfg.fullscreen {
            detectors.push(Box::new(FullscreenExitDetector::new(
                self.platform.fullscreen.is_fullscreen(),
            )));
        }
        if cfg.tab_switch {
            detectors.push(Box::new(TabSwitchDetector::new()));
        }
        if cfg.keys {
            detectors.push(Box::new(BlockedKeyDetector::new()));
        }
        if cfg.devtools.enabled {
            detectors.push(Box::new(DevToolsDetector::new(cfg.devtools.clone())));
        }
        if cfg.display.enabled {
            detectors.push(Box::new(ExternalDisplayDetector::new(cfg.display.clone())));
        }
        // Without a granted track these would only ever report the missing source.
        if cfg.face.enabled && has(TrackKind::Video) {
            detectors.push(Box::new(FacePresenceDetector::new(cfg.face.clone())));
            if cfg.face.head_tracking {
                detectors.push(Box::new(HeadOrientationDetector::new(
                    cfg.face.head_turn_threshold,
                    cfg.face.poll_interval_ms,
                )));
            }
        }
        if cfg.noise.enabled && has(TrackKind::Audio) {
            detectors.push(Box::new(AmbientNoiseDetector::new(cfg.noise.clone())));
        }
        detectors
    }

    fn process(&mut self, detections: Vec<Detection>, now: DateTime<Utc>) {
        if !self.state.is_running() {
            return;
        }

        let mut violations: Vec<ViolationEvent> = Vec::new();
        for detection in detections {
            match detection {
                Detection::Violation(event) => violations.push(event),
                Detection::Clear(DetectorKind::FullscreenExit) => self.clear_fullscreen_warning(),
                Detection::Clear(kind) => debug!(%kind, "condition cleared"),
                Detection::Diagnostic { source, message } => {
                    debug!(%source, %message, "detector diagnostic");
                    self.audit.add_diagnostic(now, source.to_string(), message);
                }
            }
        }
        if violations.is_empty() {
            return;
        }

        self.audit.record_violations(violations.len() as u64);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let decisions = session.record(&violations, now);

        for decision in decisions {
            match decision {
                PolicyEvent::Notice(notice) => {
                    self.audit.record_warning();
                    self.host.on_notice(notice);
                }
                PolicyEvent::LimitWarning {
                    kind: ViolationKind::FullscreenExit,
                    attempt,
                    limit,
                } => {
                    self.audit.record_warning();
                    let popup = self.open_popup();
                    self.state = MonitorState::Warning {
                        fullscreen: Some((attempt, limit)),
                        popup,
                    };
                    self.host
                        .on_dialog(Dialog::FullscreenRequired { attempt, limit });
                }
                PolicyEvent::LimitWarning {
                    kind,
                    attempt,
                    limit,
                } => {
                    self.audit.record_warning();
                    let (title, description) = kind.warning_text();
                    self.host.on_notice(Notice::new(
                        NoticeLevel::Warning,
                        format!("{title} ({attempt} of {limit})"),
                        description,
                    ));
                }
                PolicyEvent::PopupOpened(popup) => {
                    self.audit.record_warning();
                    let fullscreen = match &self.state {
                        MonitorState::Warning { fullscreen, .. } => *fullscreen,
                        _ => None,
                    };
                    self.host.on_dialog(Dialog::Warning {
                        attempt: popup.open_count,
                        limit: self.config.policy.popup_limit,
                        message: popup.message.clone(),
                    });
                    self.state = MonitorState::Warning {
                        fullscreen,
                        popup: Some(popup),
                    };
                }
                PolicyEvent::Terminate { reason } => self.terminate(reason, now),
            }
        }
    }

    fn open_popup(&self) -> Option<WarningPopup> {
        match &self.state {
            MonitorState::Warning { popup, .. } => popup.clone(),
            _ => None,
        }
    }

    fn clear_fullscreen_warning(&mut self) {
        if let MonitorState::Warning {
            fullscreen: Some(_),
            popup,
        } = &self.state
        {
            self.state = match popup.clone() {
                Some(popup) => MonitorState::Warning {
                    fullscreen: None,
                    popup: Some(popup),
                },
                None => MonitorState::Active,
            };
            info!("fullscreen restored");
        }
    }

    /// End the session for `reason`. Only the first call has any effect.
    fn terminate(&mut self, reason: String, now: DateTime<Utc>) {
        if matches!(self.state, MonitorState::Terminated { .. }) {
            return;
        }
        warn!(%reason, "session terminated");

        if let Some(session) = self.session.as_mut() {
            session.aggregator_mut().terminate(reason.clone());
            session.end(now, Some(reason.clone()));
        }
        self.teardown();
        self.state = MonitorState::Terminated {
            reason: reason.clone(),
        };
        self.audit.record_session_terminated();
        self.finish_report(now);

        self.host.on_dialog(Dialog::terminated(reason.clone()));
        self.host.on_terminate(&reason);
    }

    /// Release everything the session holds.
    ///
    /// Order: pending timers, detectors, listeners, media tracks, fullscreen.
    fn teardown(&mut self) {
        let tasks = self.schedule.cancel_all();
        for detector in self.detectors.iter_mut() {
            detector.stop();
        }
        self.detectors.clear();
        let listeners = self
            .listener_ids
            .drain(..)
            .filter(|id| self.listeners.remove(*id))
            .count();
        self.view = None;
        let tracks = self
            .stream
            .take()
            .map_or(0, |mut stream| stream.stop_all());
        self.platform.fullscreen.release();
        let dropped = self.rx.try_iter().count();

        debug!(tasks, listeners, tracks, dropped, "session torn down");
    }

    fn abort_start(&mut self, now: DateTime<Utc>) {
        self.teardown();
        if let Some(session) = self.session.as_mut() {
            session.end(now, None);
        }
        self.state = MonitorState::Idle;
    }

    fn finish_report(&mut self, now: DateTime<Utc>) {
        if let Some(session) = self.session.as_ref() {
            self.last_report = Some(self.reports.build(session, now));
        }
    }
}
