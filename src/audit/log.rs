//! Operator-facing audit log.
//!
//! Counts what the monitor saw and decided, and keeps a short ring of
//! diagnostic notes (probe failures, permission denials, fail-open
//! decisions). Nothing here is shown to the candidate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Diagnostics kept in memory.
pub const DIAGNOSTIC_CAPACITY: usize = 64;

/// One operator-facing note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub at: DateTime<Utc>,
    pub source: String,
    pub message: String,
}

#[derive(Debug)]
pub struct AuditLog {
    /// Signals delivered to at least one listener
    signals_received: AtomicU64,
    /// Signals dropped (no listener, or session not running)
    signals_dropped: AtomicU64,
    /// Violations handed to the aggregator
    violations: AtomicU64,
    /// Notices, limit warnings and popups shown
    warnings: AtomicU64,
    sessions_started: AtomicU64,
    sessions_terminated: AtomicU64,
    sessions_completed: AtomicU64,
    diagnostics: Mutex<VecDeque<DiagnosticEntry>>,
    created_at: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            signals_received: AtomicU64::new(0),
            signals_dropped: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_terminated: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            diagnostics: Mutex::new(VecDeque::with_capacity(DIAGNOSTIC_CAPACITY)),
            created_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create an audit log that accumulates across runs in `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!(error = %e, "could not load previous audit stats");
        }

        log
    }

    pub fn record_signal(&self) {
        self.signals_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_signal(&self) {
        self.signals_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_violations(&self, count: u64) {
        self.violations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_warning(&self) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_terminated(&self) {
        self.sessions_terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a diagnostic, evicting the oldest past capacity.
    pub fn add_diagnostic(&self, at: DateTime<Utc>, source: impl Into<String>, message: impl Into<String>) {
        let mut ring = self.diagnostics.lock().unwrap_or_else(|e| e.into_inner());
        if ring.len() == DIAGNOSTIC_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(DiagnosticEntry {
            at,
            source: source.into(),
            message: message.into(),
        });
    }

    pub fn diagnostics(&self) -> Vec<DiagnosticEntry> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            signals_received: self.signals_received.load(Ordering::Relaxed),
            signals_dropped: self.signals_dropped.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_terminated: self.sessions_terminated.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            created_at: self.created_at,
        }
    }

    /// Summary for `status` output.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let diagnostics = self.diagnostics();
        let mut out = format!(
            "Audit Statistics:\n\
             - Sessions started: {}\n\
             - Sessions terminated: {}\n\
             - Sessions completed: {}\n\
             - Signals received: {}\n\
             - Signals dropped: {}\n\
             - Violations recorded: {}\n\
             - Warnings shown: {}",
            stats.sessions_started,
            stats.sessions_terminated,
            stats.sessions_completed,
            stats.signals_received,
            stats.signals_dropped,
            stats.violations,
            stats.warnings,
        );
        if !diagnostics.is_empty() {
            out.push_str(&format!("\n\nRecent diagnostics ({}):", diagnostics.len()));
            for d in diagnostics.iter().rev().take(5) {
                out.push_str(&format!(
                    "\n  [{}] {}: {}",
                    d.at.format("%H:%M:%S"),
                    d.source,
                    d.message
                ));
            }
        }
        out
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                signals_received: stats.signals_received,
                signals_dropped: stats.signals_dropped,
                violations: stats.violations,
                warnings: stats.warnings,
                sessions_started: stats.sessions_started,
                sessions_terminated: stats.sessions_terminated,
                sessions_completed: stats.sessions_completed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let p: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.signals_received
                    .store(p.signals_received, Ordering::Relaxed);
                self.signals_dropped.store(p.signals_dropped, Ordering::Relaxed);
                self.violations.store(p.violations, Ordering::Relaxed);
                self.warnings.store(p.warnings, Ordering::Relaxed);
                self.sessions_started
                    .store(p.sessions_started, Ordering::Relaxed);
                self.sessions_terminated
                    .store(p.sessions_terminated, Ordering::Relaxed);
                self.sessions_completed
                    .store(p.sessions_completed, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        for counter in [
            &self.signals_received,
            &self.signals_dropped,
            &self.violations,
            &self.warnings,
            &self.sessions_started,
            &self.sessions_terminated,
            &self.sessions_completed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub signals_received: u64,
    pub signals_dropped: u64,
    pub violations: u64,
    pub warnings: u64,
    pub sessions_started: u64,
    pub sessions_terminated: u64,
    pub sessions_completed: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    signals_received: u64,
    signals_dropped: u64,
    violations: u64,
    warnings: u64,
    sessions_started: u64,
    sessions_terminated: u64,
    sessions_completed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared audit log.
pub type SharedAuditLog = Arc<AuditLog>;

pub fn create_shared_log() -> SharedAuditLog {
    Arc::new(AuditLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedAuditLog {
    Arc::new(AuditLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_and_reset() {
        let log = AuditLog::new();
        log.record_signal();
        log.record_signal();
        log.record_dropped_signal();
        log.record_violations(3);

        let stats = log.stats();
        assert_eq!(stats.signals_received, 2);
        assert_eq!(stats.signals_dropped, 1);
        assert_eq!(stats.violations, 3);

        log.reset();
        assert_eq!(log.stats().violations, 0);
    }

    #[test]
    fn test_diagnostic_ring_evicts_oldest() {
        let log = AuditLog::new();
        let now = Utc::now();
        for i in 0..(DIAGNOSTIC_CAPACITY + 3) {
            log.add_diagnostic(now, "display", format!("attempt {i}"));
        }
        let diagnostics = log.diagnostics();
        assert_eq!(diagnostics.len(), DIAGNOSTIC_CAPACITY);
        assert_eq!(diagnostics[0].message, "attempt 3");
    }

    #[test]
    fn test_persistence_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "proctor-sentinel-audit-{}.json",
            uuid::Uuid::new_v4()
        ));
        {
            let log = AuditLog::with_persistence(path.clone());
            log.record_session_started();
            log.record_session_terminated();
            log.save().unwrap();
        }
        let log = AuditLog::with_persistence(path.clone());
        assert_eq!(log.stats().sessions_started, 1);
        assert_eq!(log.stats().sessions_terminated, 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_summary_mentions_diagnostics() {
        let log = AuditLog::new();
        assert!(!log.summary().contains("Recent diagnostics"));
        log.add_diagnostic(Utc::now(), "camera", "permission denied");
        assert!(log.summary().contains("camera: permission denied"));
    }
}
