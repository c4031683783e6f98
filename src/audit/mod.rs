//! Audit trail for operators reviewing proctored sessions.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, AuditLog, AuditStats, DiagnosticEntry,
    SharedAuditLog,
};
