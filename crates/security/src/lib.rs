//! Security module for IronLoom: path confinement, the shell deny-list, and
//! audit logging.
//!
//! Provides:
//! - **Path validation**: sandbox roots and the sensitive-location deny-list
//! - **Command checks**: destructive shell patterns refused before spawning
//! - **Audit logging**: structured lifecycle and denial events

pub mod audit;
pub mod command;
pub mod path;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use command::{DANGEROUS_PATTERNS, find_dangerous_pattern};
pub use path::{
    PathValidationError, check_sandbox, check_sensitive, is_path_allowed, is_sensitive_path,
    resolve_path,
};
