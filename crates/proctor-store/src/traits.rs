//! Store trait definitions

use proctor_util::SessionId;

use crate::{AuditEvent, StoreResult};

/// Audit store
pub trait Store: Send + Sync {
    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    /// Get every audit event for one session, oldest first
    fn get_session_audits(&self, session_id: &SessionId) -> StoreResult<Vec<AuditEvent>>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
