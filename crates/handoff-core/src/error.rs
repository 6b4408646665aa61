use handoff_tickets::TicketError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The session was evicted or ended while a handle to it was still held.
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {session_id} belongs to another tenant")]
    TenantMismatch { session_id: String },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// An escalation was decided but the ticket could not be stored.
    #[error("escalation could not be recorded for tenant {tenant}")]
    EscalationNotRecorded {
        tenant: String,
        support_contact: String,
        #[source]
        source: TicketError,
    },
}
