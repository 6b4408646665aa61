use handoff_schema::TicketStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("ticket not found: {0}")]
    NotFound(String),

    /// The requested lifecycle operation is not allowed from the current status.
    #[error("cannot {action} ticket {ticket_id} while it is {from}")]
    InvalidTransition {
        ticket_id: String,
        from: TicketStatus,
        action: &'static str,
    },

    #[error("ticket {ticket_id}: {field} cannot change after creation")]
    ImmutableField {
        ticket_id: String,
        field: &'static str,
    },

    #[error("ticket persistence failed: {source}")]
    Persistence {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TicketError {
    pub fn persistence(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Persistence {
            source: source.into(),
        }
    }
}
