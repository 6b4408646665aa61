use chrono::{DateTime, Utc};
use handoff_schema::{EscalationTicket, TicketStatus};

use crate::TicketError;

/// A lifecycle operation requested against a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketAction {
    Assign { agent_id: String },
    Start,
    Resolve { notes: Option<String> },
    Close,
}

impl TicketAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::Start => "start",
            Self::Resolve { .. } => "resolve",
            Self::Close => "close",
        }
    }

    pub fn target(&self) -> TicketStatus {
        match self {
            Self::Assign { .. } => TicketStatus::Assigned,
            Self::Start => TicketStatus::InProgress,
            Self::Resolve { .. } => TicketStatus::Resolved,
            Self::Close => TicketStatus::Closed,
        }
    }

    fn allowed_from(&self, status: TicketStatus) -> bool {
        use TicketStatus::*;
        match self {
            Self::Assign { .. } => matches!(status, Pending | Assigned),
            Self::Start => status == Assigned,
            Self::Resolve { .. } => status != Closed,
            Self::Close => status == Resolved,
        }
    }

    /// Apply the action in place and return the status the ticket left.
    /// On error the ticket is untouched.
    pub fn apply(
        &self,
        ticket: &mut EscalationTicket,
        now: DateTime<Utc>,
    ) -> Result<TicketStatus, TicketError> {
        let from = ticket.status;
        if !self.allowed_from(from) {
            return Err(TicketError::InvalidTransition {
                ticket_id: ticket.ticket_id.clone(),
                from,
                action: self.name(),
            });
        }

        match self {
            Self::Assign { agent_id } => {
                ticket.assigned_to = Some(agent_id.clone());
            }
            Self::Start | Self::Close => {}
            Self::Resolve { notes } => {
                if let Some(notes) = notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                    ticket.notes.push(format!("Resolution: {notes}"));
                }
                if ticket.resolved_at.is_none() {
                    ticket.resolved_at = Some(now.max(ticket.created_at));
                }
            }
        }

        ticket.status = self.target();
        ticket.updated_at = now.max(ticket.created_at);
        Ok(from)
    }
}
