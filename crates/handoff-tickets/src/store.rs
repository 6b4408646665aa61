use std::sync::Arc;

use chrono::{DateTime, Utc};
use handoff_bus::BusPublisher;
use handoff_schema::{BusMessage, EscalationTicket, TicketStatus};
use tokio::sync::Mutex;

use crate::{TicketAction, TicketError, TicketRepository};

/// Ticket operations on top of a [`TicketRepository`].
///
/// Every read-modify-write (lifecycle transitions, guarded saves, cleanup)
/// runs under a single write lock so two updates to the same record never
/// interleave. Plain reads bypass the lock.
pub struct TicketStore {
    repo: Arc<dyn TicketRepository>,
    write_lock: Mutex<()>,
    bus: Option<BusPublisher>,
}

impl TicketStore {
    pub fn new(repo: Arc<dyn TicketRepository>) -> Self {
        Self {
            repo,
            write_lock: Mutex::new(()),
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: BusPublisher) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Insert or update a ticket. An existing record keeps its session and tenant.
    pub async fn save(&self, ticket: &EscalationTicket) -> Result<(), TicketError> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self
            .repo
            .get(&ticket.ticket_id)
            .await
            .map_err(TicketError::persistence)?
        {
            if existing.session_id != ticket.session_id {
                return Err(TicketError::ImmutableField {
                    ticket_id: ticket.ticket_id.clone(),
                    field: "session_id",
                });
            }
            if existing.tenant != ticket.tenant {
                return Err(TicketError::ImmutableField {
                    ticket_id: ticket.ticket_id.clone(),
                    field: "tenant",
                });
            }
        }
        self.repo.save(ticket).await.map_err(TicketError::persistence)
    }

    /// Read failures are logged and reported as absent.
    pub async fn get(&self, ticket_id: &str) -> Option<EscalationTicket> {
        match self.repo.get(ticket_id).await {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::warn!(ticket_id, "Failed to read ticket: {e:#}");
                None
            }
        }
    }

    pub async fn get_for_tenant(&self, tenant: &str, ticket_id: &str) -> Option<EscalationTicket> {
        self.get(ticket_id).await.filter(|t| t.tenant == tenant)
    }

    pub async fn list_all(&self, tenant: Option<&str>) -> Vec<EscalationTicket> {
        match self.repo.list(tenant).await {
            Ok(tickets) => tickets,
            Err(e) => {
                tracing::warn!(?tenant, "Failed to list tickets: {e:#}");
                Vec::new()
            }
        }
    }

    /// Pending tickets, most urgent first, oldest first within a priority.
    pub async fn list_pending(&self, tenant: Option<&str>) -> Vec<EscalationTicket> {
        let mut pending: Vec<_> = self
            .list_all(tenant)
            .await
            .into_iter()
            .filter(|t| t.status == TicketStatus::Pending)
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        pending
    }

    pub async fn assign(&self, ticket_id: &str, agent_id: &str) -> Result<EscalationTicket, TicketError> {
        self.apply(
            ticket_id,
            TicketAction::Assign {
                agent_id: agent_id.to_string(),
            },
        )
        .await
    }

    pub async fn start(&self, ticket_id: &str) -> Result<EscalationTicket, TicketError> {
        self.apply(ticket_id, TicketAction::Start).await
    }

    pub async fn resolve(
        &self,
        ticket_id: &str,
        notes: Option<&str>,
    ) -> Result<EscalationTicket, TicketError> {
        self.apply(
            ticket_id,
            TicketAction::Resolve {
                notes: notes.map(str::to_string),
            },
        )
        .await
    }

    pub async fn close(&self, ticket_id: &str) -> Result<EscalationTicket, TicketError> {
        self.apply(ticket_id, TicketAction::Close).await
    }

    pub async fn apply(
        &self,
        ticket_id: &str,
        action: TicketAction,
    ) -> Result<EscalationTicket, TicketError> {
        let _guard = self.write_lock.lock().await;
        let mut ticket = match self.repo.get(ticket_id).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return Err(TicketError::NotFound(ticket_id.to_string())),
            Err(e) => {
                tracing::warn!(ticket_id, "Failed to read ticket for update: {e:#}");
                return Err(TicketError::NotFound(ticket_id.to_string()));
            }
        };

        let from = action.apply(&mut ticket, Utc::now())?;
        self.repo
            .save(&ticket)
            .await
            .map_err(TicketError::persistence)?;

        tracing::info!(
            ticket_id,
            tenant = %ticket.tenant,
            %from,
            to = %ticket.status,
            "ticket transitioned"
        );
        if let Some(bus) = &self.bus {
            let _ = bus
                .publish(BusMessage::TicketTransitioned {
                    ticket_id: ticket.ticket_id.clone(),
                    tenant: ticket.tenant.clone(),
                    from,
                    to: ticket.status,
                })
                .await;
        }
        Ok(ticket)
    }

    /// Remove one ticket. Returns false if it did not exist.
    pub async fn delete(&self, ticket_id: &str) -> Result<bool, TicketError> {
        let _guard = self.write_lock.lock().await;
        self.repo
            .delete(ticket_id)
            .await
            .map_err(TicketError::persistence)
    }

    /// Delete every ticket created before `cutoff`. Returns how many were removed.
    pub async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<usize, TicketError> {
        let _guard = self.write_lock.lock().await;
        let tickets = self.repo.list(None).await.map_err(TicketError::persistence)?;

        let mut removed = 0;
        for ticket in tickets.iter().filter(|t| t.created_at < cutoff) {
            match self.repo.delete(&ticket.ticket_id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(ticket_id = %ticket.ticket_id, "Failed to delete ticket: {e:#}")
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, %cutoff, "cleaned up old tickets");
        }
        Ok(removed)
    }
}
