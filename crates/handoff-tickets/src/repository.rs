use anyhow::Result;
use async_trait::async_trait;
use handoff_schema::EscalationTicket;

/// Storage backend for tickets. Implementations must make `save` atomic:
/// a concurrent reader sees either the previous record or the new one.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn save(&self, ticket: &EscalationTicket) -> Result<()>;

    async fn get(&self, ticket_id: &str) -> Result<Option<EscalationTicket>>;

    /// All readable tickets, optionally restricted to one tenant.
    /// Malformed records are skipped and logged.
    async fn list(&self, tenant: Option<&str>) -> Result<Vec<EscalationTicket>>;

    /// Returns true if a record was removed.
    async fn delete(&self, ticket_id: &str) -> Result<bool>;
}
