//! Turning an escalation decision into a persisted ticket.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use handoff_bus::BusPublisher;
use handoff_schema::{
    BusMessage, ChatMessage, ChatSession, CustomerProfile, EscalationPriority, EscalationReason,
    EscalationRule, EscalationTicket, MessageRole, TicketStatus,
};
use handoff_tickets::{TicketError, TicketStore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use uuid::Uuid;

use crate::tenant::TenantProfile;

const SUMMARY_MESSAGES: usize = 5;
const SUMMARY_BODY_CHARS: usize = 100;
const EMPTY_SUMMARY: &str = "Keine Konversationshistorie verfügbar.";

pub const APOLOGY_MESSAGE: &str = "Entschuldigung, es gab einen technischen Fehler. Bitte versuchen Sie es später erneut oder kontaktieren Sie unseren Support.";

/// Text shown to the customer in place of the drafted answer once a human takes over.
pub fn handoff_message(reason: EscalationReason) -> &'static str {
    match reason {
        EscalationReason::LowConfidence => {
            "Ich verstehe Ihre Anfrage, aber ich benötige weitere Informationen, um Ihnen optimal helfen zu können. Ich verbinde Sie mit einem unserer Mitarbeiter."
        }
        EscalationReason::Complaint => {
            "Ich verstehe, dass Sie unzufrieden sind. Lassen Sie mich Sie mit einem unserer erfahrenen Mitarbeiter verbinden, der sich persönlich um Ihr Anliegen kümmert."
        }
        EscalationReason::EmotionalDistress => {
            "Ich spüre, dass Sie frustriert sind. Lassen Sie mich Sie mit einem unserer Mitarbeiter verbinden, der Ihnen persönlich weiterhelfen kann."
        }
        EscalationReason::ManualIntervention => {
            "Für diese Anfrage benötigen Sie einen persönlichen Kontakt. Ich verbinde Sie gerne mit einem unserer Mitarbeiter."
        }
        EscalationReason::TechnicalProblem => {
            "Es gab einen technischen Fehler. Lassen Sie mich Sie mit unserem Support verbinden."
        }
        _ => "Ich verbinde Sie mit einem unserer Mitarbeiter.",
    }
}

/// First tenant rule whose trigger occurs in the reason's wire name.
fn matching_rule(rules: &[EscalationRule], reason: EscalationReason) -> Option<&EscalationRule> {
    rules.iter().find(|r| reason.as_str().contains(r.trigger.as_str()))
}

/// Final reason and priority after tenant hints and the VIP override.
pub fn resolve_priority(
    reason: EscalationReason,
    rules: &[EscalationRule],
    customer: Option<&CustomerProfile>,
) -> (EscalationReason, EscalationPriority) {
    let mut priority = reason.default_priority();
    if let Some(hint) = matching_rule(rules, reason).and_then(|r| r.priority) {
        priority = priority.max(hint);
    }
    if customer.is_some_and(|c| c.is_vip) {
        return (EscalationReason::VipCustomer, EscalationPriority::High);
    }
    (reason, priority)
}

pub fn department_for(reason: EscalationReason, tenant: &TenantProfile) -> String {
    matching_rule(&tenant.escalation_rules, reason)
        .map(|r| r.department.clone())
        .or_else(|| tenant.departments.get(&reason).cloned())
        .unwrap_or_else(|| tenant.default_department.clone())
}

/// Numbered, role-labelled digest of the last few messages.
pub fn summarize(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return EMPTY_SUMMARY.to_string();
    }
    let start = messages.len().saturating_sub(SUMMARY_MESSAGES);
    messages[start..]
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            let role = match msg.role {
                MessageRole::User => "Kunde",
                MessageRole::Assistant => "Assistent",
            };
            format!("{}. {role}: {}", i + 1, truncate(&msg.content, SUMMARY_BODY_CHARS))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Draft a pending ticket without persisting it.
pub fn draft_ticket(
    session: &ChatSession,
    tenant: &TenantProfile,
    reason: EscalationReason,
    trigger_message: &str,
    customer: Option<&CustomerProfile>,
) -> EscalationTicket {
    let (reason, priority) = resolve_priority(reason, &tenant.escalation_rules, customer);
    let now = Utc::now();
    EscalationTicket {
        ticket_id: Uuid::new_v4().to_string(),
        session_id: session.session_id.clone(),
        tenant: session.tenant.clone(),
        customer_id: session.customer_id.clone(),
        reason,
        priority,
        status: TicketStatus::Pending,
        assigned_to: None,
        department: department_for(reason, tenant),
        trigger_message: trigger_message.to_string(),
        conversation_summary: summarize(&session.messages),
        notes: Vec::new(),
        created_at: now,
        updated_at: now,
        resolved_at: None,
    }
}

/// Turns an escalation decision into a persisted ticket.
pub struct TicketFactory {
    store: Arc<TicketStore>,
    bus: Option<BusPublisher>,
}

impl TicketFactory {
    pub fn new(store: Arc<TicketStore>) -> Self {
        Self { store, bus: None }
    }

    pub fn with_bus(mut self, bus: BusPublisher) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn store(&self) -> &Arc<TicketStore> {
        &self.store
    }

    /// Draft a ticket for the escalation and persist it within `deadline`.
    pub async fn build_ticket(
        &self,
        session: &ChatSession,
        tenant: &TenantProfile,
        reason: EscalationReason,
        trigger_message: &str,
        customer: Option<&CustomerProfile>,
        deadline: Duration,
    ) -> Result<EscalationTicket, TicketError> {
        let ticket = draft_ticket(session, tenant, reason, trigger_message, customer);
        self.record(ticket, deadline).await
    }

    /// Persist and announce a drafted ticket, giving up after `deadline`.
    ///
    /// The write runs on its own task. If it lands after the deadline the
    /// ticket is deleted again, so a failed escalation never leaves a stray
    /// ticket in the queue. Nothing is announced unless the write succeeds in
    /// time.
    pub async fn record(
        &self,
        ticket: EscalationTicket,
        deadline: Duration,
    ) -> Result<EscalationTicket, TicketError> {
        let store = self.store.clone();
        let pending = ticket.clone();
        let mut write = tokio::spawn(async move { store.save(&pending).await });

        match timeout(deadline, &mut write).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => return Err(TicketError::persistence(e)),
            Err(_) => {
                self.discard_late_write(write, ticket.ticket_id.clone());
                return Err(TicketError::persistence("ticket write timed out"));
            }
        }

        tracing::info!(
            ticket_id = %ticket.ticket_id,
            tenant = %ticket.tenant,
            session_id = %ticket.session_id,
            reason = %ticket.reason,
            priority = %ticket.priority,
            department = %ticket.department,
            "escalation ticket created"
        );
        if let Some(bus) = &self.bus {
            let _ = bus
                .publish(BusMessage::EscalationCreated {
                    ticket_id: ticket.ticket_id.clone(),
                    tenant: ticket.tenant.clone(),
                    session_id: ticket.session_id.clone(),
                    reason: ticket.reason,
                    priority: ticket.priority,
                    department: ticket.department.clone(),
                })
                .await;
        }
        Ok(ticket)
    }

    fn discard_late_write(
        &self,
        write: JoinHandle<Result<(), TicketError>>,
        ticket_id: String,
    ) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if !matches!(write.await, Ok(Ok(()))) {
                return;
            }
            match store.delete(&ticket_id).await {
                Ok(_) => tracing::warn!(%ticket_id, "discarded ticket written after deadline"),
                Err(e) => tracing::error!(%ticket_id, "Failed to discard late ticket: {e}"),
            }
        });
    }
}
