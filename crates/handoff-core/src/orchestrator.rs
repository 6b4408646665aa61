use std::sync::Arc;
use std::time::{Duration, Instant};

use handoff_bus::BusPublisher;
use handoff_provider::{Answer, AnswerEngine, AnswerRequest, HistoryTurn, Passage};
use handoff_schema::{
    BusMessage, ChatMessage, ChatReply, CustomerProfile, EscalationReason, InboundMessage, Source,
};
use tokio::time::timeout;

use crate::classifier::classify;
use crate::config::MainConfig;
use crate::customer::CustomerDirectory;
use crate::entities::extract_entities;
use crate::error::{ChatError, SessionError};
use crate::escalation::{handoff_message, truncate, TicketFactory, APOLOGY_MESSAGE};
use crate::session::{SessionGuard, SessionStore};
use crate::tenant::{TenantProfile, TenantRegistry};

const MAX_SOURCES: usize = 3;
const SOURCE_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub answer_timeout: Duration,
    pub persist_timeout: Duration,
    pub context_messages: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&MainConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(main: &MainConfig) -> Self {
        Self {
            answer_timeout: Duration::from_millis(main.timeouts.answer_ms),
            persist_timeout: Duration::from_millis(main.timeouts.persist_ms),
            context_messages: main.session.context_messages,
        }
    }
}

/// Single entry point for an inbound customer message.
pub struct Orchestrator {
    tenants: Arc<TenantRegistry>,
    sessions: Arc<SessionStore>,
    engine: Arc<dyn AnswerEngine>,
    factory: TicketFactory,
    customers: Arc<dyn CustomerDirectory>,
    bus: BusPublisher,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        tenants: Arc<TenantRegistry>,
        sessions: Arc<SessionStore>,
        engine: Arc<dyn AnswerEngine>,
        factory: TicketFactory,
        customers: Arc<dyn CustomerDirectory>,
        bus: BusPublisher,
    ) -> Self {
        Self {
            tenants,
            sessions,
            engine,
            factory,
            customers,
            bus,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn tenants(&self) -> &Arc<TenantRegistry> {
        &self.tenants
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn tickets(&self) -> &Arc<handoff_tickets::TicketStore> {
        self.factory.store()
    }

    pub fn engine(&self) -> &Arc<dyn AnswerEngine> {
        &self.engine
    }

    pub async fn handle_inbound(&self, inbound: InboundMessage) -> Result<ChatReply, ChatError> {
        let started = Instant::now();
        let tenant = self
            .tenants
            .lookup(&inbound.tenant)
            .ok_or_else(|| ChatError::UnknownTenant(inbound.tenant.clone()))?;

        let guard = self
            .sessions
            .get_or_create(
                inbound.session_id.as_deref(),
                &tenant.tenant_id,
                inbound.customer_id.as_deref(),
            )
            .await?;

        let entities = extract_entities(&inbound.message);
        let drafted = self.draft_answer(&tenant, &guard, &inbound.message).await;
        let engine_failed = drafted.is_none();

        let (mut text, mut confidence, sources, decision) = match drafted {
            Some(answer) => {
                let decision = classify(
                    &inbound.message,
                    answer.confidence,
                    &tenant.classifier,
                    tenant.confidence_threshold,
                );
                (answer.answer, answer.confidence, to_sources(answer.passages), decision)
            }
            None => (
                APOLOGY_MESSAGE.to_string(),
                0.0,
                Vec::new(),
                Some(EscalationReason::TechnicalProblem),
            ),
        };

        let mut escalation_reason = None;
        if let Some(reason) = decision {
            let customer = self.lookup_customer(&guard, &tenant).await;
            let ticket = self
                .record_escalation(&guard, &tenant, reason, &inbound.message, customer.as_ref())
                .await?;

            if !engine_failed {
                text = handoff_message(ticket.reason).to_string();
            }
            confidence = 0.0;
            escalation_reason = Some(ticket.reason);
        }

        let session_id = guard.session_id().to_string();
        let user_msg = ChatMessage::user(&session_id, &tenant.tenant_id, &inbound.message);
        let reply_msg = ChatMessage::assistant(&session_id, &tenant.tenant_id, &text);
        self.append_turn(guard, user_msg, reply_msg).await;

        tracing::info!(
            tenant = %tenant.tenant_id,
            %session_id,
            confidence,
            escalated = escalation_reason.is_some(),
            reason = ?escalation_reason,
            sources = sources.len(),
            entities = ?entities,
            "chat interaction"
        );
        let _ = self
            .bus
            .publish(BusMessage::ReplyReady {
                tenant: tenant.tenant_id.clone(),
                session_id: session_id.clone(),
                escalated: escalation_reason.is_some(),
            })
            .await;

        Ok(ChatReply {
            session_id,
            message: text,
            confidence,
            escalated: escalation_reason.is_some(),
            escalation_reason,
            sources,
            response_time: started.elapsed().as_secs_f64(),
        })
    }

    /// `None` means the engine failed, timed out or returned garbage.
    async fn draft_answer(
        &self,
        tenant: &TenantProfile,
        guard: &SessionGuard,
        message: &str,
    ) -> Option<Answer> {
        let request = AnswerRequest {
            tenant: tenant.tenant_id.clone(),
            message: message.to_string(),
            history: guard
                .context(self.settings.context_messages)
                .iter()
                .map(|m| HistoryTurn {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
        };

        match timeout(self.settings.answer_timeout, self.engine.generate(request)).await {
            Ok(Ok(answer)) => match answer.validated() {
                Ok(answer) => Some(answer),
                Err(e) => {
                    tracing::warn!(tenant = %tenant.tenant_id, "Rejected answer: {e:#}");
                    None
                }
            },
            Ok(Err(e)) => {
                tracing::warn!(tenant = %tenant.tenant_id, "Answer engine failed: {e:#}");
                None
            }
            Err(_) => {
                tracing::warn!(
                    tenant = %tenant.tenant_id,
                    timeout_ms = self.settings.answer_timeout.as_millis() as u64,
                    "Answer engine timed out"
                );
                None
            }
        }
    }

    async fn lookup_customer(
        &self,
        guard: &SessionGuard,
        tenant: &TenantProfile,
    ) -> Option<CustomerProfile> {
        let customer_id = guard.session().customer_id.as_deref()?;
        match self.customers.lookup(&tenant.tenant_id, customer_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(tenant = %tenant.tenant_id, customer_id, "Customer lookup failed: {e:#}");
                None
            }
        }
    }

    async fn record_escalation(
        &self,
        guard: &SessionGuard,
        tenant: &TenantProfile,
        reason: EscalationReason,
        trigger: &str,
        customer: Option<&CustomerProfile>,
    ) -> Result<handoff_schema::EscalationTicket, ChatError> {
        let result = self
            .factory
            .build_ticket(
                guard.session(),
                tenant,
                reason,
                trigger,
                customer,
                self.settings.persist_timeout,
            )
            .await;
        result.map_err(|source| {
            tracing::error!(
                tenant = %tenant.tenant_id,
                session_id = %guard.session_id(),
                %reason,
                "Escalation could not be recorded: {source}"
            );
            ChatError::EscalationNotRecorded {
                tenant: tenant.tenant_id.clone(),
                support_contact: tenant.support_contact.clone(),
                source,
            }
        })
    }

    /// Append both sides of the turn. If the session vanished underneath the
    /// request the turn lands in whatever session now owns the id, created
    /// fresh if there is none.
    async fn append_turn(&self, mut guard: SessionGuard, user: ChatMessage, reply: ChatMessage) {
        match append_both(&mut guard, user.clone(), reply.clone()) {
            Ok(()) => {}
            Err(SessionError::NotFound(session_id)) => {
                tracing::info!(%session_id, "session disappeared mid-request, recreating");
                let customer_id = guard.session().customer_id.clone();
                let tenant = guard.session().tenant.clone();
                drop(guard);
                let recovered = self
                    .sessions
                    .get_or_create(Some(&session_id), &tenant, customer_id.as_deref())
                    .await
                    .and_then(|mut fresh| append_both(&mut fresh, user, reply));
                if let Err(e) = recovered {
                    tracing::warn!("Failed to append to recreated session: {e}");
                }
            }
            Err(e) => tracing::warn!("Failed to append turn: {e}"),
        }
    }
}

fn append_both(
    guard: &mut SessionGuard,
    user: ChatMessage,
    reply: ChatMessage,
) -> Result<(), SessionError> {
    guard.append(user)?;
    guard.append(reply)
}

fn to_sources(passages: Vec<Passage>) -> Vec<Source> {
    passages
        .into_iter()
        .take(MAX_SOURCES)
        .map(|p| Source {
            content: truncate(&p.content, SOURCE_PREVIEW_CHARS),
            metadata: p.metadata,
        })
        .collect()
}
