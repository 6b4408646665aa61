use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================
// Conversation
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub tenant: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        session_id: impl Into<String>,
        tenant: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            tenant: tenant.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(
        session_id: impl Into<String>,
        tenant: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(session_id, tenant, MessageRole::User, content)
    }

    pub fn assistant(
        session_id: impl Into<String>,
        tenant: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(session_id, tenant, MessageRole::Assistant, content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSession {
    pub session_id: String,
    pub tenant: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(
        session_id: impl Into<String>,
        tenant: impl Into<String>,
        customer_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            tenant: tenant.into(),
            customer_id,
            created_at: now,
            last_activity: now,
            messages: Vec::new(),
        }
    }

    /// Advance `last_activity`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.touch();
    }

    /// The most recent `max_messages` messages, oldest first.
    pub fn recent(&self, max_messages: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(max_messages);
        &self.messages[start..]
    }
}

// ============================================================
// Escalation
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    LowConfidence,
    RepeatedQuestions,
    EmotionalDistress,
    VipCustomer,
    CriticalIssue,
    TechnicalProblem,
    Complaint,
    ComplexRequest,
    ManualIntervention,
}

impl EscalationReason {
    pub const ALL: [EscalationReason; 9] = [
        Self::LowConfidence,
        Self::RepeatedQuestions,
        Self::EmotionalDistress,
        Self::VipCustomer,
        Self::CriticalIssue,
        Self::TechnicalProblem,
        Self::Complaint,
        Self::ComplexRequest,
        Self::ManualIntervention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::RepeatedQuestions => "repeated_questions",
            Self::EmotionalDistress => "emotional_distress",
            Self::VipCustomer => "vip_customer",
            Self::CriticalIssue => "critical_issue",
            Self::TechnicalProblem => "technical_problem",
            Self::Complaint => "complaint",
            Self::ComplexRequest => "complex_request",
            Self::ManualIntervention => "manual_intervention",
        }
    }

    /// Default priority assigned to a ticket raised for this reason.
    pub fn default_priority(&self) -> EscalationPriority {
        match self {
            Self::LowConfidence => EscalationPriority::Low,
            Self::RepeatedQuestions => EscalationPriority::Medium,
            Self::EmotionalDistress => EscalationPriority::High,
            Self::VipCustomer => EscalationPriority::High,
            Self::CriticalIssue => EscalationPriority::Urgent,
            Self::TechnicalProblem => EscalationPriority::Medium,
            Self::Complaint => EscalationPriority::High,
            Self::ComplexRequest => EscalationPriority::Medium,
            Self::ManualIntervention => EscalationPriority::High,
        }
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscalationReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| anyhow!("unknown escalation reason: {s}"))
    }
}

/// Ticket severity. Variant order defines the sort order (`Low < Urgent`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl EscalationPriority {
    pub const ALL: [EscalationPriority; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for EscalationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscalationPriority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| anyhow!("unknown escalation priority: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        Self::Pending,
        Self::Assigned,
        Self::InProgress,
        Self::Resolved,
        Self::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// `resolved_at` is set exactly for these states.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| anyhow!("unknown ticket status: {s}"))
    }
}

/// Durable record of a handoff to a human agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationTicket {
    pub ticket_id: String,
    pub session_id: String,
    pub tenant: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub reason: EscalationReason,
    pub priority: EscalationPriority,
    pub status: TicketStatus,
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub department: String,
    pub trigger_message: String,
    pub conversation_summary: String,
    #[serde(default)]
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Tenant-scoped rule mapping a reason substring to a department.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscalationRule {
    pub trigger: String,
    pub department: String,
    #[serde(default)]
    pub priority: Option<EscalationPriority>,
}

/// Customer data as returned by the customer directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CustomerProfile {
    pub customer_id: String,
    #[serde(default)]
    pub is_vip: bool,
    #[serde(default)]
    pub display_name: Option<String>,
}

// ============================================================
// Inbound / outbound contract
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub tenant: String,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Supporting passage returned with an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub message: String,
    pub confidence: f64,
    pub escalated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Seconds spent handling the request.
    pub response_time: f64,
}

// ============================================================
// Bus
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusMessage {
    EscalationCreated {
        ticket_id: String,
        tenant: String,
        session_id: String,
        reason: EscalationReason,
        priority: EscalationPriority,
        department: String,
    },
    TicketTransitioned {
        ticket_id: String,
        tenant: String,
        from: TicketStatus,
        to: TicketStatus,
    },
    ReplyReady {
        tenant: String,
        session_id: String,
        escalated: bool,
    },
    SessionsSwept {
        removed: usize,
    },
    TicketsCleanedUp {
        removed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_total() {
        assert!(EscalationPriority::Low < EscalationPriority::Medium);
        assert!(EscalationPriority::Medium < EscalationPriority::High);
        assert!(EscalationPriority::High < EscalationPriority::Urgent);
        assert_eq!(
            EscalationPriority::ALL.iter().max(),
            Some(&EscalationPriority::Urgent)
        );
    }

    #[test]
    fn enums_serialize_lowercase() {
        let json = serde_json::to_string(&EscalationReason::LowConfidence).unwrap();
        assert_eq!(json, "\"low_confidence\"");
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let json = serde_json::to_string(&EscalationPriority::Urgent).unwrap();
        assert_eq!(json, "\"urgent\"");
    }

    #[test]
    fn reason_parses_from_its_text_form() {
        for reason in EscalationReason::ALL {
            assert_eq!(reason.as_str().parse::<EscalationReason>().unwrap(), reason);
        }
        assert!("angry".parse::<EscalationReason>().is_err());
    }

    #[test]
    fn default_priorities_match_severity_table() {
        assert_eq!(
            EscalationReason::LowConfidence.default_priority(),
            EscalationPriority::Low
        );
        assert_eq!(
            EscalationReason::Complaint.default_priority(),
            EscalationPriority::High
        );
        assert_eq!(
            EscalationReason::CriticalIssue.default_priority(),
            EscalationPriority::Urgent
        );
        assert_eq!(
            EscalationReason::TechnicalProblem.default_priority(),
            EscalationPriority::Medium
        );
    }

    #[test]
    fn recent_keeps_arrival_order() {
        let mut session = ChatSession::new("s1", "heine", None);
        for i in 0..5 {
            session.push(ChatMessage::user("s1", "heine", format!("m{i}")));
        }
        let recent: Vec<_> = session.recent(2).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(recent, vec!["m3", "m4"]);
        assert_eq!(session.recent(50).len(), 5);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut session = ChatSession::new("s1", "heine", None);
        let future = Utc::now() + chrono::TimeDelta::try_seconds(60).unwrap();
        session.last_activity = future;
        session.touch();
        assert_eq!(session.last_activity, future);
    }

    #[test]
    fn reply_omits_missing_reason() {
        let reply = ChatReply {
            session_id: "s1".into(),
            message: "hi".into(),
            confidence: 0.9,
            escalated: false,
            escalation_reason: None,
            sources: vec![],
            response_time: 0.01,
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert!(value.get("escalation_reason").is_none());
    }
}
