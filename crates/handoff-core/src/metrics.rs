use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use handoff_schema::{EscalationPriority, EscalationReason, EscalationTicket};
use handoff_tickets::TicketStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricsPeriod {
    #[default]
    Daily,
    Weekly,
    Monthly,
    All,
}

impl MetricsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::All => "all",
        }
    }

    /// Oldest creation time included in the window, `None` for all time.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Daily => Some(now - Duration::days(1)),
            Self::Weekly => Some(now - Duration::days(7)),
            Self::Monthly => Some(now - Duration::days(30)),
            Self::All => None,
        }
    }
}

impl fmt::Display for MetricsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricsPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "all" => Ok(Self::All),
            other => Err(anyhow!("unknown metrics period: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationMetrics {
    pub tenant: String,
    pub period: MetricsPeriod,
    pub total: usize,
    pub resolved: usize,
    /// `resolved / total`, 0 when there are no tickets.
    pub escalation_rate: f64,
    pub avg_resolution_hours: f64,
    pub by_reason: BTreeMap<EscalationReason, usize>,
    pub by_priority: BTreeMap<EscalationPriority, usize>,
}

/// Reduce a ticket set into metrics. Tickets outside the period window are ignored.
pub fn summarize_tickets(
    tenant: &str,
    period: MetricsPeriod,
    tickets: &[EscalationTicket],
    now: DateTime<Utc>,
) -> EscalationMetrics {
    let since = period.window_start(now);
    let in_window: Vec<_> = tickets
        .iter()
        .filter(|t| t.tenant == tenant)
        .filter(|t| since.map_or(true, |s| t.created_at >= s))
        .collect();

    let mut by_reason = BTreeMap::new();
    let mut by_priority = BTreeMap::new();
    let mut resolution_hours = Vec::new();
    for ticket in &in_window {
        *by_reason.entry(ticket.reason).or_insert(0) += 1;
        *by_priority.entry(ticket.priority).or_insert(0) += 1;
        if let Some(resolved_at) = ticket.resolved_at {
            let secs = (resolved_at - ticket.created_at).num_seconds() as f64;
            resolution_hours.push(secs / 3600.0);
        }
    }

    let total = in_window.len();
    let resolved = in_window.iter().filter(|t| t.status.is_settled()).count();
    let escalation_rate = if total > 0 {
        resolved as f64 / total as f64
    } else {
        0.0
    };
    let avg_resolution_hours = if resolution_hours.is_empty() {
        0.0
    } else {
        resolution_hours.iter().sum::<f64>() / resolution_hours.len() as f64
    };

    EscalationMetrics {
        tenant: tenant.to_string(),
        period,
        total,
        resolved,
        escalation_rate,
        avg_resolution_hours,
        by_reason,
        by_priority,
    }
}

pub async fn compute(store: &TicketStore, tenant: &str, period: MetricsPeriod) -> EscalationMetrics {
    let tickets = store.list_all(Some(tenant)).await;
    summarize_tickets(tenant, period, &tickets, Utc::now())
}
