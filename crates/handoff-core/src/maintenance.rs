use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use handoff_bus::{EventBus, Topic};
use handoff_schema::BusMessage;
use handoff_tickets::TicketStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::SessionStore;

#[derive(Debug, Clone)]
pub struct MaintenanceSettings {
    pub session_timeout: chrono::Duration,
    pub sweep_interval: Duration,
    pub retention: chrono::Duration,
    pub cleanup_interval: Duration,
}

impl MaintenanceSettings {
    pub fn from_config(main: &crate::config::MainConfig) -> Result<Self> {
        let session_timeout = i64::try_from(main.session.timeout_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(|| {
                anyhow!("session.timeout_minutes out of range: {}", main.session.timeout_minutes)
            })?;
        let retention = chrono::Duration::try_days(main.tickets.retention_days).ok_or_else(|| {
            anyhow!("tickets.retention_days out of range: {}", main.tickets.retention_days)
        })?;
        let cleanup_secs = main
            .tickets
            .cleanup_interval_minutes
            .max(1)
            .checked_mul(60)
            .ok_or_else(|| {
                anyhow!(
                    "tickets.cleanup_interval_minutes out of range: {}",
                    main.tickets.cleanup_interval_minutes
                )
            })?;

        Ok(Self {
            session_timeout,
            sweep_interval: Duration::from_secs(main.session.sweep_interval_secs.max(1)),
            retention,
            cleanup_interval: Duration::from_secs(cleanup_secs),
        })
    }
}

/// One sweep of idle sessions. Returns the number evicted.
pub async fn sweep_sessions(
    sessions: &SessionStore,
    timeout: chrono::Duration,
    bus: &EventBus,
) -> usize {
    let removed = sessions.sweep(timeout).await;
    if removed > 0 {
        let _ = bus.publish(BusMessage::SessionsSwept { removed }).await;
    }
    removed
}

/// One retention pass over tickets. Returns the number deleted.
pub async fn cleanup_tickets(
    tickets: &TicketStore,
    retention: chrono::Duration,
    bus: &EventBus,
) -> usize {
    let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
        return 0;
    };
    match tickets.cleanup(cutoff).await {
        Ok(removed) => {
            if removed > 0 {
                let _ = bus.publish(BusMessage::TicketsCleanedUp { removed }).await;
            }
            removed
        }
        Err(e) => {
            tracing::warn!("Ticket cleanup failed: {e}");
            0
        }
    }
}

/// Periodic session sweep and ticket retention until `cancel` fires.
pub fn spawn_maintenance(
    sessions: Arc<SessionStore>,
    tickets: Arc<TicketStore>,
    bus: Arc<EventBus>,
    settings: MaintenanceSettings,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sweep = tokio::time::interval(settings.sweep_interval);
        let mut cleanup = tokio::time::interval(settings.cleanup_interval);
        sweep.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("maintenance loop stopped");
                    break;
                }
                _ = sweep.tick() => {
                    sweep_sessions(&sessions, settings.session_timeout, &bus).await;
                    let live = sessions.len().await;
                    tracing::debug!(live, "session sweep done");
                }
                _ = cleanup.tick() => {
                    cleanup_tickets(&tickets, settings.retention, &bus).await;
                }
            }
        }
    })
}

/// Log every new escalation as a department notification.
pub fn spawn_escalation_notifier(bus: Arc<EventBus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = bus.subscribe(Topic::EscalationCreated).await;
        while let Some(msg) = rx.recv().await {
            let BusMessage::EscalationCreated {
                ticket_id,
                tenant,
                session_id,
                reason,
                priority,
                department,
            } = msg
            else {
                continue;
            };
            tracing::info!(
                %ticket_id,
                %tenant,
                %session_id,
                %reason,
                %priority,
                %department,
                "department notified of escalation"
            );
        }
    })
}
