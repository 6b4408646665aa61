//! SQLite-backed ticket repository

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use handoff_schema::EscalationTicket;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use crate::TicketRepository;

const TICKET_COLUMNS: &str = r#"ticket_id, session_id, tenant, customer_id, reason, priority,
       status, assigned_to, department, trigger_message, conversation_summary,
       notes, created_at, updated_at, resolved_at"#;

pub struct SqliteTicketRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTicketRepository {
    /// Open or create the database at the given path
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open ticket db: {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl TicketRepository for SqliteTicketRepository {
    async fn save(&self, ticket: &EscalationTicket) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO tickets
               (ticket_id, session_id, tenant, customer_id, reason, priority,
                status, assigned_to, department, trigger_message, conversation_summary,
                notes, created_at, updated_at, resolved_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
            params![
                ticket.ticket_id,
                ticket.session_id,
                ticket.tenant,
                ticket.customer_id,
                ticket.reason.as_str(),
                ticket.priority.as_str(),
                ticket.status.as_str(),
                ticket.assigned_to,
                ticket.department,
                ticket.trigger_message,
                ticket.conversation_summary,
                serde_json::to_string(&ticket.notes)?,
                format_ts(&ticket.created_at),
                format_ts(&ticket.updated_at),
                ticket.resolved_at.as_ref().map(format_ts),
            ],
        )?;
        Ok(())
    }

    async fn get(&self, ticket_id: &str) -> Result<Option<EscalationTicket>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_id = ?1"
        ))?;
        let raw = stmt.query_row([ticket_id], RawTicket::from_row).optional()?;
        raw.map(RawTicket::into_ticket).transpose()
    }

    async fn list(&self, tenant: Option<&str>) -> Result<Vec<EscalationTicket>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE ?1 IS NULL OR tenant = ?1"
        ))?;
        let rows = stmt.query_map([tenant], RawTicket::from_row)?;

        let mut tickets = Vec::new();
        for row in rows {
            match row.map_err(anyhow::Error::from).and_then(RawTicket::into_ticket) {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => tracing::warn!("Skipping unreadable ticket row: {e:#}"),
            }
        }
        Ok(tickets)
    }

    async fn delete(&self, ticket_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM tickets WHERE ticket_id = ?1", [ticket_id])?;
        Ok(removed > 0)
    }
}

/// Row as stored, before enum and timestamp parsing.
struct RawTicket {
    ticket_id: String,
    session_id: String,
    tenant: String,
    customer_id: Option<String>,
    reason: String,
    priority: String,
    status: String,
    assigned_to: Option<String>,
    department: String,
    trigger_message: String,
    conversation_summary: String,
    notes: String,
    created_at: String,
    updated_at: String,
    resolved_at: Option<String>,
}

impl RawTicket {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            ticket_id: row.get(0)?,
            session_id: row.get(1)?,
            tenant: row.get(2)?,
            customer_id: row.get(3)?,
            reason: row.get(4)?,
            priority: row.get(5)?,
            status: row.get(6)?,
            assigned_to: row.get(7)?,
            department: row.get(8)?,
            trigger_message: row.get(9)?,
            conversation_summary: row.get(10)?,
            notes: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            resolved_at: row.get(14)?,
        })
    }

    fn into_ticket(self) -> Result<EscalationTicket> {
        let id = self.ticket_id;
        Ok(EscalationTicket {
            reason: self.reason.parse().with_context(|| format!("ticket {id}"))?,
            priority: self.priority.parse().with_context(|| format!("ticket {id}"))?,
            status: self.status.parse().with_context(|| format!("ticket {id}"))?,
            notes: serde_json::from_str(&self.notes)
                .with_context(|| format!("ticket {id}: malformed notes"))?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            resolved_at: self.resolved_at.as_deref().map(parse_ts).transpose()?,
            session_id: self.session_id,
            tenant: self.tenant,
            customer_id: self.customer_id,
            assigned_to: self.assigned_to,
            department: self.department,
            trigger_message: self.trigger_message,
            conversation_summary: self.conversation_summary,
            ticket_id: id,
        })
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"CREATE TABLE IF NOT EXISTS __tickets_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );"#,
    )?;

    let applied: std::collections::HashSet<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM __tickets_schema_version")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        rows.filter_map(|r| r.ok()).collect()
    };

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            ticket_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            tenant TEXT NOT NULL,
            customer_id TEXT,
            reason TEXT NOT NULL,
            priority TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            assigned_to TEXT,
            department TEXT NOT NULL,
            trigger_message TEXT NOT NULL,
            conversation_summary TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            resolved_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_tickets_tenant_status ON tickets(tenant, status);
        "#,
    )];

    for (version, sql) in migrations {
        if applied.contains(&version) {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO __tickets_schema_version(version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp: {s}"))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_schema::{EscalationPriority, EscalationReason, TicketStatus};
    use tempfile::TempDir;

    fn ticket(id: &str, tenant: &str) -> EscalationTicket {
        let now = Utc::now();
        EscalationTicket {
            ticket_id: id.to_string(),
            session_id: "s-1".to_string(),
            tenant: tenant.to_string(),
            customer_id: None,
            reason: EscalationReason::CriticalIssue,
            priority: EscalationPriority::Urgent,
            status: TicketStatus::Pending,
            assigned_to: None,
            department: "management".to_string(),
            trigger_message: "Alles ist kaputt".to_string(),
            conversation_summary: "1. Kunde: Alles ist kaputt".to_string(),
            notes: vec!["Resolution: erledigt".to_string()],
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_ticket_crud() {
        let tmp = TempDir::new().unwrap();
        let repo = SqliteTicketRepository::open(&tmp.path().join("tickets.db")).unwrap();
        let t = ticket("t-1", "heine");

        repo.save(&t).await.unwrap();
        assert_eq!(repo.get("t-1").await.unwrap(), Some(t.clone()));

        let mut updated = t.clone();
        updated.status = TicketStatus::Resolved;
        updated.resolved_at = Some(Utc::now());
        repo.save(&updated).await.unwrap();
        assert_eq!(repo.get("t-1").await.unwrap(), Some(updated));

        assert!(repo.delete("t-1").await.unwrap());
        assert!(!repo.delete("t-1").await.unwrap());
        assert!(repo.get("t-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_tenant_and_skips_bad_rows() {
        let repo = SqliteTicketRepository::open_in_memory().unwrap();
        repo.save(&ticket("t-1", "heine")).await.unwrap();
        repo.save(&ticket("t-2", "subbrand1")).await.unwrap();
        {
            let conn = repo.conn.lock().await;
            conn.execute(
                "UPDATE tickets SET reason = 'no_such_reason' WHERE ticket_id = 't-2'",
                [],
            )
            .unwrap();
        }

        let all = repo.list(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(repo.list(Some("heine")).await.unwrap().len(), 1);
        assert!(repo.list(Some("subbrand1")).await.unwrap().is_empty());
    }

    #[test]
    fn migrations_are_rerunnable() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM __tickets_schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
