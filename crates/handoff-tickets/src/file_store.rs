//! One JSON document per ticket under a directory.
//!
//! Writes go to a uniquely named temp file in the same directory and are then
//! renamed over the target, so readers never observe a half-written record.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use handoff_schema::EscalationTicket;
use uuid::Uuid;

use crate::TicketRepository;

pub struct FileTicketRepository {
    dir: PathBuf,
}

impl FileTicketRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ticket_path(&self, ticket_id: &str) -> Option<PathBuf> {
        is_safe_id(ticket_id).then(|| self.dir.join(format!("{ticket_id}.json")))
    }

    async fn read_ticket(path: &Path) -> Result<EscalationTicket> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read ticket file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("malformed ticket file: {}", path.display()))
    }
}

/// Ticket ids become file names; anything outside this alphabet could escape the directory.
fn is_safe_id(ticket_id: &str) -> bool {
    !ticket_id.is_empty()
        && ticket_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl TicketRepository for FileTicketRepository {
    async fn save(&self, ticket: &EscalationTicket) -> Result<()> {
        let path = self
            .ticket_path(&ticket.ticket_id)
            .ok_or_else(|| anyhow::anyhow!("invalid ticket id: {}", ticket.ticket_id))?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_string_pretty(ticket)?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", ticket.ticket_id, Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("failed to replace {}", path.display()));
        }
        Ok(())
    }

    async fn get(&self, ticket_id: &str) -> Result<Option<EscalationTicket>> {
        let Some(path) = self.ticket_path(ticket_id) else {
            return Ok(None);
        };
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(Some(Self::read_ticket(&path).await?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, tenant: Option<&str>) -> Result<Vec<EscalationTicket>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tickets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_ticket(&path).await {
                Ok(ticket) => {
                    if tenant.map_or(true, |t| t == ticket.tenant) {
                        tickets.push(ticket);
                    }
                }
                Err(e) => tracing::warn!("Skipping unreadable ticket record: {e:#}"),
            }
        }
        Ok(tickets)
    }

    async fn delete(&self, ticket_id: &str) -> Result<bool> {
        let Some(path) = self.ticket_path(ticket_id) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
