use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use handoff_tickets::{FileTicketRepository, SqliteTicketRepository, TicketRepository};

use crate::config::{StorageBackend, TicketStorageConfig};

/// Resolve `tickets.path` against the config root unless it is absolute.
pub fn ticket_path(config: &TicketStorageConfig, root: &Path) -> PathBuf {
    let path = Path::new(&config.path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

pub fn open_ticket_repository(
    config: &TicketStorageConfig,
    root: &Path,
) -> Result<Arc<dyn TicketRepository>> {
    let path = ticket_path(config, root);
    match config.backend {
        StorageBackend::File => {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("failed to create ticket dir: {}", path.display()))?;
            tracing::info!(dir = %path.display(), "using file ticket store");
            Ok(Arc::new(FileTicketRepository::new(path)))
        }
        StorageBackend::Sqlite => {
            let repo = SqliteTicketRepository::open(&path)?;
            tracing::info!(db = %path.display(), "using sqlite ticket store");
            Ok(Arc::new(repo))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn relative_path_is_joined_to_root() {
        let config = TicketStorageConfig::default();
        assert_eq!(
            ticket_path(&config, Path::new("/srv/handoff")),
            PathBuf::from("/srv/handoff/data/tickets")
        );
    }

    #[tokio::test]
    async fn opens_both_backends() {
        let tmp = TempDir::new().unwrap();
        let file = open_ticket_repository(&TicketStorageConfig::default(), tmp.path()).unwrap();
        assert!(file.list(None).await.unwrap().is_empty());
        assert!(tmp.path().join("data/tickets").is_dir());

        let sqlite = TicketStorageConfig {
            backend: StorageBackend::Sqlite,
            path: "data/tickets.db".into(),
            ..TicketStorageConfig::default()
        };
        let repo = open_ticket_repository(&sqlite, tmp.path()).unwrap();
        assert!(repo.list(Some("heine")).await.unwrap().is_empty());
        assert!(tmp.path().join("data/tickets.db").exists());
    }
}
