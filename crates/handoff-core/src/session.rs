//! Live conversations.
//!
//! Each session lives in its own slot behind a `tokio::sync::Mutex`. A
//! request holds that lock from lookup until both messages are appended, so
//! turns within one session never interleave while different sessions run in
//! parallel. The sweeper only evicts slots it can lock without waiting.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use handoff_schema::{ChatMessage, ChatSession};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::SessionError;

struct SessionSlot {
    evicted: AtomicBool,
    session: Arc<Mutex<ChatSession>>,
}

impl SessionSlot {
    fn new(session: ChatSession) -> Arc<Self> {
        Arc::new(Self {
            evicted: AtomicBool::new(false),
            session: Arc::new(Mutex::new(session)),
        })
    }

    fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    fn evict(&self) {
        self.evicted.store(true, Ordering::Release);
    }
}

/// Exclusive handle on one session for the duration of a request.
pub struct SessionGuard {
    slot: Arc<SessionSlot>,
    session: OwnedMutexGuard<ChatSession>,
}

impl SessionGuard {
    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// The most recent `max_messages`, oldest first.
    pub fn context(&self, max_messages: usize) -> &[ChatMessage] {
        self.session.recent(max_messages)
    }

    pub fn append(&mut self, message: ChatMessage) -> Result<(), SessionError> {
        if self.slot.is_evicted() {
            return Err(SessionError::NotFound(self.session.session_id.clone()));
        }
        self.session.push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct SessionStore {
    slots: Mutex<HashMap<String, Arc<SessionSlot>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create a session and lock it.
    ///
    /// Without an id a fresh one is generated. An unknown id is created under
    /// that id. A known id owned by another tenant is rejected. Creation
    /// happens under the map lock, so concurrent first requests for the same
    /// id share one slot.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        tenant: &str,
        customer_id: Option<&str>,
    ) -> Result<SessionGuard, SessionError> {
        loop {
            let id = session_id
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            let slot = match self.slots.lock().await.entry(id.clone()) {
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => {
                    let session =
                        ChatSession::new(id.clone(), tenant, customer_id.map(str::to_string));
                    let slot = SessionSlot::new(session);
                    // Nobody else can see this mutex yet.
                    let Ok(session) = slot.session.clone().try_lock_owned() else {
                        continue;
                    };
                    entry.insert(slot.clone());
                    tracing::debug!(session_id = %id, tenant, "session created");
                    return Ok(SessionGuard { slot, session });
                }
            };

            let mut session = slot.session.clone().lock_owned().await;
            if slot.is_evicted() {
                // Swept between lookup and lock; go around and recreate.
                continue;
            }
            if session.tenant != tenant {
                return Err(SessionError::TenantMismatch { session_id: id });
            }
            if session.customer_id.is_none() {
                session.customer_id = customer_id.map(str::to_string);
            }
            session.touch();
            return Ok(SessionGuard { slot, session });
        }
    }

    pub async fn append(&self, session_id: &str, message: ChatMessage) -> Result<(), SessionError> {
        let slot = self.slot(session_id).await?;
        let mut session = slot.session.lock().await;
        if slot.is_evicted() {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        session.push(message);
        Ok(())
    }

    pub async fn context(
        &self,
        session_id: &str,
        max_messages: usize,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let slot = self.slot(session_id).await?;
        let session = slot.session.lock().await;
        Ok(session.recent(max_messages).to_vec())
    }

    /// Full message history, visible only to the owning tenant.
    pub async fn history(&self, tenant: &str, session_id: &str) -> Option<Vec<ChatMessage>> {
        let slot = self.slot(session_id).await.ok()?;
        let session = slot.session.lock().await;
        (session.tenant == tenant && !slot.is_evicted()).then(|| session.messages.clone())
    }

    /// End an idle session. Returns false if it is absent, owned by another
    /// tenant, or busy with a request.
    pub async fn remove(&self, tenant: &str, session_id: &str) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get(session_id) else {
            return false;
        };
        let owned = match slot.session.try_lock() {
            Ok(session) => session.tenant == tenant,
            Err(_) => return false,
        };
        if !owned {
            return false;
        }
        if let Some(slot) = slots.remove(session_id) {
            slot.evict();
        }
        true
    }

    /// Evict every idle session whose last activity is older than `timeout`.
    /// Sessions with a request in flight are left alone.
    pub async fn sweep(&self, timeout: Duration) -> usize {
        let Some(cutoff) = Utc::now().checked_sub_signed(timeout) else {
            return 0;
        };
        let mut slots = self.slots.lock().await;
        let before = slots.len();

        slots.retain(|_, slot| {
            let Ok(session) = slot.session.try_lock() else {
                return true;
            };
            if session.last_activity >= cutoff {
                return true;
            }
            slot.evict();
            false
        });

        let removed = before - slots.len();
        if removed > 0 {
            tracing::info!(removed, remaining = slots.len(), "swept idle sessions");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Drop a session even while a request holds it.
    #[cfg(test)]
    pub(crate) async fn force_evict(&self, session_id: &str) {
        if let Some(slot) = self.slots.lock().await.remove(session_id) {
            slot.evict();
        }
    }

    async fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, SessionError> {
        self.slots
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }
}
