use crate::review::{BatchSession, Orchestrator, PreviewTicket, SharedSession};
use std::{collections::HashMap, sync::Arc};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Live review sessions keyed by id. Each session owns a cancellation token;
/// background tasks run under child tokens so discarding the session stops them.
#[derive(Clone, Default)]
pub struct SessionStore {
    entries: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
}

struct SessionEntry {
    session: SharedSession,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub session: SharedSession,
    pub cancel: CancellationToken,
}

impl SessionStore {
    pub async fn insert(&self, session: BatchSession) -> SessionHandle {
        let id = session.id;
        let session: SharedSession = Arc::new(Mutex::new(session));
        let cancel = CancellationToken::new();
        let handle = SessionHandle {
            id,
            session: session.clone(),
            cancel: cancel.child_token(),
        };
        self.entries
            .lock()
            .await
            .insert(id, SessionEntry { session, cancel });
        handle
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let guard = self.entries.lock().await;
        guard.get(&id).map(|entry| SessionHandle {
            id,
            session: entry.session.clone(),
            cancel: entry.cancel.child_token(),
        })
    }

    /// Drops the session and cancels everything still running for it.
    pub async fn discard(&self, id: Uuid) -> bool {
        let removed = self.entries.lock().await.remove(&id);
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                info!(target = "hermes.review", session_id = %id, "session_discarded");
                true
            }
            None => false,
        }
    }

    /// Cancels running tasks but keeps the session. Later tasks get a fresh token.
    pub async fn cancel_tasks(&self, id: Uuid) -> bool {
        let mut guard = self.entries.lock().await;
        let Some(entry) = guard.get_mut(&id) else {
            return false;
        };
        let previous = std::mem::replace(&mut entry.cancel, CancellationToken::new());
        previous.cancel();
        info!(target = "hermes.review", session_id = %id, "session_tasks_cancelled");
        true
    }

    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl SessionHandle {
    pub fn spawn_search(&self, orchestrator: &Orchestrator) -> JoinHandle<()> {
        let orchestrator = orchestrator.clone();
        let handle = self.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator
                .run_search(&handle.session, &handle.cancel)
                .await
            {
                warn!(
                    target = "hermes.search",
                    session_id = %handle.id,
                    error = %err,
                    "background_search_failed"
                );
            }
        })
    }

    pub fn spawn_preview(&self, orchestrator: &Orchestrator, ticket: PreviewTicket) -> JoinHandle<()> {
        let orchestrator = orchestrator.clone();
        let handle = self.clone();
        tokio::spawn(async move {
            let item_id = ticket.item_id.clone();
            if let Err(err) = orchestrator
                .run_preview(&handle.session, ticket, &handle.cancel)
                .await
            {
                warn!(
                    target = "hermes.enhance",
                    session_id = %handle.id,
                    item_id = %item_id,
                    error = %err,
                    "background_preview_failed"
                );
            }
        })
    }
}
