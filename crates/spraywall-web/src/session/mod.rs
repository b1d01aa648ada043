//! Per-connection session registry. Each live protocol session maps to one
//! isolated handler; the registry owns the whole lifecycle (create on
//! initialize, release exactly once on teardown) and is injected through
//! app state rather than living in a process-wide global.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::util::time::now_ms;

/// A message referenced an unknown or expired session, or attempted an
/// initialization incorrectly. Client error; session state is unaffected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("missing session id: only `initialize` may open a session")]
    MissingSession,
    #[error("unknown session id {0:?}")]
    UnknownSession(String),
}

/// One live protocol session. Owns no persistent state: it only carries
/// identity and bookkeeping while tool calls are mediated into the store
/// and compositor.
#[derive(Debug)]
pub struct SessionHandler {
    id: String,
    created_at: i64,
    protocol_version: String,
    calls: AtomicU64,
}

impl SessionHandler {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Counts one handled message on this session.
    pub fn touch(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionHandler>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh handler under a newly generated id. Ids are
    /// random uuids, never reused while registered; at most one live
    /// handler exists per id by map construction.
    pub async fn create(&self, protocol_version: String) -> Arc<SessionHandler> {
        let handler = Arc::new(SessionHandler {
            id: Uuid::new_v4().to_string(),
            created_at: now_ms(),
            protocol_version,
            calls: AtomicU64::new(0),
        });
        let mut sessions = self.sessions.lock().await;
        sessions.insert(handler.id.clone(), handler.clone());
        info!(
            session = %handler.id,
            live = sessions.len(),
            protocol = %handler.protocol_version,
            "session initialized"
        );
        handler
    }

    /// Resolves a message's session reference.
    pub async fn get(&self, id: &str) -> Result<Arc<SessionHandler>, SessionError> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))
    }

    /// Releases a session. Removal happens exactly once per id no matter
    /// how many teardown paths race: only the caller that actually removed
    /// the entry gets the handler back.
    pub async fn remove(&self, id: &str) -> Result<Arc<SessionHandler>, SessionError> {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(id)
        };
        match removed {
            Some(handler) => {
                info!(
                    session = %handler.id,
                    calls = handler.calls.load(Ordering::Relaxed),
                    "session closed"
                );
                Ok(handler)
            }
            None => Err(SessionError::UnknownSession(id.to_string())),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_remove_lifecycle() {
        let registry = SessionRegistry::new();
        let handler = registry.create("2025-03-26".to_string()).await;
        assert_eq!(registry.len().await, 1);

        let found = registry.get(handler.id()).await.expect("live session");
        assert!(Arc::ptr_eq(&handler, &found));

        registry.remove(handler.id()).await.expect("first teardown");
        assert_eq!(registry.len().await, 0);
        assert_eq!(
            registry.get(handler.id()).await.unwrap_err(),
            SessionError::UnknownSession(handler.id().to_string())
        );
    }

    #[tokio::test]
    async fn double_teardown_releases_once() {
        let registry = Arc::new(SessionRegistry::new());
        let handler = registry.create("2025-03-26".to_string()).await;
        let id = handler.id().to_string();

        let a = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.remove(&id).await })
        };
        let b = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.remove(&id).await })
        };
        let outcomes = [a.await.expect("join a"), b.await.expect("join b")];
        let released = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(released, 1, "exactly one teardown path wins");
    }

    #[tokio::test]
    async fn ids_are_unique_across_sessions() {
        let registry = SessionRegistry::new();
        let first = registry.create("2025-03-26".to_string()).await;
        let second = registry.create("2025-03-26".to_string()).await;
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len().await, 2);
    }
}
