use crate::api::{ApiError, CompanionApi};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

pub mod store;

pub use store::{FileIdStore, IdStore, MemoryIdStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSession {
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session storage failed: {0}")]
    Storage(String),

    #[error("Conversation start failed: {0}")]
    Start(#[from] ApiError),
}

/// Owns the conversation id and its creation handshake
pub struct SessionManager {
    store: Box<dyn IdStore>,
    api: Arc<dyn CompanionApi>,
    current: Option<ConversationSession>,
}

impl SessionManager {
    pub fn new(store: Box<dyn IdStore>, api: Arc<dyn CompanionApi>) -> Self {
        Self {
            store,
            api,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&ConversationSession> {
        self.current.as_ref()
    }

    /// Reuse the stored id or mint and persist a new one, then confirm it with `POST /start`.
    ///
    /// The id is written before the request goes out, so a failed handshake is retried with the
    /// same id. Once confirmed the session is cached and later calls skip the network.
    pub async fn ensure_session(&mut self) -> Result<ConversationSession, SessionError> {
        if let Some(session) = &self.current {
            return Ok(session.clone());
        }

        let id = match self.store.load()? {
            Some(id) => {
                tracing::info!("Reusing conversation {}", id);
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                self.store.save(&id)?;
                tracing::info!("Created conversation {}", id);
                id
            }
        };

        let acknowledged = self.api.start_conversation(&id).await.map_err(|e| {
            tracing::error!("Conversation {} could not be started: {}", id, e);
            SessionError::Start(e)
        })?;

        if acknowledged != id {
            tracing::warn!(
                "Server acknowledged {} for conversation {}; keeping the stored id",
                acknowledged,
                id
            );
        }

        let session = ConversationSession { id };
        self.current = Some(session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeApi;

    #[tokio::test]
    async fn test_empty_store_mints_and_persists_before_start() {
        let api = Arc::new(FakeApi::default());
        let store = Arc::new(MemoryIdStore::default());
        let mut manager = SessionManager::new(Box::new(store.clone()), api.clone());

        let session = manager.ensure_session().await.unwrap();

        assert_eq!(store.load().unwrap().as_deref(), Some(session.id.as_str()));
        assert_eq!(api.started(), vec![session.id.clone()]);
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[tokio::test]
    async fn test_stored_id_is_reused() {
        let api = Arc::new(FakeApi::default());
        let mut manager =
            SessionManager::new(Box::new(MemoryIdStore::with_id("known-id")), api.clone());

        let session = manager.ensure_session().await.unwrap();
        assert_eq!(session.id, "known-id");
        assert_eq!(api.started(), vec!["known-id".to_string()]);

        // cached after the first handshake
        manager.ensure_session().await.unwrap();
        assert_eq!(api.started().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_start_keeps_id_for_retry() {
        let api = Arc::new(FakeApi::default());
        api.fail_start(true);
        let store = Arc::new(MemoryIdStore::default());
        let mut manager = SessionManager::new(Box::new(store.clone()), api.clone());

        assert!(matches!(
            manager.ensure_session().await,
            Err(SessionError::Start(_))
        ));
        assert!(manager.current().is_none());
        let first_id = store.load().unwrap().expect("id persisted before handshake");

        api.fail_start(false);
        let session = manager.ensure_session().await.unwrap();
        assert_eq!(session.id, first_id);
        assert_eq!(api.started(), vec![first_id.clone(), first_id]);
    }
}
