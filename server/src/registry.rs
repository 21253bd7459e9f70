/// Session registry.
/// Maps each online identity to the single transport currently serving it.
/// All operations go through one lock so register, lookup and unregister are
/// atomic with respect to each other.
use crate::auth::Identity;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Frames pushed from the relay to a connection actor
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Serialized server->receiver envelope
    Envelope(String),
    /// The session was replaced by a newer connection for the same identity
    Superseded,
}

/// Live transport handle owned by the registry
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        SessionHandle {
            session_id: Uuid::new_v4(),
            connected_at: Utc::now(),
            tx,
        }
    }

    /// Queue a frame for the connection. Fails only when the connection is gone.
    pub fn send(&self, frame: Outbound) -> Result<(), mpsc::error::SendError<Outbound>> {
        self.tx.send(frame)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Identity -> live session map
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Identity, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry::default()
    }

    /// Install `handle` as the only session for `identity`, returning the
    /// session it replaced so the caller can close it.
    pub async fn register(&self, identity: Identity, handle: SessionHandle) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(identity, handle)
    }

    pub async fn lookup(&self, identity: &Identity) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(identity).cloned()
    }

    /// Remove the mapping for `identity` only if it still points at
    /// `session_id`. Returns whether anything was removed.
    pub async fn unregister(&self, identity: &Identity, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(identity) {
            Some(current) if current.session_id == session_id => {
                sessions.remove(identity);
                true
            }
            _ => false,
        }
    }

    pub async fn is_online(&self, identity: &Identity) -> bool {
        self.sessions.read().await.contains_key(identity)
    }

    pub async fn online_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (SessionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle();
        let id = h.session_id;

        assert!(registry.register(Identity::from("alice"), h).await.is_none());

        let found = registry.lookup(&Identity::from("alice")).await.expect("Session not found");
        assert_eq!(found.session_id, id);
        assert!(registry.lookup(&Identity::from("bob")).await.is_none());
    }

    #[tokio::test]
    async fn test_register_replaces_previous() {
        let registry = SessionRegistry::new();
        let (old, _rx1) = handle();
        let (new, _rx2) = handle();
        let old_id = old.session_id;
        let new_id = new.session_id;

        registry.register(Identity::from("alice"), old).await;
        let previous = registry
            .register(Identity::from("alice"), new)
            .await
            .expect("Previous session should be returned");

        assert_eq!(previous.session_id, old_id);
        let current = registry.lookup(&Identity::from("alice")).await.unwrap();
        assert_eq!(current.session_id, new_id);
        assert_eq!(registry.online_count().await, 1);
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_newer_session() {
        let registry = SessionRegistry::new();
        let (old, _rx1) = handle();
        let (new, _rx2) = handle();
        let old_id = old.session_id;
        let new_id = new.session_id;

        registry.register(Identity::from("alice"), old).await;
        registry.register(Identity::from("alice"), new).await;

        assert!(!registry.unregister(&Identity::from("alice"), old_id).await);
        let current = registry.lookup(&Identity::from("alice")).await.unwrap();
        assert_eq!(current.session_id, new_id);

        assert!(registry.unregister(&Identity::from("alice"), new_id).await);
        assert!(!registry.is_online(&Identity::from("alice")).await);
    }

    #[tokio::test]
    async fn test_unregister_unknown_identity() {
        let registry = SessionRegistry::new();
        assert!(!registry.unregister(&Identity::from("ghost"), Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_handle_send_after_receiver_dropped() {
        let (h, rx) = handle();
        drop(rx);
        assert!(h.is_closed());
        assert!(h.send(Outbound::Envelope("x".to_string())).is_err());
    }
}
