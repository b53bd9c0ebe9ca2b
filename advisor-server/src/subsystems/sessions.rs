//! Verified-session registry.
//!
//! Process-wide map from session id to the snapshot taken at
//! verification time. Sessions live until logout or process restart;
//! there is no expiry and no refresh from the roster. Injected into the
//! server state, never ambient.

use std::collections::HashMap;

use tokio::sync::RwLock;

use advisor_core::models::VerifiedSession;

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, VerifiedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session under its id. Last write wins; no uniqueness is
    /// enforced across ids.
    pub async fn insert(&self, session: VerifiedSession) {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
    }

    pub async fn get(&self, session_id: &str) -> Option<VerifiedSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Idempotent: removing an unknown id is a no-op.
    pub async fn remove(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }
}
