//! In-memory bearer sessions.
//!
//! Tokens are 256 random bits, URL-safe base64. A session is valid while
//! `now < expires_at`; expired entries behave exactly like absent ones. They
//! are evicted when a lookup trips over them and by [`run_sweep_loop`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use agora_types::models::Session;

const TOKEN_BYTES: usize = 32;
const MAX_TOKEN_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not generate a unique session token")]
    TokenGeneration,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: chrono::Duration,
}

impl SessionStore {
    /// Store with the standard 24 hour lifetime.
    pub fn new() -> Self {
        Self::with_ttl(chrono::Duration::hours(24))
    }

    pub fn with_ttl(ttl: chrono::Duration) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                ttl,
            }),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.inner.ttl
    }

    /// Mint a new session for `user_id`. Earlier sessions for the same user stay valid.
    pub async fn create_session(&self, user_id: Uuid) -> Result<Session, SessionError> {
        self.create_session_at(user_id, Utc::now()).await
    }

    pub async fn create_session_at(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let mut sessions = self.inner.sessions.write().await;

        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = generate_token();
            if sessions.contains_key(&token) {
                continue;
            }

            let session = Session {
                token: token.clone(),
                user_id,
                created_at: now,
                expires_at: now + self.inner.ttl,
            };
            sessions.insert(token, session.clone());
            debug!("Created session for {} (expires {})", user_id, session.expires_at);
            return Ok(session);
        }

        Err(SessionError::TokenGeneration)
    }

    /// Resolve a token to its user, or `None` if it is unknown or expired.
    pub async fn validate(&self, token: &str) -> Option<Uuid> {
        self.validate_at(token, Utc::now()).await
    }

    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Option<Uuid> {
        {
            let sessions = self.inner.sessions.read().await;
            match sessions.get(token) {
                None => return None,
                Some(session) if session.is_valid_at(now) => return Some(session.user_id),
                Some(_) => {}
            }
        }

        // Expired: evict under the write lock, re-checking since the entry may
        // have been replaced or removed while no lock was held.
        let mut sessions = self.inner.sessions.write().await;
        if sessions.get(token).is_some_and(|s| !s.is_valid_at(now)) {
            sessions.remove(token);
            debug!("Evicted expired session on lookup");
        }
        None
    }

    /// Logout. Invalidating an unknown token is a no-op.
    pub async fn invalidate(&self, token: &str) {
        if let Some(session) = self.inner.sessions.write().await.remove(token) {
            debug!("Invalidated session for {}", session.user_id);
        }
    }

    /// Diagnostic snapshot of every stored entry, including expired ones not yet evicted.
    pub async fn list_active(&self) -> Vec<Session> {
        self.inner.sessions.read().await.values().cloned().collect()
    }

    /// Drop every session expired at `now`. Returns how many were removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.inner.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_valid_at(now));
        before - sessions.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that reclaims expired sessions until `cancel` fires.
pub async fn run_sweep_loop(store: SessionStore, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Session sweep stopped");
                return;
            }
            _ = interval.tick() => {
                let removed = store.sweep_expired(Utc::now()).await;
                if removed > 0 {
                    info!("Session sweep: removed {} expired sessions", removed);
                }
            }
        }
    }
}

fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
