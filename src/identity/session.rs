use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::tprintln;

use super::principal::Principal;

pub type SessionId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    /// Absent until login succeeds.
    pub principal: Option<Principal>,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
}

impl Session {
    pub fn is_anonymous(&self) -> bool { self.principal.is_none() }

    pub fn is_admin(&self) -> bool { self.principal.as_ref().is_some_and(Principal::is_admin) }

    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.last_touched_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Expired once `last_touched_at + ttl < now`.
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at(ttl) < now
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session id generation failed: {0}")]
    Entropy(String),
    #[error("session id {0} already in use")]
    Collision(SessionId),
}

fn gen_id() -> Result<SessionId, SessionError> {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| SessionError::Entropy(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Process-wide session records keyed by id.
///
/// Backed by a sharded map: writes to one id are serialized, independent ids
/// land on independent shards. Cloning yields another handle to the same store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionId, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: Arc::new(DashMap::new()), ttl }
    }

    pub fn ttl(&self) -> Duration { self.ttl }

    pub fn create(&self) -> Result<Session, SessionError> {
        self.create_at(Utc::now())
    }

    pub fn create_at(&self, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let session = Session { id: gen_id()?, principal: None, created_at: now, last_touched_at: now };
        self.insert_new(session)
    }

    /// Insert a fresh record; an id already present is never replaced.
    fn insert_new(&self, session: Session) -> Result<Session, SessionError> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => Err(SessionError::Collision(session.id)),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                tprintln!("session.create sid={}", session.id);
                Ok(session)
            }
        }
    }

    /// Returns the session unless it is missing or already past its TTL.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.get_at(id, Utc::now())
    }

    pub fn get_at(&self, id: &str, now: DateTime<Utc>) -> Option<Session> {
        let entry = self.sessions.get(id)?;
        if entry.is_expired_at(self.ttl, now) { return None; }
        Some(entry.clone())
    }

    /// Refresh `last_touched_at`. Returns false when the id is unknown.
    pub fn touch(&self, id: &str) -> bool {
        self.touch_at(id, Utc::now())
    }

    pub fn touch_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                entry.last_touched_at = now;
                true
            }
            None => false,
        }
    }

    /// Replace the principal of an existing session in one update.
    pub fn set_principal(&self, id: &str, principal: Option<Principal>) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                entry.principal = principal;
                true
            }
            None => false,
        }
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed { tprintln!("session.delete sid={}", id); }
        removed
    }

    /// Remove every session whose `last_touched_at + ttl < now`. Returns the number removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let mut removed = 0usize;
        self.sessions.retain(|_, s| {
            let keep = !s.is_expired_at(ttl, now);
            if !keep { removed += 1; }
            keep
        });
        debug!(target: "forte::session", removed, remaining = self.sessions.len(), "session_sweep");
        removed
    }

    pub fn len(&self) -> usize { self.sessions.len() }

    pub fn is_empty(&self) -> bool { self.sessions.is_empty() }
}
