use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::principal::Principal;
use super::provider::{AuthProvider, CredentialEvidence, CredentialVerifier, FederationEvidence, FederationVerifier, LoginRequest};
use super::session::SessionStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginFailure {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no session to bind the principal to")]
    NoSession,
    #[error("credential backend unavailable: {0}")]
    Unavailable(String),
}

/// Read-only projection of a session for status checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub authenticated: bool,
    pub admin: bool,
    pub user: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_touched_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Login, logoff and session reads on top of the session store, plus the
/// two predicates the authentication gate consumes.
pub struct SessionLifecycle {
    sessions: SessionStore,
    auth: Arc<dyn AuthProvider>,
    credentials: Arc<dyn CredentialVerifier>,
    federation: Arc<dyn FederationVerifier>,
}

impl SessionLifecycle {
    pub fn new(
        sessions: SessionStore,
        auth: Arc<dyn AuthProvider>,
        credentials: Arc<dyn CredentialVerifier>,
        federation: Arc<dyn FederationVerifier>,
    ) -> Self {
        Self { sessions, auth, credentials, federation }
    }

    pub fn sessions(&self) -> &SessionStore { &self.sessions }

    pub fn federation(&self) -> &dyn FederationVerifier { self.federation.as_ref() }

    /// Verify credentials and bind the principal to the caller's session. The session id is kept.
    pub async fn login(&self, session_id: &str, req: &LoginRequest) -> Result<Principal, LoginFailure> {
        if self.sessions.get(session_id).is_none() { return Err(LoginFailure::NoSession); }
        let principal = match self.auth.login(req).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                info!(target: "forte::session", user = %req.username, "login rejected");
                return Err(LoginFailure::InvalidCredentials);
            }
            Err(e) => {
                warn!(target: "forte::session", user = %req.username, "login backend error: {e}");
                return Err(LoginFailure::Unavailable(e.to_string()));
            }
        };
        // the session may have been swept or deleted while credentials were checked
        if !self.sessions.set_principal(session_id, Some(principal.clone())) {
            return Err(LoginFailure::NoSession);
        }
        info!(target: "forte::session", user = %principal.user_id, admin = principal.is_admin(), "login");
        Ok(principal)
    }

    /// Clear the principal; the session record itself stays.
    pub fn logoff(&self, session_id: &str) -> bool {
        self.sessions.set_principal(session_id, None)
    }

    pub fn read_session(&self, session_id: Option<&str>) -> SessionSummary {
        let ttl: Duration = self.sessions.ttl();
        match session_id.and_then(|id| self.sessions.get(id)) {
            Some(s) => SessionSummary {
                authenticated: s.principal.is_some(),
                admin: s.is_admin(),
                user: s.principal.as_ref().map(|p| p.user_id.clone()),
                created_at: Some(s.created_at),
                last_touched_at: Some(s.last_touched_at),
                expires_at: Some(s.expires_at(ttl)),
            },
            None => SessionSummary {
                authenticated: false,
                admin: false,
                user: None,
                created_at: None,
                last_touched_at: None,
                expires_at: None,
            },
        }
    }

    /// Collaborator errors count as "not authenticated".
    pub async fn is_authenticated(&self, evidence: CredentialEvidence<'_>) -> bool {
        match self.credentials.is_authenticated(evidence).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(target: "forte::gate", "credential verifier failed: {e}");
                false
            }
        }
    }

    /// Collaborator errors count as "federation failed".
    pub async fn is_federated(&self, evidence: FederationEvidence<'_>) -> bool {
        match self.federation.is_federated(evidence).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(target: "forte::gate", "federation verifier failed: {e}");
                false
            }
        }
    }
}
