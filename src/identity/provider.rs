use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::security::UserTable;
use crate::tprintln;

use super::principal::Principal;
use super::request_context::QueryParams;
use super::session::SessionStore;

/// Failure of an external verifier. Gates collapse these into a rejection.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
    #[error("malformed evidence: {0}")]
    Malformed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Evidence offered on the normal (non-federated) path.
#[derive(Debug, Clone, Copy)]
pub struct CredentialEvidence<'a> {
    pub session_id: Option<&'a str>,
    pub query: &'a QueryParams,
}

/// Evidence offered by a peer server on the federated path.
#[derive(Debug, Clone, Copy)]
pub struct FederationEvidence<'a> {
    pub query: &'a QueryParams,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Confirms a logged-in principal from request evidence.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn is_authenticated(&self, evidence: CredentialEvidence<'_>) -> Result<bool, VerifierError>;
}

/// Confirms an inter-server trust relationship from peer evidence.
#[async_trait]
pub trait FederationVerifier: Send + Sync {
    async fn is_federated(&self, evidence: FederationEvidence<'_>) -> Result<bool, VerifierError>;

    /// Issue a handshake challenge for `domain`; `Ok(None)` when the domain is not trusted.
    async fn issue_challenge(&self, domain: &str) -> Result<Option<String>, VerifierError>;
}

/// Checks a username/password pair and names the resulting principal.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> Result<Option<Principal>, VerifierError>;
}

/// Credential verifier backed by the session store: the evidence must name an
/// existing, unexpired session that carries a principal.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    sessions: SessionStore,
}

impl SessionCredentials {
    pub fn new(sessions: SessionStore) -> Self { Self { sessions } }
}

#[async_trait]
impl CredentialVerifier for SessionCredentials {
    async fn is_authenticated(&self, evidence: CredentialEvidence<'_>) -> Result<bool, VerifierError> {
        let Some(sid) = evidence.session_id else { return Ok(false) };
        Ok(self.sessions.get_at(sid, Utc::now()).is_some_and(|s| s.principal.is_some()))
    }
}

/// Login backed by the local users file.
pub struct LocalAuthProvider {
    users: Arc<UserTable>,
}

impl LocalAuthProvider {
    pub fn new(users: Arc<UserTable>) -> Self { Self { users } }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn login(&self, req: &LoginRequest) -> Result<Option<Principal>, VerifierError> {
        let users = self.users.clone();
        let username = req.username.clone();
        let password = req.password.clone();
        // argon2 verification is CPU bound; keep it off the reactor
        let ok = tokio::task::spawn_blocking(move || users.authenticate(&username, &password))
            .await
            .map_err(|e| VerifierError::Unavailable(e.to_string()))?;
        tprintln!("auth.login user={} ok={}", req.username, ok);
        Ok(ok.then(|| Principal::new(req.username.clone())))
    }
}
