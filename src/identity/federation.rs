//! Challenge/response federation verifier.
//!
//! A peer first fetches `/f/challenge/:domain`, then calls federated routes with
//! `domain`, `challenge` and `signature = hex(sha256(challenge ":" secret))` in the
//! query string, where `secret` is shared out of band with each trusted peer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use super::provider::{FederationEvidence, FederationVerifier, VerifierError};

pub const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct Challenge {
    value: String,
    issued_at: Instant,
}

#[derive(Debug)]
pub struct ChallengeFederation {
    peers: HashMap<String, String>,
    challenges: DashMap<String, Challenge>,
    ttl: Duration,
}

pub fn sign_challenge(challenge: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn ct_eq(a: &str, b: &str) -> bool { a.as_bytes().ct_eq(b.as_bytes()).into() }

impl ChallengeFederation {
    pub fn new(peers: HashMap<String, String>) -> Self {
        Self::with_ttl(peers, CHALLENGE_TTL)
    }

    pub fn with_ttl(peers: HashMap<String, String>, ttl: Duration) -> Self {
        let peers = peers.into_iter().map(|(d, s)| (d.to_ascii_lowercase(), s)).collect();
        Self { peers, challenges: DashMap::new(), ttl }
    }

    pub fn is_trusted(&self, domain: &str) -> bool { self.peers.contains_key(&domain.to_ascii_lowercase()) }

    fn prune(&self) {
        let ttl = self.ttl;
        self.challenges.retain(|_, c| c.issued_at.elapsed() <= ttl);
    }
}

#[async_trait]
impl FederationVerifier for ChallengeFederation {
    async fn is_federated(&self, evidence: FederationEvidence<'_>) -> Result<bool, VerifierError> {
        let q = evidence.query;
        let (Some(domain), Some(challenge), Some(signature)) = (q.get("domain"), q.get("challenge"), q.get("signature")) else {
            return Ok(false);
        };
        let domain = domain.to_ascii_lowercase();
        let Some(secret) = self.peers.get(&domain) else {
            debug!(target: "forte::federation", %domain, "untrusted peer");
            return Ok(false);
        };
        let outstanding = match self.challenges.get(&domain) {
            Some(c) if c.issued_at.elapsed() <= self.ttl => c.value.clone(),
            _ => return Ok(false),
        };
        if !ct_eq(&outstanding, challenge) { return Ok(false); }
        Ok(ct_eq(&sign_challenge(challenge, secret), &signature.to_ascii_lowercase()))
    }

    async fn issue_challenge(&self, domain: &str) -> Result<Option<String>, VerifierError> {
        if !self.is_trusted(domain) { return Ok(None); }
        let domain = domain.to_ascii_lowercase();
        self.prune();
        let mut buf = [0u8; 32];
        getrandom::getrandom(&mut buf).map_err(|e| VerifierError::Unavailable(e.to_string()))?;
        let value = hex::encode(buf);
        self.challenges.insert(domain, Challenge { value: value.clone(), issued_at: Instant::now() });
        Ok(Some(value))
    }
}
