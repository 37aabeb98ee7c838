//! Gateway configuration loaded from `FORTE_*` environment variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: String,
    pub http_port: u16,
    /// Idle lifetime of a session; also the cookie Max-Age.
    pub session_ttl: Duration,
    /// Period of the background session sweep.
    pub sweep_period: Duration,
    /// Reported by `/alive`.
    pub version: String,
    /// Backend that serves the business handlers behind the gates.
    pub upstream_url: Option<String>,
    pub upstream_timeout: Duration,
    pub users_file: PathBuf,
    /// Password used to seed the admin account when the users file is missing.
    pub admin_password: String,
    /// Trusted federation peers: domain -> shared secret.
    pub federation_peers: HashMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_period: DEFAULT_SWEEP_PERIOD,
            version: env!("CARGO_PKG_VERSION").to_string(),
            upstream_url: None,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            users_file: PathBuf::from("users.json"),
            admin_password: "forte".to_string(),
            federation_peers: HashMap::new(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset or unparseable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup("FORTE_BIND") { cfg.bind = v; }
        if let Some(port) = parse_var(&lookup, "FORTE_HTTP_PORT") { cfg.http_port = port; }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FORTE_SESSION_TTL_SECS") {
            if secs == 0 {
                warn!(target: "forte::config", "FORTE_SESSION_TTL_SECS=0 ignored, keeping {}s", cfg.session_ttl.as_secs());
            } else {
                cfg.session_ttl = Duration::from_secs(secs);
            }
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FORTE_SWEEP_PERIOD_SECS") {
            if secs == 0 {
                warn!(target: "forte::config", "FORTE_SWEEP_PERIOD_SECS=0 ignored, keeping {}s", cfg.sweep_period.as_secs());
            } else {
                cfg.sweep_period = Duration::from_secs(secs);
            }
        }
        if let Some(v) = lookup("FORTE_VERSION").or_else(|| lookup("version")) { cfg.version = v; }
        cfg.upstream_url = lookup("FORTE_UPSTREAM_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FORTE_UPSTREAM_TIMEOUT_SECS") {
            cfg.upstream_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("FORTE_USERS_FILE") { cfg.users_file = PathBuf::from(v); }
        if let Some(v) = lookup("FORTE_ADMIN_PASSWORD") { cfg.admin_password = v; }
        if let Some(v) = lookup("FORTE_FEDERATION_PEERS") { cfg.federation_peers = parse_peers(&v); }
        cfg
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target: "forte::config", "ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}

/// Parse `domain=secret,domain2=secret2`. Entries without a secret are skipped.
fn parse_peers(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for part in raw.split(',') {
        let Some((domain, secret)) = part.split_once('=') else { continue };
        let (domain, secret) = (domain.trim(), secret.trim());
        if domain.is_empty() || secret.is_empty() { continue; }
        out.insert(domain.to_ascii_lowercase(), secret.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = GatewayConfig::from_lookup(|_| None);
        assert_eq!(cfg.session_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.sweep_period, Duration::from_secs(86_400));
        assert_eq!(cfg.http_port, DEFAULT_HTTP_PORT);
        assert!(cfg.upstream_url.is_none());
        assert!(cfg.federation_peers.is_empty());
    }

    #[test]
    fn env_overrides_and_bad_values() {
        let cfg = GatewayConfig::from_lookup(lookup_from(&[
            ("FORTE_HTTP_PORT", "8080"),
            ("FORTE_SESSION_TTL_SECS", "not-a-number"),
            ("FORTE_SWEEP_PERIOD_SECS", "60"),
            ("FORTE_UPSTREAM_URL", "http://backend:4000/"),
            ("version", "1.2.3"),
        ]));
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.session_ttl, DEFAULT_SESSION_TTL);
        assert_eq!(cfg.sweep_period, Duration::from_secs(60));
        assert_eq!(cfg.upstream_url.as_deref(), Some("http://backend:4000"));
        assert_eq!(cfg.version, "1.2.3");
    }

    #[test]
    fn zero_durations_keep_defaults() {
        let cfg = GatewayConfig::from_lookup(lookup_from(&[
            ("FORTE_SESSION_TTL_SECS", "0"),
            ("FORTE_SWEEP_PERIOD_SECS", "0"),
        ]));
        assert_eq!(cfg.session_ttl, DEFAULT_SESSION_TTL);
        assert_eq!(cfg.sweep_period, DEFAULT_SWEEP_PERIOD);

        let cfg = GatewayConfig::from_lookup(lookup_from(&[("FORTE_SESSION_TTL_SECS", "1")]));
        assert_eq!(cfg.session_ttl, Duration::from_secs(1));
    }

    #[test]
    fn peers_parse_skips_incomplete_entries() {
        let peers = parse_peers("Music.Example=s3cret, broken, other.org= ,x.net=k");
        assert_eq!(peers.len(), 2);
        assert_eq!(peers.get("music.example").map(String::as_str), Some("s3cret"));
        assert_eq!(peers.get("x.net").map(String::as_str), Some("k"));
    }
}
