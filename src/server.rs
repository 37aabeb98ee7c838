//!
//! forte gateway HTTP server
//! -------------------------
//! Axum front end for the forte media-streaming API.
//!
//! Responsibilities:
//! - Session management with a cookie-addressed, TTL-bounded session store.
//! - A single dispatch entry point that evaluates the route authorization table
//!   (gates, deferral, fallback redirect) for every request.
//! - Background sweeping of idle sessions.
//! - Startup logging of the effective configuration.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use futures_util::FutureExt; // for catch_unwind on async blocks
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::identity::{
    AuthProvider, ChallengeFederation, CredentialVerifier, FederationVerifier, LocalAuthProvider, QueryParams,
    RequestContext, Session, SessionCredentials, SessionError, SessionLifecycle, SessionStore,
};
use crate::security;

pub mod handlers;
pub mod routes;
pub mod table;
pub mod upstream;

use routes::{RouteHandler, RouteTable};

pub const SESSION_COOKIE: &str = "forte_session";

/// Shared server state injected into the middleware and every route handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub sessions: SessionStore,
    pub lifecycle: Arc<SessionLifecycle>,
    pub routes: Arc<RouteTable>,
}

impl AppState {
    /// Assemble state from explicit collaborators. Credentials are checked
    /// against the session store; the route table is the forte table with
    /// external routes served by `upstream`.
    pub fn new(
        config: GatewayConfig,
        auth: Arc<dyn AuthProvider>,
        federation: Arc<dyn FederationVerifier>,
        upstream: Arc<dyn RouteHandler>,
    ) -> Self {
        let sessions = SessionStore::new(config.session_ttl);
        let credentials: Arc<dyn CredentialVerifier> = Arc::new(SessionCredentials::new(sessions.clone()));
        let lifecycle = SessionLifecycle::new(sessions.clone(), auth, credentials, federation);
        Self::from_parts(config, sessions, lifecycle, table::forte_routes(upstream))
    }

    pub fn from_parts(config: GatewayConfig, sessions: SessionStore, lifecycle: SessionLifecycle, routes: RouteTable) -> Self {
        Self { config: Arc::new(config), sessions, lifecycle: Arc::new(lifecycle), routes: Arc::new(routes) }
    }
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

fn session_cookie(sid: &str, ttl: Duration) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; Max-Age={}; HttpOnly; Path=/", SESSION_COOKIE, sid, ttl.as_secs())).ok()
}

/// Live session named by the cookie, touched; otherwise a new anonymous one.
fn resolve_session(sessions: &SessionStore, sid: Option<&str>, now: DateTime<Utc>) -> Result<Session, SessionError> {
    match sid.and_then(|sid| sessions.get_at(sid, now)) {
        Some(s) if sessions.touch_at(&s.id, now) => Ok(Session { last_touched_at: now, ..s }),
        _ => sessions.create_at(now),
    }
}

/// Attach the caller's session to the request, creating an empty one on first
/// contact, and refresh the cookie on the way out.
async fn attach_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let sid = parse_cookie(req.headers(), SESSION_COOKIE);
    let session = match resolve_session(&state.sessions, sid.as_deref(), Utc::now()) {
        Ok(s) => s,
        Err(e) => {
            error!(target: "forte::session", "cannot create session: {e}");
            return AppError::internal("session_unavailable", "Session unavailable.").into_response();
        }
    };
    let cookie = session_cookie(&session.id, state.sessions.ttl());
    req.extensions_mut().insert(session);
    let mut resp = next.run(req).await;
    if let Some(c) = cookie {
        resp.headers_mut().append(header::SET_COOKIE, c);
    }
    resp
}

/// Single entry point: every request goes through the route authorization table.
async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let session = req.extensions().get::<Session>().cloned();
    let query: QueryParams = Query::<QueryParams>::try_from_uri(req.uri()).map(|Query(q)| q).unwrap_or_default();
    let ctx = RequestContext::new(req.method().clone(), req.uri().path(), req.headers(), session, query);
    let request_id = ctx.request_id;
    let routes = state.routes.clone();
    match AssertUnwindSafe(routes.dispatch(&state, ctx, req)).catch_unwind().await {
        Ok(resp) => resp,
        Err(_) => {
            error!(target: "forte::server", %request_id, "handler panicked");
            AppError::internal("internal", "Internal error.").into_response()
        }
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(middleware::from_fn_with_state(state.clone(), attach_session))
        .layer(cors_layer())
        .with_state(state)
}

/// Periodically drop idle sessions, independent of request traffic.
pub fn spawn_session_sweeper(sessions: SessionStore, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            let removed = sessions.sweep(Utc::now());
            if removed > 0 { info!(target: "forte::session", removed, remaining = sessions.len(), "session sweep"); }
        }
    })
}

fn log_startup(config: &GatewayConfig) {
    info!(
        target: "startup",
        "forte gateway starting: version={}, bind={}:{}, session_ttl={}s, sweep_period={}s, upstream={:?}, users_file={:?}, federation_peers={}",
        config.version,
        config.bind,
        config.http_port,
        config.session_ttl.as_secs(),
        config.sweep_period.as_secs(),
        config.upstream_url,
        config.users_file,
        config.federation_peers.len(),
    );
}

/// Build the production state from configuration: local users file, challenge
/// federation and the upstream relay.
pub fn state_from_config(config: GatewayConfig) -> anyhow::Result<AppState> {
    security::ensure_default_admin(&config.users_file, &config.admin_password)
        .with_context(|| format!("While ensuring default admin in {:?}", config.users_file))?;
    let users = security::UserTable::load(&config.users_file)
        .with_context(|| format!("While loading users from {:?}", config.users_file))?;
    let auth = Arc::new(LocalAuthProvider::new(Arc::new(users)));
    let federation = Arc::new(ChallengeFederation::new(config.federation_peers.clone()));
    let upstream = Arc::new(
        upstream::UpstreamHandler::new(config.upstream_url.clone(), config.upstream_timeout)
            .context("While building upstream HTTP client")?,
    );
    Ok(AppState::new(config, auth, federation, upstream))
}

pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    log_startup(&config);
    let addr: SocketAddr = format!("{}:{}", config.bind, config.http_port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind, config.http_port))?;
    let sweep_period = config.sweep_period;
    let state = state_from_config(config)?;
    let sweeper = spawn_session_sweeper(state.sessions.clone(), sweep_period);

    let app = build_app(state);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("While binding {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!(target: "forte::server", "shutdown requested");
        })
        .await?;
    sweeper.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cookie_finds_named_value() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("theme=dark; forte_session=abc=="));
        assert_eq!(parse_cookie(&h, SESSION_COOKIE).as_deref(), Some("abc=="));
        assert_eq!(parse_cookie(&h, "missing"), None);
    }

    #[test]
    fn cookie_max_age_is_ttl() {
        let c = session_cookie("sid", Duration::from_secs(86_400)).unwrap();
        assert_eq!(c.to_str().unwrap(), "forte_session=sid; Max-Age=86400; HttpOnly; Path=/");
    }

    #[test]
    fn resolve_session_reuses_live_and_replaces_stale() {
        let sessions = SessionStore::new(Duration::from_secs(60));
        let t0 = Utc::now();
        let live = sessions.create_at(t0).unwrap();
        let later = t0 + chrono::Duration::seconds(30);
        let again = resolve_session(&sessions, Some(&live.id), later).unwrap();
        assert_eq!(again.id, live.id);
        assert_eq!(again.last_touched_at, later);

        let much_later = later + chrono::Duration::seconds(120);
        let fresh = resolve_session(&sessions, Some(&live.id), much_later).unwrap();
        assert_ne!(fresh.id, live.id);
        let anon = resolve_session(&sessions, None, much_later).unwrap();
        assert!(anon.is_anonymous());
        assert_eq!(sessions.len(), 3);
    }

    #[tokio::test]
    async fn sweeper_runs_on_its_period() {
        let sessions = SessionStore::new(Duration::ZERO);
        let stale = sessions.create_at(Utc::now() - chrono::Duration::seconds(5)).unwrap();
        let handle = spawn_session_sweeper(sessions.clone(), Duration::from_millis(20));
        assert_eq!(sessions.len(), 1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sessions.get(&stale.id).is_none());
        assert_eq!(sessions.len(), 0);
        handle.abort();
    }
}
