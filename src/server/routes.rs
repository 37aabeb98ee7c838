//! Route authorization table: `(method, pattern) -> gates + handler`, evaluated
//! in registration order. An admin-gate `Defer` moves on to the next entry that
//! shares the same method and pattern; anything left unanswered is redirected to `/`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::identity::{run_gates, Gate, GateOutcome, RequestContext};

use super::AppState;

/// Terminal answer for unmatched routes and exhausted deferrals.
pub fn redirect_root() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}

#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn call(&self, state: AppState, ctx: RequestContext, req: Request<Body>) -> Response;
}

/// Adapts an async fn `(AppState, RequestContext, Request) -> Response` into a handler.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> RouteHandler for FnHandler<F>
where
    F: Fn(AppState, RequestContext, Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn call(&self, state: AppState, ctx: RequestContext, req: Request<Body>) -> Response {
        (self.0)(state, ctx, req).await
    }
}

pub fn handler<F, Fut>(f: F) -> Arc<dyn RouteHandler>
where
    F: Fn(AppState, RequestContext, Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    /// Trailing `*`: zero or more remaining segments.
    Rest,
}

/// Express-style path pattern: `/api/user/:id/tracks/:offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl PathPattern {
    pub fn parse(raw: &str) -> Self {
        let segments = split_path(raw)
            .map(|s| match s {
                "*" => Segment::Rest,
                _ if s.starts_with(':') && s.len() > 1 => Segment::Param(s[1..].to_string()),
                _ => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { raw: raw.to_string(), segments }
    }

    pub fn as_str(&self) -> &str { &self.raw }

    /// Match a request path, returning the captured (percent-decoded) parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut params = HashMap::new();
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Rest => {
                    params.insert("*".to_string(), parts.get(i..).map(|p| p.join("/")).unwrap_or_default());
                    return Some(params);
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) { return None; }
                }
                Segment::Param(name) => {
                    let raw = parts.get(i)?;
                    let value = urlencoding::decode(raw).map(|v| v.into_owned()).unwrap_or_else(|_| raw.to_string());
                    params.insert(name.clone(), value);
                }
            }
        }
        (parts.len() == self.segments.len()).then_some(params)
    }
}

pub struct RouteEntry {
    pub method: Method,
    pub pattern: PathPattern,
    pub gates: Vec<Gate>,
    pub handler: Arc<dyn RouteHandler>,
}

impl RouteEntry {
    fn same_route(&self, other: &RouteEntry) -> bool {
        self.method == other.method && self.pattern == other.pattern
    }
}

#[derive(Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self { Self::default() }

    pub fn route(mut self, method: Method, pattern: &str, gates: &[Gate], handler: Arc<dyn RouteHandler>) -> Self {
        self.entries.push(RouteEntry { method, pattern: PathPattern::parse(pattern), gates: gates.to_vec(), handler });
        self
    }

    pub fn get(self, pattern: &str, gates: &[Gate], handler: Arc<dyn RouteHandler>) -> Self { self.route(Method::GET, pattern, gates, handler) }
    pub fn post(self, pattern: &str, gates: &[Gate], handler: Arc<dyn RouteHandler>) -> Self { self.route(Method::POST, pattern, gates, handler) }
    pub fn put(self, pattern: &str, gates: &[Gate], handler: Arc<dyn RouteHandler>) -> Self { self.route(Method::PUT, pattern, gates, handler) }
    pub fn head(self, pattern: &str, gates: &[Gate], handler: Arc<dyn RouteHandler>) -> Self { self.route(Method::HEAD, pattern, gates, handler) }

    pub fn entries(&self) -> &[RouteEntry] { &self.entries }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    fn first_for(&self, method: &Method, path: &str) -> Option<(usize, HashMap<String, String>)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| &e.method == method)
            .find_map(|(i, e)| e.pattern.matches(path).map(|p| (i, p)))
    }

    /// First entry matching the request. HEAD falls back to GET entries when no
    /// HEAD entry matches.
    pub fn first_match(&self, method: &Method, path: &str) -> Option<(usize, HashMap<String, String>)> {
        self.first_for(method, path).or_else(|| {
            if *method == Method::HEAD { self.first_for(&Method::GET, path) } else { None }
        })
    }

    /// Next entry after `idx` registered for the same method and pattern.
    pub fn next_same_route(&self, idx: usize) -> Option<usize> {
        let current = self.entries.get(idx)?;
        self.entries
            .iter()
            .enumerate()
            .skip(idx + 1)
            .find(|(_, e)| e.same_route(current))
            .map(|(i, _)| i)
    }

    pub async fn dispatch(&self, state: &AppState, mut ctx: RequestContext, req: Request<Body>) -> Response {
        let Some((mut idx, params)) = self.first_match(&ctx.method, &ctx.path) else {
            debug!(target: "forte::router", request_id = %ctx.request_id, method = %ctx.method, path = %ctx.path, "no route");
            return redirect_root();
        };
        ctx.params = params;
        let base_identity = ctx.identity.clone();
        loop {
            let entry = &self.entries[idx];
            ctx.identity = base_identity.clone();
            match run_gates(&entry.gates, &state.lifecycle, &mut ctx).await {
                GateOutcome::Pass => return entry.handler.call(state.clone(), ctx, req).await,
                GateOutcome::Reject(err) => {
                    debug!(target: "forte::router", request_id = %ctx.request_id, pattern = entry.pattern.as_str(), "rejected: {err}");
                    return err.into_response();
                }
                GateOutcome::Defer => match self.next_same_route(idx) {
                    Some(next) => idx = next,
                    None => {
                        debug!(target: "forte::router", request_id = %ctx.request_id, pattern = entry.pattern.as_str(), "deferral exhausted");
                        return redirect_root();
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_param_segments() {
        let p = PathPattern::parse("/api/user/:id/tracks/:offset");
        let m = p.matches("/api/user/42/tracks/10").unwrap();
        assert_eq!(m.get("id").map(String::as_str), Some("42"));
        assert_eq!(m.get("offset").map(String::as_str), Some("10"));
        assert!(p.matches("/api/user/42/tracks").is_none());
        assert!(p.matches("/api/user/42/tracks/10/extra").is_none());
        assert!(p.matches("/api/users/42/tracks/10").is_none());
    }

    #[test]
    fn params_are_percent_decoded() {
        let p = PathPattern::parse("/search/artist/:query");
        let m = p.matches("/search/artist/daft%20punk").unwrap();
        assert_eq!(m.get("query").map(String::as_str), Some("daft punk"));
    }

    #[test]
    fn root_and_rest_patterns() {
        assert!(PathPattern::parse("/").matches("/").is_some());
        assert!(PathPattern::parse("/").matches("/x").is_none());
        let rest = PathPattern::parse("/about/*");
        assert_eq!(rest.matches("/about/a/b").unwrap().get("*").map(String::as_str), Some("a/b"));
        assert_eq!(rest.matches("/about").unwrap().get("*").map(String::as_str), Some(""));
        assert!(rest.matches("/other").is_none());
    }

    fn noop() -> Arc<dyn RouteHandler> {
        handler(|_, _, _| async { StatusCode::OK.into_response() })
    }

    #[test]
    fn deferral_candidates_share_method_and_pattern() {
        let table = RouteTable::new()
            .get("/config", &[Gate::Admin], noop())
            .get("/config/:x", &[], noop())
            .put("/config", &[Gate::Admin], noop())
            .get("/config", &[], noop());
        assert_eq!(table.next_same_route(0), Some(3));
        assert_eq!(table.next_same_route(2), None);
        assert_eq!(table.next_same_route(3), None);
        assert_eq!(table.first_match(&Method::PUT, "/config").map(|(i, _)| i), Some(2));
        assert_eq!(table.first_match(&Method::HEAD, "/config/1").map(|(i, _)| i), Some(1));
        assert!(table.first_match(&Method::POST, "/config").is_none());
    }
}
