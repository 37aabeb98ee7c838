//! Relays admitted requests to the backend that hosts the business handlers.
//! The resolved identity travels in `x-forte-*` headers; client-supplied copies
//! of those headers are dropped.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, HttpBody};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::error::{AppError, UPSTREAM_UNAVAILABLE};
use crate::identity::RequestContext;

use super::routes::RouteHandler;
use super::{AppState, SESSION_COOKIE};

pub const PRINCIPAL_HEADER: &str = "x-forte-principal";
pub const IDENTITY_HEADER: &str = "x-forte-identity";
pub const REQUEST_ID_HEADER: &str = "x-forte-request-id";

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Request bodies are re-streamed, so the client's framing headers are not reused.
fn forwardable_request(name: &HeaderName) -> bool {
    let n = name.as_str();
    !HOP_BY_HOP.contains(&n) && n != "host" && n != "content-length" && !n.starts_with("x-forte-")
}

/// Upstream answers keep their content headers, `content-length` included.
fn forwardable_response(name: &HeaderName) -> bool {
    !HOP_BY_HOP.contains(&name.as_str())
}

/// Copy end-to-end headers; the gateway session cookie stays at the gateway.
fn copy_request_headers(src: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in src.iter() {
        if !forwardable_request(name) { continue; }
        if name == axum::http::header::COOKIE {
            let kept: Vec<&str> = value
                .to_str()
                .unwrap_or("")
                .split(';')
                .map(str::trim)
                .filter(|c| !c.is_empty() && !c.starts_with(&format!("{}=", SESSION_COOKIE)))
                .collect();
            if !kept.is_empty() {
                if let Ok(v) = HeaderValue::from_str(&kept.join("; ")) { out.append(name.clone(), v); }
            }
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

pub struct UpstreamHandler {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl UpstreamHandler {
    pub fn new(base_url: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn target_url(&self, req: &Request<Body>) -> Option<String> {
        let base = self.base_url.as_deref()?;
        let path_and_query = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        Some(format!("{}{}", base, path_and_query))
    }
}

#[async_trait]
impl RouteHandler for UpstreamHandler {
    async fn call(&self, _state: AppState, ctx: RequestContext, req: Request<Body>) -> Response {
        let Some(url) = self.target_url(&req) else {
            warn!(target: "forte::upstream", path = %ctx.path, "no upstream configured");
            return AppError::upstream("upstream_unset", UPSTREAM_UNAVAILABLE).into_response();
        };
        let mut headers = copy_request_headers(req.headers());
        if let Some(subject) = ctx.identity.subject().and_then(|s| HeaderValue::from_str(s).ok()) {
            headers.insert(PRINCIPAL_HEADER, subject);
        }
        headers.insert(IDENTITY_HEADER, HeaderValue::from_static(ctx.identity.kind()));
        if let Ok(rid) = HeaderValue::from_str(&ctx.request_id.to_string()) {
            headers.insert(REQUEST_ID_HEADER, rid);
        }

        let method = req.method().clone();
        let body = req.into_body();
        let mut outbound = self.client.request(method, &url).headers(headers);
        if body.size_hint().exact() != Some(0) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let sent = outbound.send().await;
        let resp = match sent {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "forte::upstream", request_id = %ctx.request_id, %url, "upstream request failed: {e}");
                return AppError::upstream("upstream_unavailable", UPSTREAM_UNAVAILABLE).into_response();
            }
        };
        debug!(target: "forte::upstream", request_id = %ctx.request_id, status = resp.status().as_u16(), "upstream answered");

        let status = resp.status();
        let upstream_headers = resp.headers().clone();
        let mut out = Response::new(Body::from_stream(resp.bytes_stream()));
        *out.status_mut() = status;
        for (name, value) in upstream_headers.iter() {
            if forwardable_response(name) { out.headers_mut().append(name.clone(), value.clone()); }
        }
        out
    }
}
