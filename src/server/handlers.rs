//! Handlers the gateway answers itself: liveness, auth status, the session
//! lifecycle endpoints and the federation handshake.

use axum::body::Body;
use axum::extract::FromRequest;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::{AppError, MISSING_CREDENTIALS};
use crate::identity::{LoginFailure, LoginRequest, RequestContext};

use super::AppState;

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

pub async fn alive(state: AppState, _ctx: RequestContext, _req: Request<Body>) -> Response {
    (StatusCode::OK, Json(json!({ "status": "alive", "version": state.config.version }))).into_response()
}

/// Whether the caller's session belongs to the administrator.
pub async fn auth_status(_state: AppState, ctx: RequestContext, _req: Request<Body>) -> Response {
    let status = ctx.session.as_ref().is_some_and(|s| s.is_admin());
    (StatusCode::OK, Json(json!({ "status": status }))).into_response()
}

async fn read_login_payload(req: Request<Body>) -> Option<LoginPayload> {
    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        Form::<LoginPayload>::from_request(req, &()).await.ok().map(|Form(p)| p)
    } else {
        Json::<LoginPayload>::from_request(req, &()).await.ok().map(|Json(p)| p)
    }
}

pub async fn login(state: AppState, ctx: RequestContext, req: Request<Body>) -> Response {
    let Some(sid) = ctx.session_id().map(str::to_string) else {
        return AppError::internal("no_session", "Session middleware missing.").into_response();
    };
    let Some(payload) = read_login_payload(req).await else {
        return AppError::bad_request("missing_credentials", MISSING_CREDENTIALS).into_response();
    };
    let creds = LoginRequest { username: payload.username, password: payload.password };
    match state.lifecycle.login(&sid, &creds).await {
        Ok(principal) => (StatusCode::OK, Json(json!({ "status": "success", "user": principal.user_id }))).into_response(),
        Err(LoginFailure::NoSession) => AppError::unauthenticated().into_response(),
        Err(LoginFailure::InvalidCredentials) | Err(LoginFailure::Unavailable(_)) => AppError::invalid_credentials().into_response(),
    }
}

/// Read-only session summary.
pub async fn session_summary(state: AppState, ctx: RequestContext, _req: Request<Body>) -> Response {
    let summary = state.lifecycle.read_session(ctx.session_id());
    (StatusCode::OK, Json(json!({ "status": summary.admin, "session": summary }))).into_response()
}

pub async fn log_off(state: AppState, ctx: RequestContext, _req: Request<Body>) -> Response {
    if let Some(sid) = ctx.session_id() {
        state.lifecycle.logoff(sid);
    }
    (StatusCode::OK, Json(json!({ "success": "logged off." }))).into_response()
}

/// Session state as seen by API clients.
pub async fn api_session(state: AppState, ctx: RequestContext, _req: Request<Body>) -> Response {
    let summary = state.lifecycle.read_session(ctx.session_id());
    let status = if summary.authenticated { "success" } else { "error" };
    (StatusCode::OK, Json(json!({ "status": status, "user": summary.user }))).into_response()
}

pub async fn api_test(_state: AppState, _ctx: RequestContext, _req: Request<Body>) -> Response {
    (StatusCode::OK, Json(json!({ "success": "session up to date." }))).into_response()
}

pub async fn session_check(_state: AppState, _ctx: RequestContext, _req: Request<Body>) -> Response {
    (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
}

pub async fn federation_challenge(state: AppState, ctx: RequestContext, _req: Request<Body>) -> Response {
    let Some(domain) = ctx.param("domain") else { return AppError::federation_failed().into_response() };
    match state.lifecycle.federation().issue_challenge(domain).await {
        Ok(Some(challenge)) => (StatusCode::OK, Json(json!({ "status": "success", "domain": domain, "challenge": challenge }))).into_response(),
        Ok(None) => AppError::federation_failed().into_response(),
        Err(e) => {
            warn!(target: "forte::federation", %domain, "challenge issuance failed: {e}");
            AppError::federation_failed().into_response()
        }
    }
}
