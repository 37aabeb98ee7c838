//! Unified gateway error model and its HTTP mapping.
//! Every gate rejection and handler failure is rendered through `AppError` so
//! clients always see `{ "status": "error", "message": ... }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const SESSION_EXPIRED: &str = "Session expired.";
pub const FEDERATION_FAILED: &str = "Federation failed.";
pub const INVALID_CREDENTIALS: &str = "Invalid credentials.";
pub const MISSING_CREDENTIALS: &str = "Missing credentials.";
pub const UPSTREAM_UNAVAILABLE: &str = "Upstream unavailable.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// No valid session/credential evidence.
    Unauthenticated { code: String, message: String },
    /// Federation marker present but the peer could not be verified.
    FederationFailed { code: String, message: String },
    InvalidCredentials { code: String, message: String },
    BadRequest { code: String, message: String },
    Upstream { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthenticated { code, .. }
            | AppError::FederationFailed { code, .. }
            | AppError::InvalidCredentials { code, .. }
            | AppError::BadRequest { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthenticated { message, .. }
            | AppError::FederationFailed { message, .. }
            | AppError::InvalidCredentials { message, .. }
            | AppError::BadRequest { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn unauthenticated() -> Self {
        AppError::Unauthenticated { code: "unauthenticated".into(), message: SESSION_EXPIRED.into() }
    }
    pub fn federation_failed() -> Self {
        AppError::FederationFailed { code: "federation_failed".into(), message: FEDERATION_FAILED.into() }
    }
    pub fn invalid_credentials() -> Self {
        AppError::InvalidCredentials { code: "invalid_credentials".into(), message: INVALID_CREDENTIALS.into() }
    }
    pub fn bad_request<S: Into<String>>(code: S, msg: S) -> Self { AppError::BadRequest { code: code.into(), message: msg.into() } }
    pub fn upstream<S: Into<String>>(code: S, msg: S) -> Self { AppError::Upstream { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            AppError::FederationFailed { .. } => StatusCode::UNAUTHORIZED,
            AppError::InvalidCredentials { .. } => StatusCode::UNAUTHORIZED,
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "status": "error", "message": self.message() });
        (self.http_status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::unauthenticated().http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::federation_failed().http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::invalid_credentials().http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::bad_request("bad", "oops").http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::upstream("upstream", "down").http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::internal("internal", "panic").http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn gate_messages_are_fixed() {
        assert_eq!(AppError::unauthenticated().message(), "Session expired.");
        assert_eq!(AppError::federation_failed().message(), "Federation failed.");
        assert_eq!(AppError::federation_failed().to_string(), "federation_failed: Federation failed.");
    }

    #[tokio::test]
    async fn renders_status_error_body() {
        let resp = AppError::unauthenticated().into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v, serde_json::json!({"status": "error", "message": "Session expired."}));
    }
}
