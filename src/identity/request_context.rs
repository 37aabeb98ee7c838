use std::collections::HashMap;

use axum::http::{HeaderMap, Method};
use uuid::Uuid;

use super::principal::Identity;
use super::session::Session;

/// Header whose presence marks a request as coming from a federated peer.
pub const FEDERATION_HEADER: &str = "federated";

pub type QueryParams = HashMap<String, String>;

/// Evidence shape of a request, resolved once when the request enters dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestShape {
    Federated { query: QueryParams },
    Normal { session_id: Option<String>, query: QueryParams },
}

impl RequestShape {
    pub fn resolve(headers: &HeaderMap, session_id: Option<&str>, query: QueryParams) -> Self {
        if headers.contains_key(FEDERATION_HEADER) {
            RequestShape::Federated { query }
        } else {
            RequestShape::Normal { session_id: session_id.map(str::to_string), query }
        }
    }

    pub fn is_federated(&self) -> bool { matches!(self, RequestShape::Federated { .. }) }

    pub fn query(&self) -> &QueryParams {
        match self {
            RequestShape::Federated { query } | RequestShape::Normal { query, .. } => query,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: Method,
    pub path: String,
    /// Snapshot of the caller's session as attached by the session middleware.
    pub session: Option<Session>,
    pub shape: RequestShape,
    /// Parameters captured by the matched route pattern.
    pub params: HashMap<String, String>,
    /// Identity the gates admitted the request under.
    pub identity: Identity,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, headers: &HeaderMap, session: Option<Session>, query: QueryParams) -> Self {
        let shape = RequestShape::resolve(headers, session.as_ref().map(|s| s.id.as_str()), query);
        let identity = Identity::from_principal(session.as_ref().and_then(|s| s.principal.as_ref()));
        Self {
            request_id: Uuid::new_v4(),
            method,
            path: path.into(),
            session,
            shape,
            params: HashMap::new(),
            identity,
        }
    }

    pub fn session_id(&self) -> Option<&str> { self.session.as_ref().map(|s| s.id.as_str()) }

    pub fn param(&self, name: &str) -> Option<&str> { self.params.get(name).map(String::as_str) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn marker_header_selects_federated_shape() {
        let mut headers = HeaderMap::new();
        let normal = RequestShape::resolve(&headers, Some("sid"), QueryParams::new());
        assert_eq!(normal, RequestShape::Normal { session_id: Some("sid".into()), query: QueryParams::new() });

        headers.insert(FEDERATION_HEADER, HeaderValue::from_static(""));
        let fed = RequestShape::resolve(&headers, Some("sid"), QueryParams::new());
        assert!(fed.is_federated());
    }
}
