//! The forte route table. Entries are declared in evaluation order; handlers
//! not answered by the gateway itself are relayed upstream.

use std::sync::Arc;

use axum::http::Method;

use crate::identity::Gate;

use super::handlers;
use super::routes::{handler, RouteHandler, RouteTable};

const AUTH: &[Gate] = &[Gate::Authenticated];
const ADMIN: &[Gate] = &[Gate::Admin];
const OPEN: &[Gate] = &[];

/// Authenticated API surface relayed upstream, in registration order.
const API_ROUTES: &[(Method, &str)] = &[
    (Method::POST, "/api/cover"),
    (Method::GET, "/api/search/:query"),
    (Method::GET, "/api/stream/:id"),
    (Method::HEAD, "/api/stream/:id"),
    (Method::GET, "/api/artists/:offset"),
    (Method::GET, "/api/albums/:offset"),
    (Method::GET, "/api/profile"),
    (Method::GET, "/api/profile/history"),
    (Method::POST, "/api/profile/history/add"),
    (Method::GET, "/api/profile/tracks/:offset"),
    (Method::GET, "/api/profile/albums/:offset"),
    (Method::GET, "/api/profile/artists/:offset"),
    (Method::GET, "/api/profile/playlists"),
    (Method::POST, "/api/profile/create_playlist"),
    (Method::GET, "/api/user/:id"),
    (Method::GET, "/api/user/:id/history"),
    (Method::GET, "/api/user/:id/tracks/:offset"),
    (Method::GET, "/api/user/:id/playlists"),
    (Method::GET, "/api/user/:id/albums/:offset"),
    (Method::GET, "/api/user/:id/artists/:offset"),
    (Method::GET, "/api/user/:id/friends"),
    (Method::GET, "/api/track/:id"),
    (Method::GET, "/api/track/:id/basic"),
    (Method::GET, "/api/track/:id/love"),
    (Method::GET, "/api/track/:id/unlove"),
    (Method::GET, "/api/track/:id/loved"),
    (Method::GET, "/api/artist/:id"),
    (Method::GET, "/api/artist/:id/love"),
    (Method::GET, "/api/artist/:id/unlove"),
    (Method::GET, "/api/artist/:id/loved"),
    (Method::GET, "/api/album/:id"),
    (Method::GET, "/api/album/:id/tracks"),
    (Method::GET, "/api/album/:id/love"),
    (Method::GET, "/api/album/:id/unlove"),
    (Method::GET, "/api/album/:id/loved"),
    (Method::GET, "/api/all/albums"),
    (Method::GET, "/api/random/track"),
    (Method::GET, "/api/random/tracks"),
    (Method::GET, "/api/friends"),
    (Method::GET, "/api/friends/:id"),
    (Method::POST, "/api/friends/add"),
    (Method::POST, "/api/friends/remove"),
    (Method::GET, "/api/playlist/:id"),
    (Method::GET, "/api/playlist/:id/delete"),
    (Method::GET, "/api/playlist/:id/tracks"),
    (Method::POST, "/api/playlist/:id/add_track"),
    (Method::POST, "/api/playlist/:id/delete_track"),
    (Method::GET, "/api/playlist/:id/loved"),
    (Method::POST, "/api/lyrics"),
    (Method::GET, "/api/lastfm/auth"),
    (Method::POST, "/api/lastfm/auth"),
    (Method::POST, "/api/lastfm/artist"),
    (Method::POST, "/api/lastfm/scrobble"),
    (Method::GET, "/api/lastfm/profile/:username"),
];

pub fn forte_routes(upstream: Arc<dyn RouteHandler>) -> RouteTable {
    let mut table = RouteTable::new()
        .get("/alive", OPEN, handler(handlers::alive))
        .get("/auth", OPEN, handler(handlers::auth_status))
        .post("/login", OPEN, handler(handlers::login))
        .get("/session", OPEN, handler(handlers::session_summary))
        .get("/log_off", OPEN, handler(handlers::log_off))
        // admin console
        .get("/config", ADMIN, upstream.clone())
        .put("/config", ADMIN, upstream.clone())
        .get("/status", ADMIN, upstream.clone())
        .get("/pgp_keys", ADMIN, upstream.clone())
        .get("/get_users", ADMIN, upstream.clone())
        .post("/add_user", ADMIN, upstream.clone())
        .post("/remove_user", ADMIN, upstream.clone())
        .get("/search/artist/:query", ADMIN, upstream.clone())
        .get("/search/album/:query", ADMIN, upstream.clone())
        .get("/search/track/:query", ADMIN, upstream.clone())
        .put("/artist/:id", ADMIN, upstream.clone())
        .put("/album/:id", ADMIN, upstream.clone())
        .put("/track/:id", ADMIN, upstream.clone())
        // api
        .get("/api/test", AUTH, handler(handlers::api_test))
        .get("/api/session", OPEN, handler(handlers::api_session))
        .get("/api/session/check", AUTH, handler(handlers::session_check));

    for (method, path) in API_ROUTES {
        table = table.route(method.clone(), path, AUTH, upstream.clone());
    }

    table
        .post("/f/api", AUTH, upstream)
        .get("/f/challenge/:domain", OPEN, handler(handlers::federation_challenge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn table() -> RouteTable {
        forte_routes(handler(|_, _, _| async { StatusCode::NO_CONTENT.into_response() }))
    }

    fn gates_of(t: &RouteTable, method: Method, path: &str) -> Vec<Gate> {
        let (i, _) = t.first_match(&method, path).expect("route registered");
        t.entries()[i].gates.clone()
    }

    #[test]
    fn admin_routes_carry_admin_gate() {
        let t = table();
        for (m, p) in [
            (Method::GET, "/config"),
            (Method::PUT, "/config"),
            (Method::GET, "/status"),
            (Method::POST, "/add_user"),
            (Method::GET, "/search/album/abba"),
            (Method::PUT, "/track/7"),
        ] {
            assert_eq!(gates_of(&t, m, p), vec![Gate::Admin], "{p}");
        }
    }

    #[test]
    fn api_routes_require_authentication_except_session() {
        let t = table();
        assert_eq!(gates_of(&t, Method::GET, "/api/profile"), vec![Gate::Authenticated]);
        assert_eq!(gates_of(&t, Method::HEAD, "/api/stream/9"), vec![Gate::Authenticated]);
        assert_eq!(gates_of(&t, Method::POST, "/api/lastfm/scrobble"), vec![Gate::Authenticated]);
        assert_eq!(gates_of(&t, Method::POST, "/f/api"), vec![Gate::Authenticated]);
        assert!(gates_of(&t, Method::GET, "/api/session").is_empty());
        assert!(gates_of(&t, Method::GET, "/f/challenge/peer.example").is_empty());
    }

    #[test]
    fn registration_order_is_preserved() {
        let t = table();
        let (session_idx, _) = t.first_match(&Method::GET, "/api/session").unwrap();
        let (check_idx, _) = t.first_match(&Method::GET, "/api/session/check").unwrap();
        let (alive_idx, _) = t.first_match(&Method::GET, "/alive").unwrap();
        assert_eq!(alive_idx, 0);
        assert!(session_idx < check_idx);
        assert!(t.first_match(&Method::GET, "/nowhere").is_none());
    }

    #[test]
    fn admin_console_order() {
        let t = table();
        let admin: Vec<(Method, &str)> = t
            .entries()
            .iter()
            .filter(|e| e.gates == [Gate::Admin])
            .map(|e| (e.method.clone(), e.pattern.as_str()))
            .collect();
        assert_eq!(
            admin,
            vec![
                (Method::GET, "/config"),
                (Method::PUT, "/config"),
                (Method::GET, "/status"),
                (Method::GET, "/pgp_keys"),
                (Method::GET, "/get_users"),
                (Method::POST, "/add_user"),
                (Method::POST, "/remove_user"),
                (Method::GET, "/search/artist/:query"),
                (Method::GET, "/search/album/:query"),
                (Method::GET, "/search/track/:query"),
                (Method::PUT, "/artist/:id"),
                (Method::PUT, "/album/:id"),
                (Method::PUT, "/track/:id"),
            ]
        );
    }

    #[test]
    fn api_methods_are_registered_as_declared() {
        let t = table();
        let (i, _) = t.first_match(&Method::POST, "/api/cover").unwrap();
        assert_eq!(t.entries()[i].method, Method::POST);
        assert!(t.first_match(&Method::GET, "/api/cover").is_none());
        assert!(t.first_match(&Method::GET, "/api/lastfm/auth").is_some());
        assert!(t.first_match(&Method::POST, "/api/lastfm/auth").is_some());
    }
}
