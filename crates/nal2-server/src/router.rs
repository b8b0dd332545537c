//! Route table.

use crate::http::Request;

/// Engine endpoints.
pub const ENGINE_PATHS: [&str; 2] = ["/api/nal2", "/api/nal2/process"];
/// Health endpoints.
pub const HEALTH_PATHS: [&str; 2] = ["/", "/health"];

/// What to do with a parsed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Switch the connection to a WebSocket session.
    Upgrade,
    /// Hand the body to the engine bridge.
    Engine,
    /// Answer a CORS preflight.
    Preflight,
    /// Engine path with an unsupported method.
    MethodNotAllowed,
    Health,
    NotFound,
}

/// Classify `req`. Upgrades are recognised before the path table; paths
/// match exactly and methods are case-sensitive.
pub fn route(req: &Request) -> Route {
    if req.is_websocket_upgrade() {
        return Route::Upgrade;
    }
    let path = req.path.as_str();
    if ENGINE_PATHS.contains(&path) {
        return match req.method.as_str() {
            "POST" => Route::Engine,
            "OPTIONS" => Route::Preflight,
            _ => Route::MethodNotAllowed,
        };
    }
    if HEALTH_PATHS.contains(&path) {
        return Route::Health;
    }
    Route::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(method: &str, path: &str) -> Request {
        Request {
            method: method.into(),
            path: path.into(),
            version: "HTTP/1.1".into(),
            ..Request::default()
        }
    }

    #[test]
    fn engine_paths() {
        assert_eq!(route(&req("POST", "/api/nal2")), Route::Engine);
        assert_eq!(route(&req("POST", "/api/nal2/process")), Route::Engine);
        assert_eq!(route(&req("OPTIONS", "/api/nal2")), Route::Preflight);
        assert_eq!(route(&req("GET", "/api/nal2")), Route::MethodNotAllowed);
        assert_eq!(route(&req("post", "/api/nal2")), Route::MethodNotAllowed);
    }

    #[test]
    fn health_answers_any_method() {
        assert_eq!(route(&req("GET", "/")), Route::Health);
        assert_eq!(route(&req("DELETE", "/health")), Route::Health);
    }

    #[test]
    fn everything_else_is_not_found() {
        assert_eq!(route(&req("GET", "/foo")), Route::NotFound);
        assert_eq!(route(&req("GET", "/health?verbose=1")), Route::NotFound);
        assert_eq!(route(&req("POST", "/api/nal2/")), Route::NotFound);
    }

    #[test]
    fn upgrade_checked_first() {
        let mut r = req("GET", "/api/nal2");
        r.headers = vec![
            ("Upgrade".into(), "websocket".into()),
            ("Sec-WebSocket-Key".into(), "dGhlIHNhbXBsZSBub25jZQ==".into()),
        ];
        assert_eq!(route(&r), Route::Upgrade);
    }
}
