// Rate limiting middleware
// Resolves the request path against the route table and counts it per client

use super::AppState;
use crate::rate_limit::RateLimitDecision;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::net::SocketAddr;
use tracing::debug;

/// Derives the client identifier from the request's network origin.
///
/// With `trust_forwarded` set, prefers the first `X-Forwarded-For` hop, then
/// `X-Real-IP`. Falls back to the socket peer address.
pub fn client_key(req: &Request, trust_forwarded: bool) -> String {
    let headers = req.headers();
    let forwarded = trust_forwarded.then_some(headers);
    forwarded
        .and_then(|h| h.get("x-forwarded-for"))
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            forwarded?
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .map(str::to_string)
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(route) = state
        .limiter
        .resolve_route(req.uri().path())
        .map(str::to_string)
    else {
        return next.run(req).await;
    };

    let client = client_key(&req, state.limiter.config().trust_forwarded_for);
    let decision = state.limiter.check(&client, &route).await;
    let now = state.limiter.now();

    debug!(
        client = %client,
        route = %route,
        allowed = decision.allowed,
        remaining = ?decision.remaining(),
        "Rate limit check"
    );

    if !decision.allowed {
        let mut response = rate_limit_error(decision.retry_after(now).unwrap_or(1));
        apply_headers(response.headers_mut(), &decision, now);
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &decision, now);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision, now: DateTime<Utc>) {
    for (name, value) in decision.headers(now) {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

fn rate_limit_error(retry_after: u64) -> Response {
    let body = Json(json!({
        "error": "rate_limit_exceeded",
        "message": "Too many requests. Please try again later.",
        "retry_after": retry_after
    }));

    (StatusCode::TOO_MANY_REQUESTS, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let req = axum::http::Request::builder()
            .uri("/api/sessions")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req, true), "203.0.113.7");
    }

    #[test]
    fn test_client_key_falls_back_to_real_ip() {
        let req = axum::http::Request::builder()
            .uri("/api/sessions")
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req, true), "198.51.100.2");
    }

    #[test]
    fn test_client_key_uses_peer_address() {
        let mut req = axum::http::Request::builder()
            .uri("/api/sessions")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = "192.0.2.10:55000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_key(&req, true), "192.0.2.10");
    }

    #[test]
    fn test_client_key_unknown() {
        let req = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(client_key(&req, true), "unknown");
    }

    #[test]
    fn test_client_key_ignores_headers_when_untrusted() {
        let mut req = axum::http::Request::builder()
            .uri("/api/sessions")
            .header("x-forwarded-for", "203.0.113.7")
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req, false), "unknown");

        let addr: SocketAddr = "192.0.2.10:55000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_key(&req, false), "192.0.2.10");
    }
}
