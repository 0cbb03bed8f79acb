//! HTTP surface for the session registry and rate limiter

pub mod handlers;
pub mod middleware;

use crate::rate_limit::RateLimiter;
use crate::session::SessionRegistry;
use axum::{
    Router,
    routing::{get, post},
};

/// Per-process components shared by every request
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(sessions: SessionRegistry, limiter: RateLimiter) -> Self {
        Self { sessions, limiter }
    }
}

/// Builds the application router with rate limiting applied to every route
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session)
                .patch(handlers::update_session)
                .delete(handlers::delete_session),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .with_state(state)
}
