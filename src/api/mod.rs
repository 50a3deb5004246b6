//! API layer - HTTP handlers and routing
//!
//! Protected routes (`/`, `/transmit`) sit behind the login-required guard;
//! the login, logout, callback and health routes are public.

pub mod auth;
pub mod middleware;
pub mod pages;
pub mod transmit;

#[cfg(test)]
mod tests;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use middleware::{AppState, ApiError};

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/", get(pages::index))
        .route("/transmit", post(transmit::transmit))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_login,
        ));

    Router::new()
        .merge(protected_routes)
        .merge(auth::router())
        .route("/health", get(pages::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
