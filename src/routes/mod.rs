//! HTTP routes.
//!
//! `/` runs a health check, `/health` is a liveness probe for the monitor
//! itself. Responses are never cacheable. Every request gets a request ID
//! span from the middleware so probe logs can be correlated with requests.

pub mod health;
pub mod monitor;

use axum::{middleware, routing::get, Router};
use axum::http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CACHE_CONTROL_NO_STORE;
use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Creates the Axum router with all routes and response headers.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(monitor::run))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NO_STORE),
        ))
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
