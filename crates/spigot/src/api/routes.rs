//! API route definitions.

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, post};
use log::warn;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use super::AppState;
use super::handlers;
use crate::config::AppConfig;

/// Create the application router: the SSE connection endpoint, the inbound
/// message endpoint, any configured health endpoints, static response
/// headers, and CORS.
pub fn create_router(state: AppState, config: &AppConfig) -> Router {
    let mut router = Router::new()
        .route(&config.sse_path, get(handlers::sse_connect))
        .route(&config.message_path, post(handlers::submit_message));

    for path in &config.health_endpoints {
        router = router.route(path, get(handlers::health));
    }

    let mut router = router.with_state(state);

    for (name, value) in &config.headers {
        match (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                router = router.layer(SetResponseHeaderLayer::overriding(name, value));
            }
            _ => warn!("Skipping invalid static header '{}'", name),
        }
    }

    if let Some(cors) = build_cors_layer(&config.cors_origins) {
        router = router.layer(cors);
    }

    router
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    if origins.iter().any(|o| o == "*") {
        return Some(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let exact: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Skipping invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(exact))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
