//! HTTP/SSE transport surface.
//!
//! The bridge core knows nothing about HTTP; this layer supplies the
//! boundary contracts it consumes: per-connection session ids, delivery
//! channels, close notifications, and the inbound message endpoint.

pub mod handlers;
pub mod routes;

use std::sync::Arc;

use crate::bridge::Bridge;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
    /// Advertised to clients in the SSE handshake event.
    pub message_path: String,
}
