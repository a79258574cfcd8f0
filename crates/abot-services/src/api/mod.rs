//! HTTP front-end.
//!
//! `POST /?flexidtype=<int>&flexid=<id>&cmd=<utterance>` runs one command
//! and answers with the reply as `text/plain`. `GET /health` reports
//! liveness and the registered plugins.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::service::Abot;

/// Shared state accessible by all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub abot: Arc<Abot>,
}

/// Build the router with all routes.
pub fn build_router(abot: Arc<Abot>) -> Router {
    Router::new()
        .merge(handlers::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { abot })
}
