//! Admin HTTP API.
//!
//! One endpoint: `POST /relayer/v1/relay_tasks`, gated by the bouncer.
//! Used by operators to (re-)schedule a single transfer of a confirmation
//! without waiting for the catch-up scheduler.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::post;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use crate::bouncer::Bouncer;
use crate::core::Core;
use crate::queue::TaskQueue;

pub struct ApiState {
    pub core: Core,
    pub queue: Arc<dyn TaskQueue>,
    pub bouncer: Bouncer,
}

pub fn routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/relayer/v1/relay_tasks", post(handlers::post_relay_task))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([axum::http::Method::POST])
                .allow_headers(cors::Any),
        )
}
