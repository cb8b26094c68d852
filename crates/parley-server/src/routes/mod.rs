//! Route definitions for the HTTP surface.

mod events;
mod health;
mod receiver;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Event intake
        .route(
            "/v1/conversations/:conversation_id/events",
            post(events::post_event),
        )
        // Sample webhook receiver
        .route("/v1/webhook/:conversation_id", post(receiver::receive_notification))
        .with_state(state)
}

pub use events::*;
pub use health::*;
pub use receiver::*;
