//! parley-server - HTTP surface for parley.
//!
//! Exposes event intake for the enabled plugins, a health check, and a
//! sample receiver for webhook notifications.
//!
//! # Example
//!
//! ```ignore
//! use parley_core::PluginConfig;
//! use parley_server::{create_server, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PluginConfig::from_env().unwrap();
//!     let state = AppState::from_config(&config).await.unwrap();
//!     let app = create_server(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod error;
pub mod factory;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use factory::create_plugins;
pub use state::AppState;

use axum::{middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

/// Create the server with all routes and middleware.
pub fn create_server(state: AppState) -> Router {
    routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
