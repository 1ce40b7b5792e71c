//! crowdwork library interface.
//!
//! Exposes the core pipeline (extraction, fan-out, synthesis, streaming
//! session), the archive boundary and the HTTP router for integration
//! testing.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod generate;
pub mod model;
pub mod session;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use crate::config::Config;
use crate::generate::Generator;
use crate::store::Archive;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub generator: Arc<dyn Generator>,
    pub archive: Arc<dyn Archive>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        generator: Arc<dyn Generator>,
        archive: Arc<dyn Archive>,
    ) -> Self {
        Self {
            config,
            generator,
            archive,
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    api::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
