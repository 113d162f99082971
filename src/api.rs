//! Read-only HTTP API over stored extractions

mod error;
mod handlers;
mod params;
mod resources;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use params::ListParams;

use crate::{config::ApiConfig, store::ExtractionStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ExtractionStore>,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn ExtractionStore>, config: ApiConfig) -> Self {
        Self { store, config }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/moon-extractions", get(handlers::index))
        .route("/moon-extractions/", get(handlers::index))
        .route("/moon-extractions/statistics", get(handlers::statistics))
        .route("/moon-extractions/upcoming", get(handlers::upcoming))
        .route(
            "/moon-extractions/corporation/:corporation_id",
            get(handlers::by_corporation),
        )
        .route("/moon-extractions/system/:system_id", get(handlers::by_system))
        .route("/moon-extractions/structure/:structure_id", get(handlers::show))
        .route("/moon-extractions/:structure_id", get(handlers::show))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
