use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use availability_cell::router::availability_routes;
use booking_cell::router::booking_routes;
use shared_config::AppConfig;
use slot_search_cell::router::slot_search_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/availability", availability_routes(state.clone()))
        .nest("/scheduling", slot_search_routes(state.clone()))
        .nest("/appointments", booking_routes(state.clone()))
}
