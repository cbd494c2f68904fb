use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;
use crate::services::AfterHoursEscalationController;

/// Long-lived cell state shared across requests. Holding one controller
/// (and its orchestrator) here is what lets a new streaming search
/// supersede an in-flight one.
pub struct SlotSearchState {
    pub config: Arc<AppConfig>,
    pub controller: AfterHoursEscalationController,
}

pub fn slot_search_routes(config: Arc<AppConfig>) -> Router {
    let state = Arc::new(SlotSearchState {
        controller: AfterHoursEscalationController::new(&config),
        config,
    });

    Router::new()
        .route("/search", post(handlers::search_slots))
        .route("/search/stream", post(handlers::stream_search_slots))
        .route("/resources", get(handlers::get_resources))
        .with_state(state)
}
