use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn booking_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::book_slot))
        .route("/group", post(handlers::book_group))
        .route(
            "/group/{group_id}",
            get(handlers::get_group).patch(handlers::update_group),
        )
        .route("/group/{group_id}/cancel", post(handlers::cancel_group))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/signature", get(handlers::get_signature))
        .route(
            "/{appointment_id}/duplicate/slots",
            post(handlers::find_duplicate_slots),
        )
        .route("/{appointment_id}/rebook", post(handlers::rebook))
        .with_state(state)
}
