use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route(
            "/providers/{provider_id}/weeks/{year}/{week}",
            get(handlers::resolve_week)
                .put(handlers::save_week)
                .delete(handlers::delete_week),
        )
        .route(
            "/providers/{provider_id}/weeks/{year}/{week}/copy",
            post(handlers::copy_week),
        )
        .route(
            "/providers/{provider_id}/weeks/{year}/{week}/apply-template",
            post(handlers::apply_template),
        )
        .route(
            "/providers/{provider_id}/template",
            put(handlers::save_template),
        )
        .route(
            "/providers/{provider_id}/effective",
            get(handlers::effective_availability),
        )
        .with_state(state)
}
