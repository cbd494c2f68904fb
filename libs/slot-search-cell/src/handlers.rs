use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::TypedHeader;
use futures::stream;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::warn;

use shared_models::error::AppError;

use crate::models::{EscalationOutcome, ResourceDirectory, SlotSearchRequest};
use crate::router::SlotSearchState;
use crate::services::ResourceDirectoryService;

#[derive(Debug, Deserialize)]
pub struct SlotSearchBody {
    #[serde(flatten)]
    pub request: SlotSearchRequest,
    /// The user's explicit "include after-hours slots" choice.
    #[serde(default)]
    pub after_hours_requested: bool,
}

#[axum::debug_handler]
pub async fn search_slots(
    State(state): State<Arc<SlotSearchState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(body): Json<SlotSearchBody>,
) -> Result<Json<EscalationOutcome>, AppError> {
    let outcome = state
        .controller
        .search_with_escalation(&body.request, body.after_hours_requested, auth.token())
        .await?;
    Ok(Json(outcome))
}

/// Incremental variant of the search: one NDJSON line per emitted event,
/// terminated by a `completed` line. The search runs on the shared
/// orchestrator, so a newer search (from any request) supersedes this one
/// and its remaining days are silently dropped.
#[axum::debug_handler]
pub async fn stream_search_slots(
    State(state): State<Arc<SlotSearchState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(body): Json<SlotSearchBody>,
) -> impl IntoResponse {
    let request = if body.after_hours_requested {
        SlotSearchRequest {
            allow_after_hours: true,
            ..body.request
        }
    } else {
        body.request
    };
    let token = auth.token().to_string();
    let (tx, rx) = mpsc::channel(16);

    let worker_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = worker_state
            .controller
            .orchestrator()
            .search_streaming(&request, &token, tx)
            .await
        {
            warn!("Streaming slot search failed: {}", e);
        }
    });

    let lines = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let mut line = serde_json::to_vec(&event).ok()?;
        line.push(b'\n');
        Some((Ok::<_, std::convert::Infallible>(line), rx))
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
}

#[axum::debug_handler]
pub async fn get_resources(
    State(state): State<Arc<SlotSearchState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<ResourceDirectory>, AppError> {
    let service = ResourceDirectoryService::new(&state.config);
    let resources = service.get_resources(auth.token()).await?;
    Ok(Json(resources))
}
