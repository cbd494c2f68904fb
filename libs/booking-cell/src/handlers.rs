use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;
use slot_search_cell::models::EscalationOutcome;

use crate::models::{
    Appointment, AppointmentSignature, BookGroupRequest, BookSlotRequest, GroupPatch,
    RebookRequest,
};
use crate::services::{BookingCoordinator, DuplicationAdapter};

#[axum::debug_handler]
pub async fn book_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<BookSlotRequest>,
) -> Result<Json<Appointment>, AppError> {
    let coordinator = BookingCoordinator::new(&state);
    let appointment = coordinator.book(&request, auth.token()).await?;
    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn book_group(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<BookGroupRequest>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let coordinator = BookingCoordinator::new(&state);
    let appointments = coordinator.book_group(&request, auth.token()).await?;
    Ok(Json(appointments))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let coordinator = BookingCoordinator::new(&state);
    let appointment = coordinator
        .get_appointment(appointment_id, auth.token())
        .await?;
    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn get_group(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let coordinator = BookingCoordinator::new(&state);
    let appointments = coordinator.get_group(group_id, auth.token()).await?;
    Ok(Json(appointments))
}

#[axum::debug_handler]
pub async fn update_group(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(group_id): Path<Uuid>,
    Json(patch): Json<GroupPatch>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let coordinator = BookingCoordinator::new(&state);
    let appointments = coordinator
        .update_group(group_id, &patch, auth.token())
        .await?;
    Ok(Json(appointments))
}

#[axum::debug_handler]
pub async fn cancel_group(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let coordinator = BookingCoordinator::new(&state);
    let appointments = coordinator.cancel_group(group_id, auth.token()).await?;
    Ok(Json(appointments))
}

#[axum::debug_handler]
pub async fn get_signature(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentSignature>, AppError> {
    let adapter = DuplicationAdapter::new(&state);
    let signature = adapter
        .extract_signature(appointment_id, auth.token())
        .await?;
    Ok(Json(signature))
}

#[derive(Debug, Deserialize)]
pub struct DuplicateSearchBody {
    #[serde(default = "default_rebook_days")]
    pub days: usize,
    #[serde(default)]
    pub after_hours_requested: bool,
}

fn default_rebook_days() -> usize {
    crate::services::duplicate::DEFAULT_REBOOK_WINDOW_DAYS
}

#[axum::debug_handler]
pub async fn find_duplicate_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(body): Json<DuplicateSearchBody>,
) -> Result<Json<EscalationOutcome>, AppError> {
    let adapter = DuplicationAdapter::new(&state);
    let signature = adapter
        .extract_signature(appointment_id, auth.token())
        .await?;
    let outcome = adapter
        .find_rebooking_slots(&signature, body.days, body.after_hours_requested, auth.token())
        .await?;
    Ok(Json(outcome))
}

#[axum::debug_handler]
pub async fn rebook(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RebookRequest>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let adapter = DuplicationAdapter::new(&state);
    let signature = adapter
        .extract_signature(appointment_id, auth.token())
        .await?;
    let appointments = adapter.rebook(&signature, &request, auth.token()).await?;
    Ok(Json(appointments))
}
