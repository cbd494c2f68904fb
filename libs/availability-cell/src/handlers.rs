use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_calendar::IsoWeekRef;
use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{CopyWeekRequest, ResolvedAvailability, SaveTemplateRequest, SaveWeekRequest};
use crate::services::AvailabilityResolver;

#[derive(Debug, Deserialize)]
pub struct EffectiveAvailabilityQuery {
    pub date: NaiveDate,
}

#[axum::debug_handler]
pub async fn resolve_week(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, year, week)): Path<(Uuid, i32, u32)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<ResolvedAvailability>, AppError> {
    let resolver = AvailabilityResolver::new(&state);
    let resolved = resolver
        .resolve(provider_id, year, week, auth.token())
        .await?;
    Ok(Json(resolved))
}

#[axum::debug_handler]
pub async fn save_week(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, year, week)): Path<(Uuid, i32, u32)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<SaveWeekRequest>,
) -> Result<Json<Value>, AppError> {
    let resolver = AvailabilityResolver::new(&state);
    let record = resolver
        .save_week(provider_id, year, week, request, auth.token())
        .await?;
    Ok(Json(json!({ "record": record })))
}

#[axum::debug_handler]
pub async fn copy_week(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, year, week)): Path<(Uuid, i32, u32)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CopyWeekRequest>,
) -> Result<Json<Value>, AppError> {
    let resolver = AvailabilityResolver::new(&state);

    let record = match (request.source_year, request.source_week) {
        (Some(source_year), Some(source_week)) => {
            resolver
                .copy_week(
                    provider_id,
                    IsoWeekRef { year, week },
                    IsoWeekRef {
                        year: source_year,
                        week: source_week,
                    },
                    auth.token(),
                )
                .await?
        }
        _ => {
            resolver
                .copy_from_previous(provider_id, year, week, auth.token())
                .await?
        }
    };

    Ok(Json(json!({ "record": record })))
}

#[axum::debug_handler]
pub async fn apply_template(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, year, week)): Path<(Uuid, i32, u32)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let resolver = AvailabilityResolver::new(&state);
    let record = resolver
        .apply_template(provider_id, year, week, auth.token())
        .await?;
    Ok(Json(json!({ "record": record })))
}

#[axum::debug_handler]
pub async fn delete_week(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, year, week)): Path<(Uuid, i32, u32)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let resolver = AvailabilityResolver::new(&state);
    resolver
        .delete_week(provider_id, year, week, auth.token())
        .await?;
    Ok(Json(json!({ "deleted": true })))
}

#[axum::debug_handler]
pub async fn save_template(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<SaveTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    let resolver = AvailabilityResolver::new(&state);
    let template = resolver
        .save_as_template(provider_id, request.availability, auth.token())
        .await?;
    Ok(Json(json!({ "template": template })))
}

#[axum::debug_handler]
pub async fn effective_availability(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<EffectiveAvailabilityQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let resolver = AvailabilityResolver::new(&state);
    let slots = resolver
        .effective_availability(provider_id, query.date, auth.token())
        .await?;
    Ok(Json(json!({
        "date": query.date,
        "slots": slots,
    })))
}
