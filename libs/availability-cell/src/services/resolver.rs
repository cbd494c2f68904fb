use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_calendar::{iso_week_of, previous_week, IsoWeekRef};
use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{
    AvailabilityError, AvailabilitySource, AvailabilityTemplateRecord, DayOfWeek,
    ResolvedAvailability, SaveWeekRequest, TimeRange, WeeklyAvailability,
    WeeklyAvailabilityRecord,
};

/// Resolves a provider's effective weekly schedule through the three-level
/// hierarchy: specific-week record, saved template, hard default. Owns all
/// AvailabilityRecord mutation; never touches appointments.
pub struct AvailabilityResolver {
    store: Arc<StoreClient>,
    default_schedule: WeeklyAvailability,
}

impl AvailabilityResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_default_schedule(
            Arc::new(StoreClient::new(config)),
            WeeklyAvailability::clinic_default(),
        )
    }

    pub fn with_default_schedule(
        store: Arc<StoreClient>,
        default_schedule: WeeklyAvailability,
    ) -> Self {
        Self {
            store,
            default_schedule,
        }
    }

    /// Resolve the schedule for (provider, year, week). Never fails on
    /// "not found" - resolution always bottoms out at the default schedule.
    pub async fn resolve(
        &self,
        provider_id: Uuid,
        year: i32,
        week: u32,
        auth_token: &str,
    ) -> Result<ResolvedAvailability, AvailabilityError> {
        debug!(
            "Resolving availability for provider {} week {}/{}",
            provider_id, year, week
        );

        if let Some(record) = self
            .fetch_specific_week(provider_id, year, week, auth_token)
            .await?
        {
            return Ok(ResolvedAvailability {
                availability: record.availability,
                source: record.source,
                has_specific_entry: true,
                notes: record.notes,
            });
        }

        if let Some(template) = self.fetch_template(provider_id, auth_token).await? {
            return Ok(ResolvedAvailability {
                availability: template.availability,
                source: AvailabilitySource::Template,
                has_specific_entry: false,
                notes: None,
            });
        }

        Ok(ResolvedAvailability {
            availability: self.default_schedule.clone(),
            source: AvailabilitySource::Default,
            has_specific_entry: false,
            notes: None,
        })
    }

    /// Upsert a specific-week record with `source = manual`. Every time
    /// range is validated before anything is persisted.
    pub async fn save_week(
        &self,
        provider_id: Uuid,
        year: i32,
        week: u32,
        request: SaveWeekRequest,
        auth_token: &str,
    ) -> Result<WeeklyAvailabilityRecord, AvailabilityError> {
        validate_schedule(&request.availability)?;

        self.upsert_week(
            provider_id,
            year,
            week,
            &request.availability,
            AvailabilitySource::Manual,
            request.notes,
            auth_token,
        )
        .await
    }

    /// Resolve the source week through the same hierarchy and materialize it
    /// as the target week's specific record with `source = copied`.
    pub async fn copy_week(
        &self,
        provider_id: Uuid,
        target: IsoWeekRef,
        source: IsoWeekRef,
        auth_token: &str,
    ) -> Result<WeeklyAvailabilityRecord, AvailabilityError> {
        debug!(
            "Copying availability for provider {} from {}/{} to {}/{}",
            provider_id, source.year, source.week, target.year, target.week
        );

        let resolved = self
            .resolve(provider_id, source.year, source.week, auth_token)
            .await?;

        self.upsert_week(
            provider_id,
            target.year,
            target.week,
            &resolved.availability,
            AvailabilitySource::Copied,
            resolved.notes,
            auth_token,
        )
        .await
    }

    /// Copy from the immediately preceding ISO week, rolling across the year
    /// boundary (week 1 of 2025 copies from week 52 of 2024).
    pub async fn copy_from_previous(
        &self,
        provider_id: Uuid,
        year: i32,
        week: u32,
        auth_token: &str,
    ) -> Result<WeeklyAvailabilityRecord, AvailabilityError> {
        let source = previous_week(year, week)?;
        self.copy_week(provider_id, IsoWeekRef { year, week }, source, auth_token)
            .await
    }

    /// Upsert the provider's template. Already-materialized specific weeks
    /// are left untouched.
    pub async fn save_as_template(
        &self,
        provider_id: Uuid,
        availability: WeeklyAvailability,
        auth_token: &str,
    ) -> Result<AvailabilityTemplateRecord, AvailabilityError> {
        validate_schedule(&availability)?;

        let body = json!({
            "provider_id": provider_id,
            "availability": availability,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = "/rest/v1/availability_templates?on_conflict=provider_id";
        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                path,
                Some(auth_token),
                Some(body),
                Some(upsert_headers()),
            )
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| AvailabilityError::EmptyResult("availability template".into()))?;

        serde_json::from_value(row)
            .map_err(|e| AvailabilityError::CorruptRecord(format!("template row: {}", e)))
    }

    /// Materialize the current template as the week's specific record with
    /// `source = template`. Idempotent. Falls back to the default schedule
    /// when the provider never saved a template.
    pub async fn apply_template(
        &self,
        provider_id: Uuid,
        year: i32,
        week: u32,
        auth_token: &str,
    ) -> Result<WeeklyAvailabilityRecord, AvailabilityError> {
        let availability = match self.fetch_template(provider_id, auth_token).await? {
            Some(template) => template.availability,
            None => self.default_schedule.clone(),
        };

        self.upsert_week(
            provider_id,
            year,
            week,
            &availability,
            AvailabilitySource::Template,
            None,
            auth_token,
        )
        .await
    }

    /// Remove the specific record; subsequent resolution falls back to
    /// template/default.
    pub async fn delete_week(
        &self,
        provider_id: Uuid,
        year: i32,
        week: u32,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        debug!(
            "Deleting specific availability for provider {} week {}/{}",
            provider_id, year, week
        );

        let path = format!(
            "/rest/v1/weekly_availability?provider_id=eq.{}&year=eq.{}&week=eq.{}",
            provider_id, year, week
        );
        let _: Vec<Value> = self
            .store
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(representation_headers()),
            )
            .await?;

        Ok(())
    }

    /// The provider's resolved day schedule for `date`, intersected with the
    /// clinic-wide operating hours. Only windows open under both survive.
    pub async fn effective_availability(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<TimeRange>, AvailabilityError> {
        let iso = iso_week_of(date);
        let resolved = self
            .resolve(provider_id, iso.year, iso.week, auth_token)
            .await?;

        let day = DayOfWeek::from_weekday(date.weekday());
        let provider_day = resolved.availability.day(day);
        if !provider_day.enabled {
            return Ok(Vec::new());
        }

        let clinic_hours = self.fetch_clinic_hours(auth_token).await?;
        let clinic_day = clinic_hours.day(day);
        if !clinic_day.enabled {
            return Ok(Vec::new());
        }

        let mut effective = intersect_ranges(&provider_day.slots, &clinic_day.slots);
        effective.sort_by_key(|r| r.start);
        Ok(effective)
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    async fn fetch_specific_week(
        &self,
        provider_id: Uuid,
        year: i32,
        week: u32,
        auth_token: &str,
    ) -> Result<Option<WeeklyAvailabilityRecord>, AvailabilityError> {
        let path = format!(
            "/rest/v1/weekly_availability?provider_id=eq.{}&year=eq.{}&week=eq.{}",
            provider_id, year, week
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let Some(row) = result.into_iter().next() else {
            return Ok(None);
        };

        match serde_json::from_value::<WeeklyAvailabilityRecord>(row) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // Malformed rows fall back one level instead of failing the
                // whole resolution.
                warn!(
                    "Corrupt weekly availability record for provider {} week {}/{}: {}",
                    provider_id, year, week, e
                );
                Ok(None)
            }
        }
    }

    async fn fetch_template(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<AvailabilityTemplateRecord>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_templates?provider_id=eq.{}",
            provider_id
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let Some(row) = result.into_iter().next() else {
            return Ok(None);
        };

        match serde_json::from_value::<AvailabilityTemplateRecord>(row) {
            Ok(template) => Ok(Some(template)),
            Err(e) => {
                warn!(
                    "Corrupt availability template for provider {}: {}",
                    provider_id, e
                );
                Ok(None)
            }
        }
    }

    async fn fetch_clinic_hours(
        &self,
        auth_token: &str,
    ) -> Result<WeeklyAvailability, AvailabilityError> {
        let result: Vec<Value> = self
            .store
            .request(
                Method::GET,
                "/rest/v1/clinic_hours?limit=1",
                Some(auth_token),
                None,
            )
            .await?;

        let Some(row) = result.into_iter().next() else {
            return Ok(WeeklyAvailability::clinic_operating_default());
        };

        match serde_json::from_value::<WeeklyAvailability>(row["operating_hours"].clone()) {
            Ok(hours) => Ok(hours),
            Err(e) => {
                warn!("Corrupt clinic hours row, using default: {}", e);
                Ok(WeeklyAvailability::clinic_operating_default())
            }
        }
    }

    async fn upsert_week(
        &self,
        provider_id: Uuid,
        year: i32,
        week: u32,
        availability: &WeeklyAvailability,
        source: AvailabilitySource,
        notes: Option<String>,
        auth_token: &str,
    ) -> Result<WeeklyAvailabilityRecord, AvailabilityError> {
        let body = json!({
            "provider_id": provider_id,
            "year": year,
            "week": week,
            "availability": availability,
            "source": source,
            "notes": notes,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = "/rest/v1/weekly_availability?on_conflict=provider_id,year,week";
        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                path,
                Some(auth_token),
                Some(body),
                Some(upsert_headers()),
            )
            .await?;

        let row = result.into_iter().next().ok_or_else(|| {
            AvailabilityError::EmptyResult(format!("week {}/{}", year, week))
        })?;

        serde_json::from_value(row)
            .map_err(|e| AvailabilityError::CorruptRecord(format!("saved week row: {}", e)))
    }
}

fn upsert_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static(
            "resolution=merge-duplicates,return=representation",
        ),
    );
    headers
}

fn representation_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static("return=representation"),
    );
    headers
}

/// Reject any malformed range before persistence.
pub(crate) fn validate_schedule(
    availability: &WeeklyAvailability,
) -> Result<(), AvailabilityError> {
    for (day, schedule) in availability.days() {
        for slot in &schedule.slots {
            if !slot.is_well_formed() {
                return Err(AvailabilityError::InvalidTimeRange(format!(
                    "{}: start {} is not before end {}",
                    day,
                    slot.start.format("%H:%M"),
                    slot.end.format("%H:%M")
                )));
            }
        }
    }
    Ok(())
}

/// Pairwise intersection of two slot lists, dropping empty overlaps.
pub(crate) fn intersect_ranges(a: &[TimeRange], b: &[TimeRange]) -> Vec<TimeRange> {
    let mut out = Vec::new();
    for left in a {
        for right in b {
            if let Some(overlap) = left.intersect(right) {
                out.push(overlap);
            }
        }
    }
    out
}
