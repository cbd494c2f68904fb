use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::time::hhmm;

// ==============================================================================
// SEARCH INPUT MODELS
// ==============================================================================

/// One treatment segment of a search: the slot service only needs the id and
/// duration, the title travels along for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub treatment_id: Uuid,
    pub duration_minutes: i32,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotFilters {
    #[serde(default)]
    pub machine_id: Option<Uuid>,
    #[serde(default)]
    pub provider_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSearchRequest {
    pub treatments: Vec<Treatment>,
    pub window: Vec<NaiveDate>,
    #[serde(default)]
    pub filters: SlotFilters,
    #[serde(default)]
    pub allow_after_hours: bool,
}

// ==============================================================================
// SLOT CANDIDATE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleSlot {
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub machine_id: Option<Uuid>,
    #[serde(default)]
    pub is_overlappable: bool,
    #[serde(default)]
    pub after_hours: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSegment {
    pub treatment_id: Uuid,
    #[serde(default)]
    pub machine_id: Option<Uuid>,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    #[serde(default)]
    pub is_overlappable: bool,
}

/// A contiguous run of segments covering every requested treatment, ordered
/// by start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiSegmentSlot {
    pub segments: Vec<SlotSegment>,
    #[serde(default)]
    pub after_hours: bool,
}

/// A bookable candidate. Explicitly tagged so consumers branch on the tag
/// instead of probing for a `segments` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotCandidate {
    Simple(SimpleSlot),
    Multi(MultiSegmentSlot),
}

impl SlotCandidate {
    pub fn start_time(&self) -> Option<NaiveTime> {
        match self {
            SlotCandidate::Simple(slot) => Some(slot.start_time),
            SlotCandidate::Multi(slot) => slot.segments.first().map(|s| s.start_time),
        }
    }

    pub fn end_time(&self) -> Option<NaiveTime> {
        match self {
            SlotCandidate::Simple(slot) => Some(slot.end_time),
            SlotCandidate::Multi(slot) => slot.segments.last().map(|s| s.end_time),
        }
    }

    /// Machine filter semantics: a simple slot matches on its own machine, a
    /// multi-segment slot matches when any segment uses the machine.
    pub fn uses_machine(&self, machine_id: Uuid) -> bool {
        match self {
            SlotCandidate::Simple(slot) => slot.machine_id == Some(machine_id),
            SlotCandidate::Multi(slot) => slot
                .segments
                .iter()
                .any(|s| s.machine_id == Some(machine_id)),
        }
    }

    pub fn after_hours(&self) -> bool {
        match self {
            SlotCandidate::Simple(slot) => slot.after_hours,
            SlotCandidate::Multi(slot) => slot.after_hours,
        }
    }
}

// ==============================================================================
// SEARCH OUTPUT MODELS
// ==============================================================================

/// Aggregated multi-day search result. Days with zero slots are omitted;
/// `failed_days` is a diagnostic count of per-day fetch failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSearchOutcome {
    pub days: BTreeMap<NaiveDate, Vec<SlotCandidate>>,
    pub failed_days: u32,
}

impl SlotSearchOutcome {
    pub fn empty() -> Self {
        Self {
            days: BTreeMap::new(),
            failed_days: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Incremental per-day result published while a search is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotSearchEvent {
    Day {
        date: NaiveDate,
        slots: Vec<SlotCandidate>,
    },
    DayFailed {
        date: NaiveDate,
    },
    Completed {
        failed_days: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPhase {
    Strict,
    Relaxed,
}

/// Result of the two-phase after-hours policy. `escalated_from_empty`
/// surfaces that the strict phase found nothing and a single relaxed pass
/// produced these slots, so the UI can say so instead of escalating silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationOutcome {
    pub days: BTreeMap<NaiveDate, Vec<SlotCandidate>>,
    pub failed_days: u32,
    pub phase: SearchPhase,
    pub escalated_from_empty: bool,
}

// ==============================================================================
// RESOURCE DIRECTORY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub is_overlappable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub full_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDirectory {
    pub machines: Vec<Machine>,
    pub providers: Vec<Provider>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SlotSearchError {
    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    #[error("slot service unavailable for every day in the window")]
    BackendUnavailable,

    #[error("slot service error: {0}")]
    SlotService(String),

    #[error("availability check failed: {0}")]
    AvailabilityCheck(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<SlotSearchError> for AppError {
    fn from(err: SlotSearchError) -> Self {
        match err {
            SlotSearchError::InvalidRequest(msg) => AppError::BadRequest(msg),
            SlotSearchError::BackendUnavailable => {
                AppError::ExternalService("slot service unavailable, retry later".into())
            }
            SlotSearchError::SlotService(msg) => AppError::ExternalService(msg),
            SlotSearchError::AvailabilityCheck(msg) => AppError::Internal(msg),
            SlotSearchError::Store(e) => match e {
                StoreError::NotFound(msg) => AppError::NotFound(msg),
                StoreError::Conflict(msg) => AppError::Conflict(msg),
                other => AppError::Database(other.to_string()),
            },
        }
    }
}
