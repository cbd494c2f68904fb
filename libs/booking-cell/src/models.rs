use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::time::hhmm;
use slot_search_cell::models::{MultiSegmentSlot, SimpleSlot, SlotCandidate, SlotSearchError, Treatment};

// ==============================================================================
// APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// A persisted appointment row. Linked-group members share a
/// `linked_appointment_id` (the parent points at itself) and are ordered by
/// `link_sequence`, starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub treatment_id: Option<Uuid>,
    #[serde(default)]
    pub machine_id: Option<Uuid>,
    #[serde(default)]
    pub provider_id: Option<Uuid>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub linked_appointment_id: Option<Uuid>,
    #[serde(default)]
    pub link_sequence: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

// ==============================================================================
// BOOKING REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSlotRequest {
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub slot: SimpleSlot,
    pub treatment_id: Uuid,
    #[serde(default)]
    pub provider_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookGroupRequest {
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub slot: MultiSegmentSlot,
    #[serde(default)]
    pub provider_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Group-wide edits. `start_time` re-times every member sequentially,
/// preserving each member's duration and the group's contiguity; the other
/// fields apply to all members as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupPatch {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, with = "shared_models::time::hhmm_option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
}

/// Result row of the patient-overlap store procedure.
#[derive(Debug, Clone, Deserialize)]
pub struct OverlapCheck {
    pub has_overlap: bool,
    #[serde(default)]
    pub conflicting_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderAvailabilityCheck {
    pub is_available: bool,
}

// ==============================================================================
// DUPLICATION MODELS
// ==============================================================================

/// Everything needed to search for and book an equivalent appointment:
/// the ordered treatment sequence with durations, plus the patient and
/// provider context. Extracted from any member of a linked group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSignature {
    pub treatments: Vec<Treatment>,
    pub patient_id: Uuid,
    pub patient_name: String,
    #[serde(default)]
    pub provider_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebookRequest {
    pub date: NaiveDate,
    pub slot: SlotCandidate,
    #[serde(default)]
    pub notes: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("invalid booking request: {0}")]
    InvalidRequest(String),

    #[error("patient already has an overlapping appointment")]
    PatientOverlap {
        conflicting_appointment_id: Option<Uuid>,
    },

    #[error("slot is no longer available")]
    SlotNoLongerAvailable,

    #[error("provider is not available for the requested time")]
    ProviderUnavailable,

    #[error("appointment not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Search(#[from] SlotSearchError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            // Unique/exclusion violations on the appointments table mean
            // someone took the slot between search and write.
            StoreError::Conflict(_) => BookingError::SlotNoLongerAvailable,
            other => BookingError::Store(other),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::InvalidTimeRange(msg) => AppError::ValidationError(msg),
            BookingError::InvalidRequest(msg) => AppError::BadRequest(msg),
            BookingError::PatientOverlap {
                conflicting_appointment_id,
            } => AppError::Conflict(match conflicting_appointment_id {
                Some(id) => format!("patient already has overlapping appointment {}", id),
                None => "patient already has an overlapping appointment".to_string(),
            }),
            BookingError::SlotNoLongerAvailable => {
                AppError::Conflict("slot is no longer available".to_string())
            }
            BookingError::ProviderUnavailable => {
                AppError::Conflict("provider is not available for the requested time".to_string())
            }
            BookingError::NotFound(id) => AppError::NotFound(format!("appointment {}", id)),
            BookingError::Search(e) => e.into(),
            BookingError::Store(e) => match e {
                StoreError::NotFound(msg) => AppError::NotFound(msg),
                StoreError::Auth(msg) => AppError::BadRequest(msg),
                other => AppError::Database(other.to_string()),
            },
        }
    }
}
