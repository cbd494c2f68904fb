use std::fmt;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_calendar::CalendarError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::time::hhmm;

// ==============================================================================
// WEEKLY SCHEDULE MODELS
// ==============================================================================

/// Weekday names in display order. The schedule grid always renders Monday
/// through Sunday, so ordering is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    /// `[max(a,c), min(b,d)]` when the two ranges overlap, `None` otherwise.
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(TimeRange { start, end })
        } else {
            None
        }
    }
}

/// One weekday of a provider's schedule. When `enabled` is false the day
/// contributes zero availability; `slots` may still hold the last edited
/// ranges so the UI can restore them when the day is re-enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub enabled: bool,
    #[serde(default)]
    pub slots: Vec<TimeRange>,
}

impl DayAvailability {
    pub fn closed() -> Self {
        Self {
            enabled: false,
            slots: Vec::new(),
        }
    }

    pub fn open(slots: Vec<TimeRange>) -> Self {
        Self { enabled: true, slots }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub monday: DayAvailability,
    pub tuesday: DayAvailability,
    pub wednesday: DayAvailability,
    pub thursday: DayAvailability,
    pub friday: DayAvailability,
    pub saturday: DayAvailability,
    pub sunday: DayAvailability,
}

impl WeeklyAvailability {
    pub fn day(&self, day: DayOfWeek) -> &DayAvailability {
        match day {
            DayOfWeek::Monday => &self.monday,
            DayOfWeek::Tuesday => &self.tuesday,
            DayOfWeek::Wednesday => &self.wednesday,
            DayOfWeek::Thursday => &self.thursday,
            DayOfWeek::Friday => &self.friday,
            DayOfWeek::Saturday => &self.saturday,
            DayOfWeek::Sunday => &self.sunday,
        }
    }

    pub fn days(&self) -> impl Iterator<Item = (DayOfWeek, &DayAvailability)> {
        DayOfWeek::ALL.iter().map(move |d| (*d, self.day(*d)))
    }

    pub fn all_closed() -> Self {
        Self {
            monday: DayAvailability::closed(),
            tuesday: DayAvailability::closed(),
            wednesday: DayAvailability::closed(),
            thursday: DayAvailability::closed(),
            friday: DayAvailability::closed(),
            saturday: DayAvailability::closed(),
            sunday: DayAvailability::closed(),
        }
    }

    /// The hard default provider schedule: Mon-Fri 09:00-12:00 and
    /// 14:00-18:00, weekends closed. Injected into the resolver at
    /// construction so a clinic can swap it without touching resolution.
    pub fn clinic_default() -> Self {
        let workday = DayAvailability::open(vec![
            TimeRange::new(t(9, 0), t(12, 0)),
            TimeRange::new(t(14, 0), t(18, 0)),
        ]);
        Self {
            monday: workday.clone(),
            tuesday: workday.clone(),
            wednesday: workday.clone(),
            thursday: workday.clone(),
            friday: workday,
            saturday: DayAvailability::closed(),
            sunday: DayAvailability::closed(),
        }
    }

    /// Fallback clinic-wide operating hours used when the store has no
    /// `clinic_hours` row: Mon-Sat 08:00-20:00, Sunday closed.
    pub fn clinic_operating_default() -> Self {
        let open = DayAvailability::open(vec![TimeRange::new(t(8, 0), t(20, 0))]);
        Self {
            monday: open.clone(),
            tuesday: open.clone(),
            wednesday: open.clone(),
            thursday: open.clone(),
            friday: open.clone(),
            saturday: open,
            sunday: DayAvailability::closed(),
        }
    }
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("static time literal")
}

// ==============================================================================
// RESOLUTION MODELS
// ==============================================================================

/// Where a resolved week came from. Set by the operation that produced the
/// record, never directly by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilitySource {
    Default,
    Template,
    Manual,
    Copied,
}

impl fmt::Display for AvailabilitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            AvailabilitySource::Default => "default",
            AvailabilitySource::Template => "template",
            AvailabilitySource::Manual => "manual",
            AvailabilitySource::Copied => "copied",
        };
        write!(f, "{}", tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAvailability {
    pub availability: WeeklyAvailability,
    pub source: AvailabilitySource,
    pub has_specific_entry: bool,
    pub notes: Option<String>,
}

/// A persisted specific-week record, keyed (provider_id, year, week).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyAvailabilityRecord {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub year: i32,
    pub week: u32,
    pub availability: WeeklyAvailability,
    pub source: AvailabilitySource,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A provider's saved template, keyed by provider alone (no week).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityTemplateRecord {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub availability: WeeklyAvailability,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveWeekRequest {
    pub availability: WeeklyAvailability,
    pub notes: Option<String>,
}

/// Copy another week into the addressed week. Omitting the source copies
/// from the immediately preceding ISO week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyWeekRequest {
    pub source_year: Option<i32>,
    pub source_week: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveTemplateRequest {
    pub availability: WeeklyAvailability,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("corrupt availability record: {0}")]
    CorruptRecord(String),

    #[error("store returned an empty result for {0}")]
    EmptyResult(String),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::InvalidTimeRange(msg) => AppError::ValidationError(msg),
            AvailabilityError::Calendar(e) => AppError::BadRequest(e.to_string()),
            AvailabilityError::CorruptRecord(msg) => AppError::Internal(msg),
            AvailabilityError::EmptyResult(msg) => AppError::Database(msg),
            AvailabilityError::Store(e) => match e {
                StoreError::NotFound(msg) => AppError::NotFound(msg),
                StoreError::Conflict(msg) => AppError::Conflict(msg),
                other => AppError::Database(other.to_string()),
            },
        }
    }
}
