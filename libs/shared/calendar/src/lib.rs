//! ISO week calendar arithmetic for the scheduling engine.
//!
//! Weekly availability is keyed by ISO (year, week) pairs, so all week math
//! lives here: week 1 is the week containing the year's first Thursday, weeks
//! are Monday-anchored, and a year has 52 or 53 weeks (the ISO week of Dec 28).
//! The clinic's non-working day is Sunday; workday helpers skip it.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("invalid calendar input: {0}")]
    InvalidDate(String),
}

/// An ISO (year, week) pair. The year is the ISO week-year, which near
/// January 1st can differ from the calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IsoWeekRef {
    pub year: i32,
    pub week: u32,
}

pub fn iso_week_of(date: NaiveDate) -> IsoWeekRef {
    let iso = date.iso_week();
    IsoWeekRef {
        year: iso.year(),
        week: iso.week(),
    }
}

/// Number of ISO weeks in `year`: the ISO week number of December 28th,
/// which always falls in the year's last week.
pub fn weeks_in_year(year: i32) -> Result<u32, CalendarError> {
    let dec_28 = NaiveDate::from_ymd_opt(year, 12, 28)
        .ok_or_else(|| CalendarError::InvalidDate(format!("year {} out of range", year)))?;
    Ok(dec_28.iso_week().week())
}

pub fn monday_of(year: i32, week: u32) -> Result<NaiveDate, CalendarError> {
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(|| {
        CalendarError::InvalidDate(format!("no ISO week {} in year {}", week, year))
    })
}

/// The 7 dates of an ISO week, Monday first.
pub fn days_of_week(year: i32, week: u32) -> Result<Vec<NaiveDate>, CalendarError> {
    let monday = monday_of(year, week)?;
    Ok((0..7).map(|i| monday + Duration::days(i)).collect())
}

/// The ISO week preceding (year, week), rolling into the previous year's
/// last week (52 or 53) when `week` is 1.
pub fn previous_week(year: i32, week: u32) -> Result<IsoWeekRef, CalendarError> {
    if week == 0 || week > weeks_in_year(year)? {
        return Err(CalendarError::InvalidDate(format!(
            "no ISO week {} in year {}",
            week, year
        )));
    }
    if week > 1 {
        Ok(IsoWeekRef { year, week: week - 1 })
    } else {
        Ok(IsoWeekRef {
            year: year - 1,
            week: weeks_in_year(year - 1)?,
        })
    }
}

/// The next calendar day that is not the clinic's non-working day (Sunday).
pub fn next_workday(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while next.weekday() == Weekday::Sun {
        next += Duration::days(1);
    }
    next
}

/// `count` workdays starting at `start` (or the next workday if `start`
/// itself is a Sunday), advancing one calendar day at a time.
pub fn workdays_from(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut current = start;
    while days.len() < count {
        if current.weekday() != Weekday::Sun {
            days.push(current);
        }
        current += Duration::days(1);
    }
    days
}
