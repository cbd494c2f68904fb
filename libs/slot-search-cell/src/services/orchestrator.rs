use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use availability_cell::models::{DayOfWeek, TimeRange};
use availability_cell::services::AvailabilityResolver;
use shared_calendar::iso_week_of;
use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{
    SlotCandidate, SlotSearchError, SlotSearchEvent, SlotSearchOutcome, SlotSearchRequest,
};
use crate::services::slot_client::SlotServiceClient;

/// Fans one slot query per day out to the slot-computation service, applies
/// machine and provider filters, and aggregates per-day results as they
/// complete (in any order). Owns only transient candidate data.
pub struct SlotSearchOrchestrator {
    slot_client: SlotServiceClient,
    resolver: AvailabilityResolver,
    check_timeout: Duration,
    generation: AtomicU64,
}

impl SlotSearchOrchestrator {
    pub fn new(config: &AppConfig) -> Self {
        let store = Arc::new(StoreClient::new(config));
        Self {
            slot_client: SlotServiceClient::new(config),
            resolver: AvailabilityResolver::with_default_schedule(
                store,
                availability_cell::models::WeeklyAvailability::clinic_default(),
            ),
            check_timeout: Duration::from_secs(config.availability_check_timeout_secs),
            generation: AtomicU64::new(0),
        }
    }

    /// Run a full window search and return the aggregated outcome. Per-day
    /// failures are counted, not raised; only a window where every single
    /// day failed surfaces as `BackendUnavailable`.
    pub async fn search(
        &self,
        request: &SlotSearchRequest,
        auth_token: &str,
    ) -> Result<SlotSearchOutcome, SlotSearchError> {
        validate_request(request)?;
        if request.window.is_empty() {
            return Ok(SlotSearchOutcome::empty());
        }

        debug!(
            "Searching slots across {} days for {} treatments",
            request.window.len(),
            request.treatments.len()
        );

        let mut pending: FuturesUnordered<_> = request
            .window
            .iter()
            .map(|date| {
                let date = *date;
                async move { (date, self.day_slots(date, request, auth_token).await) }
            })
            .collect();

        let mut days = BTreeMap::new();
        let mut failed_days = 0u32;

        while let Some((date, result)) = pending.next().await {
            match result {
                Ok(slots) if slots.is_empty() => {}
                Ok(slots) => {
                    days.insert(date, slots);
                }
                Err(e) => {
                    warn!("Slot fetch failed for {}: {}", date, e);
                    failed_days += 1;
                }
            }
        }

        if failed_days as usize == request.window.len() {
            return Err(SlotSearchError::BackendUnavailable);
        }

        Ok(SlotSearchOutcome { days, failed_days })
    }

    /// Streaming variant: publishes each day's slots as soon as its fetch
    /// and filters complete, terminated by `Completed`. Each call takes a
    /// fresh generation token; when a newer search supersedes this one, the
    /// remaining completions are dropped instead of reaching the consumer,
    /// so a stale search can never leak into a newer accumulator.
    pub async fn search_streaming(
        &self,
        request: &SlotSearchRequest,
        auth_token: &str,
        tx: mpsc::Sender<SlotSearchEvent>,
    ) -> Result<(), SlotSearchError> {
        validate_request(request)?;
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if request.window.is_empty() {
            let _ = tx.send(SlotSearchEvent::Completed { failed_days: 0 }).await;
            return Ok(());
        }

        let mut pending: FuturesUnordered<_> = request
            .window
            .iter()
            .map(|date| {
                let date = *date;
                async move { (date, self.day_slots(date, request, auth_token).await) }
            })
            .collect();

        let mut failed_days = 0u32;

        while let Some((date, result)) = pending.next().await {
            if self.generation.load(Ordering::SeqCst) != my_generation {
                debug!("Dropping stale slot search generation {}", my_generation);
                return Ok(());
            }

            let event = match result {
                Ok(slots) if slots.is_empty() => continue,
                Ok(slots) => SlotSearchEvent::Day { date, slots },
                Err(e) => {
                    warn!("Slot fetch failed for {}: {}", date, e);
                    failed_days += 1;
                    SlotSearchEvent::DayFailed { date }
                }
            };

            if tx.send(event).await.is_err() {
                // Consumer went away; nothing left to publish to.
                return Ok(());
            }
        }

        if self.generation.load(Ordering::SeqCst) == my_generation {
            let _ = tx.send(SlotSearchEvent::Completed { failed_days }).await;
        }
        Ok(())
    }

    // ==========================================================================
    // PER-DAY PIPELINE
    // ==========================================================================

    /// Fetch one day's raw candidates and run them through the machine and
    /// provider filters. Any failure here fails the whole day.
    async fn day_slots(
        &self,
        date: NaiveDate,
        request: &SlotSearchRequest,
        auth_token: &str,
    ) -> Result<Vec<SlotCandidate>, SlotSearchError> {
        let mut slots: Vec<SlotCandidate> = if request.treatments.len() == 1 {
            self.slot_client
                .get_slots(date, &request.treatments[0], request.allow_after_hours)
                .await?
                .into_iter()
                .map(SlotCandidate::Simple)
                .collect()
        } else {
            self.slot_client
                .get_multi_treatment_slots(date, &request.treatments, request.allow_after_hours)
                .await?
                .into_iter()
                .filter(|m| !m.segments.is_empty())
                .map(SlotCandidate::Multi)
                .collect()
        };

        if let Some(machine_id) = request.filters.machine_id {
            slots.retain(|slot| slot.uses_machine(machine_id));
        }

        if let Some(provider_id) = request.filters.provider_id {
            // One availability check per candidate, awaited in slot order:
            // each check depends on that slot's exact time window.
            let mut kept = Vec::with_capacity(slots.len());
            for slot in slots {
                let available = timeout(
                    self.check_timeout,
                    self.provider_covers_slot(provider_id, date, &slot, auth_token),
                )
                .await
                .map_err(|_| {
                    SlotSearchError::AvailabilityCheck(format!(
                        "provider availability check timed out for {}",
                        date
                    ))
                })??;

                if available {
                    kept.push(slot);
                }
            }
            slots = kept;
        }

        Ok(slots)
    }

    /// Whether the provider's schedule covers the slot's exact window.
    /// Strict slots are checked against effective availability (schedule ∩
    /// clinic hours); after-hours slots are checked against the provider's
    /// own resolved day schedule, since the escalation relaxes clinic hours
    /// but never the provider's schedule.
    async fn provider_covers_slot(
        &self,
        provider_id: uuid::Uuid,
        date: NaiveDate,
        slot: &SlotCandidate,
        auth_token: &str,
    ) -> Result<bool, SlotSearchError> {
        let (Some(start), Some(end)) = (slot.start_time(), slot.end_time()) else {
            return Ok(false);
        };

        let ranges: Vec<TimeRange> = if slot.after_hours() {
            let iso = iso_week_of(date);
            let resolved = self
                .resolver
                .resolve(provider_id, iso.year, iso.week, auth_token)
                .await
                .map_err(|e| SlotSearchError::AvailabilityCheck(e.to_string()))?;
            let day = resolved
                .availability
                .day(DayOfWeek::from_weekday(date.weekday()));
            if !day.enabled {
                return Ok(false);
            }
            day.slots.clone()
        } else {
            self.resolver
                .effective_availability(provider_id, date, auth_token)
                .await
                .map_err(|e| SlotSearchError::AvailabilityCheck(e.to_string()))?
        };

        Ok(ranges.iter().any(|r| r.start <= start && end <= r.end))
    }
}

fn validate_request(request: &SlotSearchRequest) -> Result<(), SlotSearchError> {
    if request.treatments.is_empty() {
        return Err(SlotSearchError::InvalidRequest(
            "at least one treatment is required".into(),
        ));
    }
    for treatment in &request.treatments {
        if treatment.duration_minutes <= 0 {
            return Err(SlotSearchError::InvalidRequest(format!(
                "treatment {} has non-positive duration {}",
                treatment.treatment_id, treatment.duration_minutes
            )));
        }
    }
    Ok(())
}
