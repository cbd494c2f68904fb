use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{StoreClient, StoreError};
use slot_search_cell::models::SlotSegment;

use crate::models::{
    Appointment, AppointmentStatus, BookGroupRequest, BookSlotRequest, BookingError, GroupPatch,
    OverlapCheck, ProviderAvailabilityCheck,
};

/// Writes appointments against the store, guarding every write with the
/// patient-overlap and provider-availability preconditions. Linked groups
/// are created member-by-member and rolled back as a unit on any failure;
/// the store never keeps a partial group.
pub struct BookingCoordinator {
    store: Arc<StoreClient>,
}

impl BookingCoordinator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    // --------------------------------------------------------------------------
    // Single-slot booking
    // --------------------------------------------------------------------------

    pub async fn book(
        &self,
        request: &BookSlotRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let slot = &request.slot;
        if slot.start_time >= slot.end_time {
            return Err(BookingError::InvalidTimeRange(format!(
                "slot start {} is not before end {}",
                slot.start_time.format("%H:%M"),
                slot.end_time.format("%H:%M"),
            )));
        }

        self.ensure_no_patient_overlap(
            request.patient_id,
            request.date,
            slot.start_time,
            slot.end_time,
            auth_token,
        )
        .await?;

        if let Some(provider_id) = request.provider_id {
            self.ensure_provider_available(
                provider_id,
                request.date,
                slot.start_time,
                slot.end_time,
                auth_token,
            )
            .await?;
        }

        // Overlappable machines (e.g. treatment rooms that double-book) are
        // not assigned, so the exclusion constraint only fires for exclusive
        // machines.
        let machine_id = if slot.is_overlappable {
            None
        } else {
            slot.machine_id
        };

        let body = json!({
            "patient_id": request.patient_id,
            "date": request.date,
            "start_time": slot.start_time.format("%H:%M").to_string(),
            "end_time": slot.end_time.format("%H:%M").to_string(),
            "treatment_id": request.treatment_id,
            "machine_id": machine_id,
            "provider_id": request.provider_id,
            "status": AppointmentStatus::Scheduled,
            "notes": request.notes,
            "priority": request.priority,
            "updated_at": Utc::now(),
        });

        let appointment = self.create_row(body, auth_token).await?;
        info!(
            "Booked appointment {} for patient {} on {}",
            appointment.id, request.patient_id, request.date
        );
        Ok(appointment)
    }

    // --------------------------------------------------------------------------
    // Linked-group booking
    // --------------------------------------------------------------------------

    /// Books every segment of a multi-segment slot as one linked group. The
    /// whole request is validated before the first write, and any mid-group
    /// store failure deletes the members already created before returning
    /// the underlying error.
    pub async fn book_group(
        &self,
        request: &BookGroupRequest,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let segments = &request.slot.segments;
        validate_segments(segments)?;

        let span_start = segments[0].start_time;
        let span_end = segments[segments.len() - 1].end_time;

        self.ensure_no_patient_overlap(
            request.patient_id,
            request.date,
            span_start,
            span_end,
            auth_token,
        )
        .await?;

        if let Some(provider_id) = request.provider_id {
            self.ensure_provider_available(
                provider_id,
                request.date,
                span_start,
                span_end,
                auth_token,
            )
            .await?;
        }

        let mut created: Vec<Appointment> = Vec::with_capacity(segments.len());

        let parent = self
            .create_row(self.segment_body(request, &segments[0], 1, None), auth_token)
            .await?;
        let parent_id = parent.id;
        created.push(parent);

        // The parent anchors the group by pointing at itself, so one filter
        // on linked_appointment_id selects every member including the parent.
        match self
            .patch_appointment(
                parent_id,
                json!({ "linked_appointment_id": parent_id, "updated_at": Utc::now() }),
                auth_token,
            )
            .await
        {
            Ok(patched) => created[0] = patched,
            Err(e) => {
                self.rollback_created(&created, auth_token).await;
                return Err(e);
            }
        }

        for (i, segment) in segments.iter().enumerate().skip(1) {
            let body = self.segment_body(request, segment, (i + 1) as i32, Some(parent_id));
            match self.create_row(body, auth_token).await {
                Ok(appointment) => created.push(appointment),
                Err(e) => {
                    self.rollback_created(&created, auth_token).await;
                    return Err(e);
                }
            }
        }

        info!(
            "Booked linked group {} with {} members for patient {} on {}",
            parent_id,
            created.len(),
            request.patient_id,
            request.date
        );
        Ok(created)
    }

    // --------------------------------------------------------------------------
    // Reads
    // --------------------------------------------------------------------------

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let rows: Vec<Appointment> = self
            .store
            .request(
                Method::GET,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                Some(auth_token),
                None,
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or(BookingError::NotFound(appointment_id))
    }

    /// Every member of a linked group, parent first, ordered by
    /// `link_sequence`.
    pub async fn get_group(
        &self,
        group_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let rows: Vec<Appointment> = self
            .store
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/appointments?linked_appointment_id=eq.{}&order=link_sequence.asc",
                    group_id
                ),
                Some(auth_token),
                None,
            )
            .await?;
        if rows.is_empty() {
            return Err(BookingError::NotFound(group_id));
        }
        Ok(rows)
    }

    // --------------------------------------------------------------------------
    // Group lifecycle
    // --------------------------------------------------------------------------

    /// Applies a patch to every member of a group. Shared fields go out as a
    /// single filtered write; a start-time change re-times each member
    /// individually, restoring the already-patched members if a later write
    /// fails.
    pub async fn update_group(
        &self,
        group_id: Uuid,
        patch: &GroupPatch,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let members = self.get_group(group_id, auth_token).await?;

        let mut shared = Map::new();
        if let Some(date) = patch.date {
            shared.insert("date".into(), json!(date));
        }
        if let Some(notes) = &patch.notes {
            shared.insert("notes".into(), json!(notes));
        }
        if let Some(priority) = patch.priority {
            shared.insert("priority".into(), json!(priority));
        }
        if let Some(status) = patch.status {
            shared.insert("status".into(), json!(status));
        }

        if let Some(new_start) = patch.start_time {
            let retimed = retime_members(&members, new_start)?;
            let mut applied: Vec<&Appointment> = Vec::new();

            for (member, (id, start, end)) in members.iter().zip(retimed) {
                let mut body = shared.clone();
                body.insert("start_time".into(), json!(start.format("%H:%M").to_string()));
                body.insert("end_time".into(), json!(end.format("%H:%M").to_string()));
                body.insert("updated_at".into(), json!(Utc::now()));

                if let Err(e) = self.patch_appointment(id, Value::Object(body), auth_token).await {
                    self.restore_members(&applied, auth_token).await;
                    return Err(e);
                }
                applied.push(member);
            }
        } else if !shared.is_empty() {
            shared.insert("updated_at".into(), json!(Utc::now()));
            let _: Vec<Appointment> = self
                .store
                .request_with_headers(
                    Method::PATCH,
                    &format!("/rest/v1/appointments?linked_appointment_id=eq.{}", group_id),
                    Some(auth_token),
                    Some(Value::Object(shared)),
                    Some(representation_headers()),
                )
                .await?;
        }

        self.get_group(group_id, auth_token).await
    }

    /// Cancels the whole group in one filtered write.
    pub async fn cancel_group(
        &self,
        group_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        // Surfaces NotFound before the blanket patch.
        self.get_group(group_id, auth_token).await?;

        let mut cancelled: Vec<Appointment> = self
            .store
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/appointments?linked_appointment_id=eq.{}", group_id),
                Some(auth_token),
                Some(json!({
                    "status": AppointmentStatus::Cancelled,
                    "updated_at": Utc::now(),
                })),
                Some(representation_headers()),
            )
            .await?;
        cancelled.sort_by_key(|a| a.link_sequence);

        info!("Cancelled linked group {} ({} members)", group_id, cancelled.len());
        Ok(cancelled)
    }

    // --------------------------------------------------------------------------
    // Preconditions
    // --------------------------------------------------------------------------

    async fn ensure_no_patient_overlap(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        debug!(
            "Checking patient {} for overlaps on {} {}-{}",
            patient_id,
            date,
            start_time.format("%H:%M"),
            end_time.format("%H:%M")
        );

        let check: OverlapCheck = self
            .store
            .request(
                Method::POST,
                "/rest/v1/rpc/check_patient_overlap",
                Some(auth_token),
                Some(json!({
                    "p_patient_id": patient_id,
                    "p_date": date,
                    "p_start_time": start_time.format("%H:%M").to_string(),
                    "p_end_time": end_time.format("%H:%M").to_string(),
                })),
            )
            .await
            .map_err(BookingError::Store)?;

        if check.has_overlap {
            return Err(BookingError::PatientOverlap {
                conflicting_appointment_id: check.conflicting_appointment_id,
            });
        }
        Ok(())
    }

    async fn ensure_provider_available(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let check: ProviderAvailabilityCheck = self
            .store
            .request(
                Method::POST,
                "/rest/v1/rpc/check_provider_availability",
                Some(auth_token),
                Some(json!({
                    "p_provider_id": provider_id,
                    "p_date": date,
                    "p_start_time": start_time.format("%H:%M").to_string(),
                    "p_end_time": end_time.format("%H:%M").to_string(),
                })),
            )
            .await
            .map_err(BookingError::Store)?;

        if !check.is_available {
            return Err(BookingError::ProviderUnavailable);
        }
        Ok(())
    }

    // --------------------------------------------------------------------------
    // Store helpers
    // --------------------------------------------------------------------------

    async fn create_row(&self, body: Value, auth_token: &str) -> Result<Appointment, BookingError> {
        let rows: Vec<Appointment> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await?;
        // An accepted insert that returns no representation means row-level
        // security swallowed the write.
        rows.into_iter().next().ok_or_else(|| {
            warn!("Appointment insert returned no representation");
            BookingError::SlotNoLongerAvailable
        })
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let rows: Vec<Appointment> = self
            .store
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or(BookingError::NotFound(appointment_id))
    }

    fn segment_body(
        &self,
        request: &BookGroupRequest,
        segment: &SlotSegment,
        link_sequence: i32,
        linked_appointment_id: Option<Uuid>,
    ) -> Value {
        let machine_id = if segment.is_overlappable {
            None
        } else {
            segment.machine_id
        };
        json!({
            "patient_id": request.patient_id,
            "date": request.date,
            "start_time": segment.start_time.format("%H:%M").to_string(),
            "end_time": segment.end_time.format("%H:%M").to_string(),
            "treatment_id": segment.treatment_id,
            "machine_id": machine_id,
            "provider_id": request.provider_id,
            "status": AppointmentStatus::Scheduled,
            "notes": request.notes,
            "priority": request.priority,
            "linked_appointment_id": linked_appointment_id,
            "link_sequence": link_sequence,
            "updated_at": Utc::now(),
        })
    }

    async fn rollback_created(&self, created: &[Appointment], auth_token: &str) {
        warn!(
            "Group booking failed after {} member(s), rolling back",
            created.len()
        );
        for appointment in created {
            let result: Result<Vec<Value>, StoreError> = self
                .store
                .request_with_headers(
                    Method::DELETE,
                    &format!("/rest/v1/appointments?id=eq.{}", appointment.id),
                    Some(auth_token),
                    None,
                    Some(representation_headers()),
                )
                .await;
            if let Err(e) = result {
                warn!("Rollback of appointment {} failed: {}", appointment.id, e);
            }
        }
    }

    async fn restore_members(&self, applied: &[&Appointment], auth_token: &str) {
        warn!(
            "Group re-timing failed after {} member(s), restoring previous times",
            applied.len()
        );
        for member in applied {
            let body = json!({
                "date": member.date,
                "start_time": member.start_time.format("%H:%M").to_string(),
                "end_time": member.end_time.format("%H:%M").to_string(),
                "notes": member.notes,
                "priority": member.priority,
                "status": member.status,
                "updated_at": Utc::now(),
            });
            if let Err(e) = self.patch_appointment(member.id, body, auth_token).await {
                warn!("Restore of appointment {} failed: {}", member.id, e);
            }
        }
    }
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn validate_segments(segments: &[SlotSegment]) -> Result<(), BookingError> {
    if segments.is_empty() {
        return Err(BookingError::InvalidRequest(
            "group slot has no segments".to_string(),
        ));
    }
    for segment in segments {
        if segment.start_time >= segment.end_time {
            return Err(BookingError::InvalidTimeRange(format!(
                "segment start {} is not before end {}",
                segment.start_time.format("%H:%M"),
                segment.end_time.format("%H:%M"),
            )));
        }
    }
    for pair in segments.windows(2) {
        if pair[0].end_time != pair[1].start_time {
            return Err(BookingError::InvalidTimeRange(format!(
                "segments are not contiguous: {} ends at {} but the next starts at {}",
                pair[0].treatment_id,
                pair[0].end_time.format("%H:%M"),
                pair[1].start_time.format("%H:%M"),
            )));
        }
    }
    Ok(())
}

/// New (id, start, end) triples for a group moved to `new_start`: each
/// member keeps its duration and the members stay back-to-back in their
/// original order. A start late enough that any member would run past
/// midnight is rejected, since an appointment's times live within one date.
pub(crate) fn retime_members(
    members: &[Appointment],
    new_start: NaiveTime,
) -> Result<Vec<(Uuid, NaiveTime, NaiveTime)>, BookingError> {
    let mut cursor = new_start;
    let mut retimed = Vec::with_capacity(members.len());
    for member in members {
        let duration = member.end_time - member.start_time;
        let start = cursor;
        let end = start + duration;
        // NaiveTime arithmetic wraps at midnight; a wrapped end shows up
        // as end <= start.
        if end <= start {
            return Err(BookingError::InvalidTimeRange(format!(
                "re-timed segment starting at {} would cross midnight",
                start.format("%H:%M"),
            )));
        }
        retimed.push((member.id, start, end));
        cursor = end;
    }
    Ok(retimed)
}
