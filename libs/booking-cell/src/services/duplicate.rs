use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_calendar::{next_workday, workdays_from};
use shared_config::AppConfig;
use shared_database::StoreClient;
use slot_search_cell::models::{
    EscalationOutcome, SlotCandidate, SlotFilters, SlotSearchRequest, Treatment,
};
use slot_search_cell::services::AfterHoursEscalationController;

use crate::models::{
    Appointment, AppointmentSignature, BookGroupRequest, BookSlotRequest, BookingError,
    RebookRequest,
};
use crate::services::booking::BookingCoordinator;

pub const DEFAULT_REBOOK_WINDOW_DAYS: usize = 7;

#[derive(Debug, Deserialize)]
struct TreatmentRow {
    id: Uuid,
    title: String,
}

#[derive(Debug, Deserialize)]
struct PatientRow {
    full_name: String,
}

/// Turns an existing appointment (or any member of a linked group) into a
/// reusable signature, finds equivalent future slots through the regular
/// search pipeline, and books the chosen candidate through the regular
/// booking path.
pub struct DuplicationAdapter {
    store: Arc<StoreClient>,
    controller: AfterHoursEscalationController,
    coordinator: BookingCoordinator,
}

impl DuplicationAdapter {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
            controller: AfterHoursEscalationController::new(config),
            coordinator: BookingCoordinator::new(config),
        }
    }

    /// Builds the signature from any member of the appointment's group:
    /// the full ordered treatment sequence with per-member durations, the
    /// patient, and the provider if one was assigned. Members without a
    /// treatment (administrative blocks) are skipped.
    pub async fn extract_signature(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentSignature, BookingError> {
        let appointment = self
            .coordinator
            .get_appointment(appointment_id, auth_token)
            .await?;

        let members = match appointment.linked_appointment_id {
            Some(group_id) => self.coordinator.get_group(group_id, auth_token).await?,
            None => vec![appointment.clone()],
        };

        let treatment_ids: Vec<Uuid> = members.iter().filter_map(|m| m.treatment_id).collect();
        let titles = self.fetch_treatment_titles(&treatment_ids, auth_token).await?;

        let treatments: Vec<Treatment> = members
            .iter()
            .filter_map(|m| {
                m.treatment_id.map(|treatment_id| Treatment {
                    treatment_id,
                    duration_minutes: m.duration_minutes() as i32,
                    title: titles.get(&treatment_id).cloned().unwrap_or_default(),
                })
            })
            .collect();

        let patient_name = self
            .fetch_patient_name(appointment.patient_id, auth_token)
            .await?;

        Ok(AppointmentSignature {
            treatments,
            patient_id: appointment.patient_id,
            patient_name,
            provider_id: members.iter().find_map(|m| m.provider_id),
        })
    }

    /// Searches the next `days` workdays, starting strictly after today,
    /// for slots matching the signature. The signature's provider carries
    /// over as a search filter so the rebooked appointment stays with the
    /// same provider.
    pub async fn find_rebooking_slots(
        &self,
        signature: &AppointmentSignature,
        days: usize,
        after_hours_requested: bool,
        auth_token: &str,
    ) -> Result<EscalationOutcome, BookingError> {
        if signature.treatments.is_empty() {
            return Err(BookingError::InvalidRequest(
                "appointment has no treatments to rebook".to_string(),
            ));
        }

        let start = next_workday(Utc::now().date_naive());
        let window = workdays_from(start, days);
        debug!(
            "Rebooking search for patient {}: {} treatment(s) over {:?}..{:?}",
            signature.patient_id,
            signature.treatments.len(),
            window.first(),
            window.last()
        );

        let request = SlotSearchRequest {
            treatments: signature.treatments.clone(),
            window,
            filters: SlotFilters {
                machine_id: None,
                provider_id: signature.provider_id,
            },
            allow_after_hours: false,
        };

        Ok(self
            .controller
            .search_with_escalation(&request, after_hours_requested, auth_token)
            .await?)
    }

    /// Books the chosen candidate for the signature's patient. Simple
    /// candidates go through single-slot booking, multi-segment candidates
    /// through linked-group booking, with all the usual preconditions.
    pub async fn rebook(
        &self,
        signature: &AppointmentSignature,
        request: &RebookRequest,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        match &request.slot {
            SlotCandidate::Simple(slot) => {
                let treatment = signature.treatments.first().ok_or_else(|| {
                    BookingError::InvalidRequest(
                        "appointment has no treatments to rebook".to_string(),
                    )
                })?;
                let booked = self
                    .coordinator
                    .book(
                        &BookSlotRequest {
                            patient_id: signature.patient_id,
                            date: request.date,
                            slot: slot.clone(),
                            treatment_id: treatment.treatment_id,
                            provider_id: signature.provider_id,
                            notes: request.notes.clone(),
                            priority: None,
                        },
                        auth_token,
                    )
                    .await?;
                Ok(vec![booked])
            }
            SlotCandidate::Multi(slot) => {
                self.coordinator
                    .book_group(
                        &BookGroupRequest {
                            patient_id: signature.patient_id,
                            date: request.date,
                            slot: slot.clone(),
                            provider_id: signature.provider_id,
                            notes: request.notes.clone(),
                            priority: None,
                        },
                        auth_token,
                    )
                    .await
            }
        }
    }

    async fn fetch_treatment_titles(
        &self,
        treatment_ids: &[Uuid],
        auth_token: &str,
    ) -> Result<HashMap<Uuid, String>, BookingError> {
        if treatment_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = treatment_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let rows: Vec<TreatmentRow> = self
            .store
            .request(
                Method::GET,
                &format!("/rest/v1/treatments?id=in.({})&select=id,title", ids),
                Some(auth_token),
                None,
            )
            .await
            .map_err(BookingError::Store)?;
        Ok(rows.into_iter().map(|r| (r.id, r.title)).collect())
    }

    async fn fetch_patient_name(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<String, BookingError> {
        let rows: Vec<PatientRow> = self
            .store
            .request(
                Method::GET,
                &format!("/rest/v1/patients?id=eq.{}&select=full_name", patient_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(BookingError::Store)?;
        Ok(rows.into_iter().next().map(|r| r.full_name).unwrap_or_else(|| {
            warn!("Patient {} has no profile row", patient_id);
            String::new()
        }))
    }
}
