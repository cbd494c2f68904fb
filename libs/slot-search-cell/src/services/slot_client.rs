use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use shared_config::AppConfig;

use crate::models::{MultiSegmentSlot, SimpleSlot, SlotSearchError, Treatment};

/// Client for the external slot-computation capability. The geometric
/// free-window algorithm lives entirely on the other side of this boundary;
/// we only ask for slots and trust the answer.
pub struct SlotServiceClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl SlotServiceClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.slot_service_url.clone(),
            timeout: Duration::from_secs(config.slot_fetch_timeout_secs),
        }
    }

    /// Slots able to hold a single treatment on `date`. An empty list means
    /// no slots exist, not an error.
    pub async fn get_slots(
        &self,
        date: NaiveDate,
        treatment: &Treatment,
        allow_after_hours: bool,
    ) -> Result<Vec<SimpleSlot>, SlotSearchError> {
        let url = format!("{}/slots", self.base_url);
        debug!(
            "Fetching slots for treatment {} on {}",
            treatment.treatment_id, date
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("date", date.to_string()),
                ("treatment_id", treatment.treatment_id.to_string()),
                ("duration", treatment.duration_minutes.to_string()),
                ("allow_after_hours", allow_after_hours.to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SlotSearchError::SlotService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SlotSearchError::SlotService(format!(
                "slot query for {} failed ({}): {}",
                date, status, text
            )));
        }

        response
            .json::<Vec<SimpleSlot>>()
            .await
            .map_err(|e| SlotSearchError::SlotService(e.to_string()))
    }

    /// Contiguous multi-segment slots covering every requested treatment in
    /// order, for one day.
    pub async fn get_multi_treatment_slots(
        &self,
        date: NaiveDate,
        treatments: &[Treatment],
        allow_after_hours: bool,
    ) -> Result<Vec<MultiSegmentSlot>, SlotSearchError> {
        let url = format!("{}/slots/multi", self.base_url);
        debug!(
            "Fetching multi-treatment slots for {} treatments on {}",
            treatments.len(),
            date
        );

        let body = json!({
            "date": date,
            "treatments": treatments
                .iter()
                .map(|t| json!({
                    "treatment_id": t.treatment_id,
                    "duration": t.duration_minutes,
                }))
                .collect::<Vec<_>>(),
            "allow_after_hours": allow_after_hours,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SlotSearchError::SlotService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SlotSearchError::SlotService(format!(
                "multi-slot query for {} failed ({}): {}",
                date, status, text
            )));
        }

        response
            .json::<Vec<MultiSegmentSlot>>()
            .await
            .map_err(|e| SlotSearchError::SlotService(e.to_string()))
    }
}
