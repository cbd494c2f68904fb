use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::StoreClient;

use crate::models::{Machine, Provider, ResourceDirectory, SlotSearchError};

/// Serves the machine/provider filter options. Inactive resources never
/// appear: they are excluded here and therefore never reach the filters.
pub struct ResourceDirectoryService {
    store: Arc<StoreClient>,
}

impl ResourceDirectoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub async fn get_resources(
        &self,
        auth_token: &str,
    ) -> Result<ResourceDirectory, SlotSearchError> {
        debug!("Fetching active machines and providers");

        let machine_rows: Vec<Value> = self
            .store
            .request(
                Method::GET,
                "/rest/v1/machines?is_active=eq.true&order=name.asc",
                Some(auth_token),
                None,
            )
            .await?;

        let machines: Vec<Machine> = machine_rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| SlotSearchError::AvailabilityCheck(format!("machine rows: {}", e)))?;

        let provider_rows: Vec<Value> = self
            .store
            .request(
                Method::GET,
                "/rest/v1/providers?is_active=eq.true&order=full_name.asc",
                Some(auth_token),
                None,
            )
            .await?;

        let providers: Vec<Provider> = provider_rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| SlotSearchError::AvailabilityCheck(format!("provider rows: {}", e)))?;

        Ok(ResourceDirectory {
            machines,
            providers,
        })
    }
}
