use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_url: String,
    pub store_anon_key: String,
    pub slot_service_url: String,
    pub slot_fetch_timeout_secs: u64,
    pub availability_check_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            store_url: env::var("CLINIC_STORE_URL")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_STORE_URL not set, using empty value");
                    String::new()
                }),
            store_anon_key: env::var("CLINIC_STORE_ANON_KEY")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_STORE_ANON_KEY not set, using empty value");
                    String::new()
                }),
            slot_service_url: env::var("SLOT_SERVICE_URL")
                .unwrap_or_else(|_| {
                    warn!("SLOT_SERVICE_URL not set, using empty value");
                    String::new()
                }),
            slot_fetch_timeout_secs: env::var("SLOT_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            availability_check_timeout_secs: env::var("AVAILABILITY_CHECK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.store_url.is_empty()
            && !self.store_anon_key.is_empty()
            && !self.slot_service_url.is_empty()
    }
}
