use tracing::{debug, info};

use shared_config::AppConfig;

use crate::models::{
    EscalationOutcome, SearchPhase, SlotSearchError, SlotSearchRequest,
};
use crate::services::orchestrator::SlotSearchOrchestrator;

/// Two-phase search policy around the orchestrator: clinic hours first, one
/// after-hours pass as the explicit fallback. There is exactly one
/// escalation level; a relaxed search that comes back empty is terminal.
pub struct AfterHoursEscalationController {
    orchestrator: SlotSearchOrchestrator,
}

impl AfterHoursEscalationController {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            orchestrator: SlotSearchOrchestrator::new(config),
        }
    }

    pub fn with_orchestrator(orchestrator: SlotSearchOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &SlotSearchOrchestrator {
        &self.orchestrator
    }

    /// `relax_requested` is the user's explicit "search after hours" choice:
    /// it skips the strict phase entirely. Otherwise the strict search runs
    /// first and an empty result triggers a single relaxed re-search whose
    /// outcome is tagged so the caller can present it as an escalation
    /// rather than silently widening the search.
    pub async fn search_with_escalation(
        &self,
        request: &SlotSearchRequest,
        relax_requested: bool,
        auth_token: &str,
    ) -> Result<EscalationOutcome, SlotSearchError> {
        if relax_requested {
            debug!("After-hours search explicitly requested, skipping strict phase");
            let outcome = self
                .orchestrator
                .search(&relaxed(request), auth_token)
                .await?;
            return Ok(EscalationOutcome {
                days: outcome.days,
                failed_days: outcome.failed_days,
                phase: SearchPhase::Relaxed,
                escalated_from_empty: false,
            });
        }

        let strict = self.orchestrator.search(&strict_only(request), auth_token).await?;
        if !strict.is_empty() {
            return Ok(EscalationOutcome {
                days: strict.days,
                failed_days: strict.failed_days,
                phase: SearchPhase::Strict,
                escalated_from_empty: false,
            });
        }

        info!("Strict search empty, escalating once to after-hours slots");
        let relaxed_outcome = self
            .orchestrator
            .search(&relaxed(request), auth_token)
            .await?;

        Ok(EscalationOutcome {
            days: relaxed_outcome.days,
            failed_days: relaxed_outcome.failed_days,
            phase: SearchPhase::Relaxed,
            escalated_from_empty: true,
        })
    }
}

fn strict_only(request: &SlotSearchRequest) -> SlotSearchRequest {
    SlotSearchRequest {
        allow_after_hours: false,
        ..request.clone()
    }
}

fn relaxed(request: &SlotSearchRequest) -> SlotSearchRequest {
    SlotSearchRequest {
        allow_after_hours: true,
        ..request.clone()
    }
}
