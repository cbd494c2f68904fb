pub mod escalation;
pub mod orchestrator;
pub mod resources;
pub mod slot_client;

pub use escalation::AfterHoursEscalationController;
pub use orchestrator::SlotSearchOrchestrator;
pub use resources::ResourceDirectoryService;
pub use slot_client::SlotServiceClient;
