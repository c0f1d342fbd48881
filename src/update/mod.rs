mod api;
mod orchestrator;
mod state;
mod types;

pub use api::UpdateApi;
pub use orchestrator::{OrchestratorSettings, UpdateOrchestrator};
pub use state::{Phase, UpdateEvent, UpdateSnapshot};
pub use types::{
    PlatformInstructions, ProgressKind, ProgressRecord, ProgressStatus, TriggerOutcome,
    UpdateCheckResult, UpdateInstructions, UpdateProgress, VersionChange,
};
