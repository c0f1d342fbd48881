use async_trait::async_trait;

use crate::types::UpdateError;

use super::types::{TriggerOutcome, UpdateCheckResult, UpdateInstructions, UpdateProgress};

/// Backend endpoints the orchestrator depends on.
///
/// Implementations should not retry; the orchestrator owns timeouts and retry
/// policy.
#[async_trait]
pub trait UpdateApi: Send + Sync + 'static {
    async fn check_version(&self) -> Result<UpdateCheckResult, UpdateError>;

    async fn trigger_update(&self) -> Result<TriggerOutcome, UpdateError>;

    async fn fetch_progress(&self) -> Result<UpdateProgress, UpdateError>;

    async fn clear_progress(&self) -> Result<(), UpdateError>;

    async fn health(&self) -> Result<(), UpdateError>;

    async fn fetch_instructions(&self) -> Result<UpdateInstructions, UpdateError>;
}
