//! Wire responses mapped onto the update domain.

use tracing::debug;

use crate::update::{TriggerOutcome, UpdateCheckResult, UpdateInstructions};

use super::api::{TriggerResponse, VersionCheckResponse};

impl From<TriggerResponse> for TriggerOutcome {
    fn from(response: TriggerResponse) -> Self {
        match response.status.as_str() {
            "manual_required" => TriggerOutcome::ManualRequired {
                message: response
                    .message
                    .unwrap_or_else(|| "Manual update required".to_string()),
                command: response.command,
            },
            "no_update" => TriggerOutcome::NoUpdate {
                message: response.message,
            },
            other => {
                if other != "accepted" {
                    debug!(status = other, "Treating trigger status as accepted");
                }
                TriggerOutcome::Accepted {
                    message: response.message,
                }
            }
        }
    }
}

impl From<VersionCheckResponse> for UpdateCheckResult {
    fn from(response: VersionCheckResponse) -> Self {
        let release = response.release_info.unwrap_or_default();
        let latest_version = response
            .latest_version
            .or_else(|| release.version.clone())
            .unwrap_or_else(|| response.current_version.clone());
        Self {
            update_available: response.update_available,
            current_version: response.current_version,
            latest_version,
            release_notes: release.body.filter(|body| !body.trim().is_empty()),
            release_name: release.name.filter(|name| !name.trim().is_empty()),
            release_url: release.html_url,
            published_at: release.published_at,
            message: response.message,
            instructions: response.update_instructions.map(UpdateInstructions::new),
        }
    }
}
