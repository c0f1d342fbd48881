//! Domain records shared by the orchestrator, the backend client and consumers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UpdateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl ProgressStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    #[default]
    Progress,
    Info,
    Error,
}

impl ProgressKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "progress" => Some(Self::Progress),
            "info" => Some(Self::Info),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Progress record as persisted by the backend and as pushed over the
/// progress channel. Push frames may omit `status` and carry `type`/`step`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProgressRecord {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Snapshot of an in-flight or finished update operation.
///
/// Records are applied last-write-wins by time of receipt; `received_at`
/// is stamped locally, the backend provides no sequence number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateProgress {
    pub status: ProgressStatus,
    pub kind: ProgressKind,
    pub message: String,
    pub percentage: Option<f64>,
    pub command: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl UpdateProgress {
    pub fn new(status: ProgressStatus, kind: ProgressKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            percentage: None,
            command: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_percentage(mut self, percentage: f64) -> Self {
        self.percentage = clamp_percentage(Some(percentage));
        self
    }

    pub fn with_command(mut self, command: Option<String>) -> Self {
        self.command = command;
        self
    }

    /// Synthetic record shown as soon as the user starts an update.
    pub fn starting() -> Self {
        Self::new(ProgressStatus::Running, ProgressKind::Progress, "Starting update...")
            .with_percentage(0.0)
    }

    /// Normalize a wire record.
    ///
    /// A `type: "error"` discriminator overrides `status`, `step: "completed"`
    /// counts as completion and a missing status means the operation is
    /// still running. An unrecognised `status` string is rejected.
    pub fn from_record(record: ProgressRecord) -> Result<Self, UpdateError> {
        let kind_hint = record.kind.as_deref().and_then(ProgressKind::parse);
        let step_completed = record
            .step
            .as_deref()
            .map(|step| step.eq_ignore_ascii_case("completed"))
            .unwrap_or(false);

        let status = if kind_hint == Some(ProgressKind::Error) {
            ProgressStatus::Error
        } else if step_completed {
            ProgressStatus::Completed
        } else {
            match record.status.as_deref() {
                Some(raw) => ProgressStatus::parse(raw).ok_or_else(|| {
                    UpdateError::Backend(format!("unknown progress status `{raw}`"))
                })?,
                None => ProgressStatus::Running,
            }
        };

        let kind = match (kind_hint, status) {
            (_, ProgressStatus::Error) => ProgressKind::Error,
            (Some(kind), _) => kind,
            (None, _) => ProgressKind::Progress,
        };

        Ok(Self {
            status,
            kind,
            message: record.message.unwrap_or_default(),
            percentage: clamp_percentage(record.percentage),
            command: record.command,
            received_at: Utc::now(),
        })
    }

    /// Parse a push-channel text frame.
    pub fn from_frame(frame: &str) -> Result<Self, UpdateError> {
        let record: ProgressRecord = serde_json::from_str(frame)?;
        Self::from_record(record)
    }
}

fn clamp_percentage(value: Option<f64>) -> Option<f64> {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 100.0))
}

/// How the backend answered a start-update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Accepted { message: Option<String> },
    ManualRequired { message: String, command: Option<String> },
    NoUpdate { message: Option<String> },
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PlatformInstructions {
    pub command: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Manual update procedure keyed by platform (`windows`, `linux`, `mac`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateInstructions {
    pub platforms: BTreeMap<String, PlatformInstructions>,
}

impl UpdateInstructions {
    pub fn new(platforms: BTreeMap<String, PlatformInstructions>) -> Self {
        Self { platforms }
    }

    /// Instructions matching the host OS, falling back to linux.
    pub fn for_current_platform(&self) -> Option<&PlatformInstructions> {
        let key = match std::env::consts::OS {
            "windows" => "windows",
            "macos" => "mac",
            _ => "linux",
        };
        self.platforms
            .get(key)
            .or_else(|| self.platforms.get("linux"))
    }
}

/// Result of asking the backend whether a newer version exists.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCheckResult {
    pub update_available: bool,
    pub current_version: String,
    pub latest_version: String,
    pub release_notes: Option<String>,
    pub release_name: Option<String>,
    pub release_url: Option<String>,
    pub published_at: Option<String>,
    pub message: Option<String>,
    pub instructions: Option<UpdateInstructions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionChange {
    Major,
    Minor,
    Patch,
    /// Versions differ but are not comparable as semver, or go backwards.
    Other,
}

impl UpdateCheckResult {
    /// Classify the gap between the running and the offered version.
    pub fn version_change(&self) -> Option<VersionChange> {
        if self.current_version == self.latest_version {
            return None;
        }
        let (Some(current), Some(latest)) = (
            parse_version(&self.current_version),
            parse_version(&self.latest_version),
        ) else {
            return Some(VersionChange::Other);
        };
        if latest <= current {
            Some(VersionChange::Other)
        } else if latest.major != current.major {
            Some(VersionChange::Major)
        } else if latest.minor != current.minor {
            Some(VersionChange::Minor)
        } else {
            Some(VersionChange::Patch)
        }
    }
}

fn parse_version(raw: &str) -> Option<semver::Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    semver::Version::parse(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_overrides_status() {
        let progress =
            UpdateProgress::from_frame(r#"{"type":"error","status":"running","message":"boom"}"#)
                .unwrap();
        assert_eq!(progress.status, ProgressStatus::Error);
        assert_eq!(progress.kind, ProgressKind::Error);
        assert_eq!(progress.message, "boom");
    }

    #[test]
    fn completed_step_counts_as_completion() {
        let progress =
            UpdateProgress::from_frame(r#"{"type":"progress","step":"completed","percentage":100}"#)
                .unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);
        assert_eq!(progress.kind, ProgressKind::Progress);
    }

    #[test]
    fn frame_without_status_is_running() {
        let progress =
            UpdateProgress::from_frame(r#"{"message":"pulling images","percentage":140}"#).unwrap();
        assert_eq!(progress.status, ProgressStatus::Running);
        assert_eq!(progress.percentage, Some(100.0));
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(UpdateProgress::from_frame("not json").is_err());
        assert!(UpdateProgress::from_frame("[1,2,3]").is_err());
        assert!(UpdateProgress::from_frame(r#"{"status":"exploding"}"#).is_err());
    }

    #[test]
    fn non_semver_versions_are_other() {
        let result = UpdateCheckResult {
            update_available: true,
            current_version: "nightly".to_string(),
            latest_version: "v2.0.0".to_string(),
            release_notes: None,
            release_name: None,
            release_url: None,
            published_at: None,
            message: None,
            instructions: None,
        };
        assert_eq!(result.version_change(), Some(VersionChange::Other));
    }
}
