use serde::Deserialize;
use std::collections::BTreeMap;

use crate::update::PlatformInstructions;

/// Body of `GET /version/check`.
#[derive(Debug, Deserialize, Clone)]
pub struct VersionCheckResponse {
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub release_info: Option<ReleaseInfo>,
    #[serde(default)]
    pub update_instructions: Option<BTreeMap<String, PlatformInstructions>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Body of `POST /deploy/trigger`.
#[derive(Debug, Deserialize, Clone)]
pub struct TriggerResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Body of `GET /update/instructions`.
#[derive(Debug, Deserialize, Clone)]
pub struct InstructionsResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub instructions: BTreeMap<String, PlatformInstructions>,
    #[serde(default)]
    pub note: Option<String>,
}
