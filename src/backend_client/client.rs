use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;
use crate::types::UpdateError;
use crate::update::{
    ProgressRecord, TriggerOutcome, UpdateApi, UpdateCheckResult, UpdateInstructions,
    UpdateProgress,
};

use super::api::{InstructionsResponse, TriggerResponse, VersionCheckResponse};
use super::helpers::{join_url, DEFAULT_USER_AGENT};

const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP client for the centralino backend's update endpoints.
///
/// No overall request timeout is configured here: the orchestrator bounds
/// every call except start-update, whose duration is up to the backend.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpdateError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, UpdateError> {
        Self::new(config.api_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, UpdateError>
    where
        T: DeserializeOwned,
    {
        let url = join_url(&self.base_url, path);
        let response = self.http.get(url).send().await?;

        if !response.status().is_success() {
            return Err(UpdateError::Backend(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }

        Ok(response.json::<T>().await?)
    }

    async fn post(&self, path: &str) -> Result<reqwest::Response, UpdateError> {
        let url = join_url(&self.base_url, path);
        let response = self.http.post(url).send().await?;

        if !response.status().is_success() {
            return Err(UpdateError::Backend(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl UpdateApi for BackendClient {
    async fn check_version(&self) -> Result<UpdateCheckResult, UpdateError> {
        let response: VersionCheckResponse = self.get_json("/version/check").await?;
        Ok(response.into())
    }

    async fn trigger_update(&self) -> Result<TriggerOutcome, UpdateError> {
        let response = self.post("/deploy/trigger").await?;
        let body: TriggerResponse = response.json().await?;
        debug!(status = %body.status, "Deploy trigger answered");
        Ok(body.into())
    }

    async fn fetch_progress(&self) -> Result<UpdateProgress, UpdateError> {
        let record: ProgressRecord = self.get_json("/update/progress").await?;
        UpdateProgress::from_record(record)
    }

    async fn clear_progress(&self) -> Result<(), UpdateError> {
        self.post("/update/clear").await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), UpdateError> {
        let url = join_url(&self.base_url, "/health");
        self.http.get(url).send().await?.error_for_status()?;
        Ok(())
    }

    async fn fetch_instructions(&self) -> Result<UpdateInstructions, UpdateError> {
        let response: InstructionsResponse = self.get_json("/update/instructions").await?;
        if let Some(note) = response.note.as_deref() {
            debug!(note, "Backend update note");
        }
        Ok(UpdateInstructions::new(response.instructions))
    }
}
