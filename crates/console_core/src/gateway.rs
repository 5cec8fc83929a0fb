//! Request/response layer over the engine's REST API.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::ActionBinding,
    error::{EngineErrorBody, EngineRejection},
    protocol::{ActionUpdateRequest, EngineStatus, GestureListResponse, RecordRequest},
};
use url::Url;

/// Command surface of the remote engine. The trait is the seam workflow
/// logic is tested against; [`EngineGateway`] is the HTTP implementation.
#[async_trait]
pub trait EngineApi: Send + Sync {
    async fn health(&self) -> Result<EngineStatus>;
    async fn list_gestures(&self) -> Result<Vec<String>>;
    async fn list_actions(&self) -> Result<HashMap<String, ActionBinding>>;
    async fn upsert_action(&self, request: &ActionUpdateRequest) -> Result<()>;
    async fn start_recording(&self, request: &RecordRequest) -> Result<()>;
    async fn delete_gesture(&self, label: &str) -> Result<()>;
    async fn trigger_training(&self) -> Result<()>;
}

/// Whole-collection snapshot of the engine's gesture and binding state.
/// Always replaced as a unit after a successful mutation, never merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub gestures: Vec<String>,
    pub actions: HashMap<String, ActionBinding>,
}

pub struct EngineGateway {
    http: Client,
    api_base_url: String,
}

impl EngineGateway {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            api_base_url,
        }
    }

    fn gesture_url(&self, label: &str) -> Result<String> {
        let mut url = Url::parse(&self.api_base_url)
            .with_context(|| format!("invalid engine api url: {}", self.api_base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("engine api url cannot be a base: {}", self.api_base_url))?
            .push("gestures")
            .push(label);
        Ok(url.to_string())
    }
}

/// Turns a non-success response into an [`EngineRejection`], preferring the
/// engine's `detail` body over the bare status line.
async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = match response.json::<EngineErrorBody>().await {
        Ok(body) => body.detail,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request rejected")
            .to_string(),
    };
    Err(EngineRejection::new(status.as_u16(), detail).into())
}

#[async_trait]
impl EngineApi for EngineGateway {
    async fn health(&self) -> Result<EngineStatus> {
        let response = self
            .http
            .get(format!("{}/", self.api_base_url))
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    async fn list_gestures(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/gestures", self.api_base_url))
            .send()
            .await?;
        let body: GestureListResponse = checked(response).await?.json().await?;
        Ok(body.gestures)
    }

    async fn list_actions(&self) -> Result<HashMap<String, ActionBinding>> {
        let response = self
            .http
            .get(format!("{}/actions", self.api_base_url))
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    async fn upsert_action(&self, request: &ActionUpdateRequest) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/actions", self.api_base_url))
            .json(request)
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }

    async fn start_recording(&self, request: &RecordRequest) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/gestures/record", self.api_base_url))
            .json(request)
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }

    async fn delete_gesture(&self, label: &str) -> Result<()> {
        let response = self.http.delete(self.gesture_url(label)?).send().await?;
        checked(response).await?;
        Ok(())
    }

    async fn trigger_training(&self) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/train", self.api_base_url))
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }
}

/// Reads both collections for the read-through cache.
pub async fn fetch_catalog(engine: &dyn EngineApi) -> Result<Catalog> {
    let gestures = engine.list_gestures().await?;
    let actions = engine.list_actions().await?;
    Ok(Catalog { gestures, actions })
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
