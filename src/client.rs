//! Reqwest-backed client for the background service's HTTP surface.
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::config::{Settings, SiteConfig};
use crate::messages::{RuntimeMessage, RuntimeResponse, ScanHistoryEntry};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("background service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response shape")]
    Unexpected,
}

pub struct BackgroundClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackgroundClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    pub async fn send(&self, message: &RuntimeMessage) -> Result<RuntimeResponse, ClientError> {
        debug!(?message, "posting runtime message");
        let resp = self
            .client
            .post(self.url("/message"))
            .json(message)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn history(&self) -> Result<Vec<ScanHistoryEntry>, ClientError> {
        match self.send(&RuntimeMessage::GetScanHistory).await? {
            RuntimeResponse::History { history } => Ok(history),
            RuntimeResponse::Ack { .. } => Err(ClientError::Unexpected),
        }
    }

    pub async fn clear_history(&self) -> Result<(), ClientError> {
        self.send(&RuntimeMessage::ClearScanHistory).await?;
        Ok(())
    }

    pub async fn settings(&self) -> Result<Settings, ClientError> {
        let resp = self.client.get(self.url("/settings")).send().await?;
        Self::decode(resp).await
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<(), ClientError> {
        let resp = self
            .client
            .put(self.url("/settings"))
            .json(settings)
            .send()
            .await?;
        let _: RuntimeResponse = Self::decode(resp).await?;
        Ok(())
    }

    pub async fn site_config(&self, url: &str) -> Result<Option<SiteConfig>, ClientError> {
        let resp = self
            .client
            .get(self.url("/site-config"))
            .query(&[("url", url)])
            .send()
            .await?;
        Self::decode(resp).await
    }
}
