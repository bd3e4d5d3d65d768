//! Client for the word-template native host.
//!
//! Every exchange is bounded by a timeout. Idempotent reads are retried with a linear
//! backoff; anything that changes host state is sent once. Responses of the form
//! `{"success": false, "error": ..}` surface as [`NativeError::Rejected`].
pub mod diagnostics;
pub mod transport;

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use diagnostics::{DiagnosticReport, DiagnosticTest, TestStatus};
pub use transport::{NativeTransport, ProcessTransport};

pub const HOST_NAME: &str = "com.wordtemplateextension.nativehost";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(5);
/// Extra attempts after the first for idempotent reads.
pub const READ_RETRIES: u32 = 2;
const BACKOFF_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateUpdate {
    pub template: String,
    #[serde(rename = "extractedData")]
    pub extracted_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NativeRequest {
    Ping,
    ListTemplates,
    UpdateTemplate { data: TemplateUpdate },
    GetConfig,
    UpdateConfig { config: Value },
    OpenTemplateFolder,
    RefreshTemplates,
}

impl NativeRequest {
    pub fn action(&self) -> &'static str {
        match self {
            NativeRequest::Ping => "ping",
            NativeRequest::ListTemplates => "list_templates",
            NativeRequest::UpdateTemplate { .. } => "update_template",
            NativeRequest::GetConfig => "get_config",
            NativeRequest::UpdateConfig { .. } => "update_config",
            NativeRequest::OpenTemplateFolder => "open_template_folder",
            NativeRequest::RefreshTemplates => "refresh_templates",
        }
    }

    pub fn is_idempotent_read(&self) -> bool {
        matches!(
            self,
            NativeRequest::Ping | NativeRequest::ListTemplates | NativeRequest::GetConfig
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("native messaging timeout after {0}ms")]
    Timeout(u64),
    #[error("native host communication failed: {0}")]
    Communication(String),
    #[error("native host rejected request: {0}")]
    Rejected(String),
}

impl NativeError {
    pub fn kind(&self) -> &'static str {
        match self {
            NativeError::Timeout(_) => "timeout",
            NativeError::Communication(_) => "communication",
            NativeError::Rejected(_) => "rejected",
        }
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, NativeError::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub last_error: Option<String>,
    pub host_name: String,
}

pub struct NativeHostClient<T> {
    transport: T,
    timeout: Duration,
    status: Mutex<ConnectionStatus>,
}

impl<T: NativeTransport> NativeHostClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            status: Mutex::new(ConnectionStatus {
                connected: false,
                last_error: None,
                host_name: HOST_NAME.to_string(),
            }),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn status_guard(&self) -> MutexGuard<'_, ConnectionStatus> {
        match self.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_guard().clone()
    }

    /// A single exchange bounded by `timeout`. Updates the connection status.
    pub async fn send_once(
        &self,
        request: &NativeRequest,
        timeout: Duration,
    ) -> Result<Value, NativeError> {
        debug!(action = request.action(), "sending to native host");
        let result = match tokio::time::timeout(timeout, self.transport.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(NativeError::Timeout(timeout.as_millis() as u64)),
        };

        let mut status = self.status_guard();
        match result {
            Ok(response) => {
                status.connected = true;
                status.last_error = None;
                drop(status);
                check_response(response)
            }
            Err(e) => {
                status.connected = false;
                status.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Sends with the retry policy of the request's action.
    pub async fn send(&self, request: &NativeRequest) -> Result<Value, NativeError> {
        let retries = if request.is_idempotent_read() {
            READ_RETRIES
        } else {
            0
        };

        let mut attempt = 1;
        loop {
            match self.send_once(request, self.timeout).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt <= retries => {
                    warn!(action = request.action(), attempt, error = %e, "native attempt failed");
                    tokio::time::sleep(BACKOFF_STEP * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pings the host and records whether it answered.
    pub async fn test_connection(&self) -> bool {
        match self.send_once(&NativeRequest::Ping, self.timeout).await {
            Ok(_) => {
                info!("native host connection test succeeded");
                true
            }
            Err(e) => {
                warn!(error = %e, "native host connection test failed");
                false
            }
        }
    }

    pub async fn ping(&self) -> Result<Value, NativeError> {
        self.send(&NativeRequest::Ping).await
    }

    pub async fn list_templates(&self) -> Result<Value, NativeError> {
        self.send(&NativeRequest::ListTemplates).await
    }

    pub async fn get_config(&self) -> Result<Value, NativeError> {
        self.send(&NativeRequest::GetConfig).await
    }

    pub async fn update_config(&self, config: Value) -> Result<Value, NativeError> {
        self.send(&NativeRequest::UpdateConfig { config }).await
    }

    pub async fn update_template(
        &self,
        template: &str,
        extracted_data: Value,
    ) -> Result<Value, NativeError> {
        let data = TemplateUpdate {
            template: template.to_string(),
            extracted_data,
        };
        self.send(&NativeRequest::UpdateTemplate { data }).await
    }

    pub async fn open_template_folder(&self) -> Result<Value, NativeError> {
        self.send(&NativeRequest::OpenTemplateFolder).await
    }

    pub async fn refresh_templates(&self) -> Result<Value, NativeError> {
        self.send(&NativeRequest::RefreshTemplates).await
    }
}

fn check_response(response: Value) -> Result<Value, NativeError> {
    if response.get("success").and_then(Value::as_bool) == Some(false) {
        let error = response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(NativeError::Rejected(error));
    }
    Ok(response)
}

#[cfg(test)]
#[path = "native_tests.rs"]
mod tests;
