use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{DIAGNOSTIC_TIMEOUT, NativeError, NativeHostClient, NativeRequest, NativeTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticTest {
    pub name: &'static str,
    pub status: TestStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub timestamp: DateTime<Utc>,
    pub host_name: String,
    pub tests: Vec<DiagnosticTest>,
}

impl DiagnosticReport {
    pub fn all_passed(&self) -> bool {
        self.tests.iter().all(|t| t.status == TestStatus::Success)
    }
}

fn record(
    name: &'static str,
    result: Result<Value, NativeError>,
    describe: impl FnOnce(&Value) -> String,
) -> DiagnosticTest {
    match result {
        Ok(data) => DiagnosticTest {
            name,
            status: TestStatus::Success,
            message: describe(&data),
            data: Some(data),
            error: None,
        },
        Err(e) => DiagnosticTest {
            name,
            status: TestStatus::Failed,
            message: e.to_string(),
            data: None,
            error: Some(e.kind()),
        },
    }
}

impl<T: NativeTransport> NativeHostClient<T> {
    /// Runs each check once with the short diagnostic timeout. Never fails as a whole.
    pub async fn run_diagnostics(&self) -> DiagnosticReport {
        let mut tests = Vec::with_capacity(3);

        let ping = self.send_once(&NativeRequest::Ping, DIAGNOSTIC_TIMEOUT).await;
        tests.push(record("ping_test", ping, |_| {
            "Native host responded to ping".to_string()
        }));

        let templates = self
            .send_once(&NativeRequest::ListTemplates, DIAGNOSTIC_TIMEOUT)
            .await;
        tests.push(record("list_templates_test", templates, |data| {
            let count = data
                .get("templates")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            format!("Found {count} templates")
        }));

        let config = self
            .send_once(&NativeRequest::GetConfig, DIAGNOSTIC_TIMEOUT)
            .await;
        tests.push(record("get_config_test", config, |_| {
            "Successfully retrieved configuration".to_string()
        }));

        DiagnosticReport {
            timestamp: Utc::now(),
            host_name: self.status().host_name,
            tests,
        }
    }
}
