//! Drives a content controller over an in-memory page from a JSON script, for reproducing
//! field sequences and API outcomes without a browser.
//!
//! Elements listed in the script get ids `1..=n` in order. Step times are milliseconds from
//! the start of the replay and must not decrease.
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::clock::{Clock, ManualClock};
use crate::config::Settings;
use crate::content::interceptor::{Fetch, FetchError, FetchRequest, FetchResponse, ObservedFetch};
use crate::content::overlay::TraceAudio;
use crate::content::page::{
    DomEvent, DomEventKind, ElementId, MemoryCatalog, MemoryElement, MemoryPage, Page, PageEvent,
};
use crate::content::{ContentController, SharedController};
use crate::history::SessionHistory;
use crate::messages::{PageSignal, RuntimeMessage, ScanHistoryEntry};

const DEFAULT_START_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("script: {0}")]
    Json(#[from] serde_json::Error),
    #[error("step {index} at {at}ms is earlier than the previous step")]
    OutOfOrder { index: usize, at: i64 },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayScript {
    pub url: String,
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub elements: Vec<MemoryElement>,
    #[serde(default)]
    pub catalog: Option<MemoryCatalog>,
    #[serde(default)]
    pub start_ms: Option<i64>,
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayStep {
    #[serde(default)]
    pub at: i64,
    #[serde(flatten)]
    pub action: ReplayAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum ReplayAction {
    /// Scanner-style entry: the whole value lands, then one input event.
    Type { target: ElementId, value: String },
    Key { target: ElementId, key: String },
    Page { event: PageEvent },
    AddElement { element: MemoryElement },
    Fetch {
        url: String,
        #[serde(default)]
        status: Option<u16>,
        #[serde(default)]
        error: Option<String>,
    },
    Settings { settings: Settings },
    /// Only moves the clock.
    Wait,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedSignal {
    pub at: i64,
    pub signal: PageSignal,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub site: Option<String>,
    pub signals: Vec<TimedSignal>,
    pub logged: Vec<RuntimeMessage>,
    pub history: Vec<ScanHistoryEntry>,
    pub fetch_results: Vec<Result<u16, String>>,
    pub scan_history: Vec<String>,
}

/// Inner fetch that answers with the step's canned outcome.
struct CannedFetch {
    status: Option<u16>,
    error: Option<String>,
}

#[async_trait]
impl Fetch for CannedFetch {
    async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse, FetchError> {
        if let Some(error) = &self.error {
            return Err(FetchError::Network(error.clone()));
        }
        Ok(FetchResponse {
            status: self.status.unwrap_or(200),
            body: String::new(),
        })
    }
}

pub fn load_script(path: &Path) -> Result<ReplayScript, ReplayError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

struct Recorder {
    start: i64,
    clock: Arc<ManualClock>,
    signals: broadcast::Receiver<PageSignal>,
    logged: mpsc::UnboundedReceiver<RuntimeMessage>,
    history: SessionHistory,
    report: ReplayReport,
}

impl Recorder {
    fn drain(&mut self) {
        let at = self.clock.now_epoch_ms() - self.start;
        while let Ok(signal) = self.signals.try_recv() {
            debug!(at, kind = ?signal.kind(), "signal");
            self.report.signals.push(TimedSignal { at, signal });
        }
        while let Ok(message) = self.logged.try_recv() {
            self.history.handle(message.clone(), self.clock.now_epoch_ms());
            self.report.logged.push(message);
        }
    }
}

pub async fn run(script: ReplayScript) -> Result<ReplayReport, ReplayError> {
    let start = script.start_ms.unwrap_or(DEFAULT_START_MS);
    let clock = Arc::new(ManualClock::new(start));

    let mut page = MemoryPage::new(script.url.clone());
    for element in script.elements {
        page.insert(element);
    }
    page.set_catalog(script.catalog);

    let settings = script.settings.unwrap_or_default();
    let history = SessionHistory::new(settings.max_history_entries);
    let (tx, logged) = mpsc::unbounded_channel();
    let mut controller = ContentController::new(
        page,
        settings,
        clock.clone(),
        Box::new(tx),
        Box::new(TraceAudio),
    );
    let signals = controller.subscribe_signals();
    controller.init();
    let shared = SharedController::new(controller);

    let mut rec = Recorder {
        start,
        clock: clock.clone(),
        signals,
        logged,
        history,
        report: ReplayReport {
            site: shared.current_site_config().map(|s| s.id),
            ..Default::default()
        },
    };
    info!(url = %script.url, site = ?rec.report.site, steps = script.steps.len(), "replay started");

    let mut last_at = 0;
    for (index, step) in script.steps.into_iter().enumerate() {
        if step.at < last_at {
            return Err(ReplayError::OutOfOrder { index, at: step.at });
        }
        clock.set(start + step.at);
        shared.lock().tick();
        rec.drain();
        last_at = step.at;

        match step.action {
            ReplayAction::Type { target, value } => {
                let mut c = shared.lock();
                c.page_mut().set_value(target, &value);
                c.handle_event(PageEvent::Dom(DomEvent {
                    target,
                    kind: DomEventKind::Input,
                }));
            }
            ReplayAction::Key { target, key } => {
                shared.lock().handle_event(PageEvent::Dom(DomEvent {
                    target,
                    kind: DomEventKind::Keydown { key },
                }));
            }
            ReplayAction::Page { event } => {
                shared.lock().handle_event(event);
            }
            ReplayAction::AddElement { element } => {
                let mut c = shared.lock();
                c.page_mut().insert(element);
                c.handle_event(PageEvent::ElementsChanged);
            }
            ReplayAction::Fetch { url, status, error } => {
                let fetch = ObservedFetch::new(CannedFetch { status, error }, shared.clone());
                let result = fetch
                    .fetch(FetchRequest::post(url, "{}"))
                    .await
                    .map(|resp| resp.status)
                    .map_err(|e| e.to_string());
                rec.report.fetch_results.push(result);
            }
            ReplayAction::Settings { settings } => shared.update_settings(settings),
            ReplayAction::Wait => {}
        }
        rec.drain();
    }

    rec.report.scan_history = shared.lock().scan_state().scan_history.clone();
    rec.report.history = rec.history.entries();
    info!(
        signals = rec.report.signals.len(),
        logged = rec.report.logged.len(),
        "replay finished"
    );
    Ok(rec.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{OverlayKind, ScanResult};
    use serde_json::json;

    fn wms_script(steps: serde_json::Value) -> ReplayScript {
        serde_json::from_value(json!({
            "url": "https://wms.example.com/pick",
            "settings": {
                "sites": [{
                    "id": "wms",
                    "urlPattern": "^https://wms\\.example\\.com/",
                    "itemIdSelector": "#product-scan",
                    "statusIdSelector": "#status-scan",
                    "apiUrlPattern": "/api/scan"
                }]
            },
            "elements": [
                {"selector": "#product-scan"},
                {"selector": "#status-scan"}
            ],
            "steps": steps
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_scripted_scan_and_successful_submit() {
        let script = wms_script(json!([
            {"at": 0, "do": "type", "target": 1, "value": "SKU123"},
            {"at": 300, "do": "type", "target": 2, "value": "OK"},
            {"at": 600, "do": "key", "target": 2, "key": "Enter"},
            {"at": 900, "do": "fetch", "url": "https://wms.example.com/api/scan/submit", "status": 200},
            {"at": 1200, "do": "wait"}
        ]));

        let report = run(script).await.unwrap();

        assert_eq!(report.site.as_deref(), Some("wms"));
        assert_eq!(report.fetch_results, vec![Ok(200)]);
        let kinds: Vec<_> = report.signals.iter().map(|s| s.signal.kind()).collect();
        assert!(kinds.contains(&OverlayKind::Presubmit));
        assert_eq!(kinds.last(), Some(&OverlayKind::Success));
        assert_eq!(report.history.last().map(|e| e.result), Some(ScanResult::Success));
        assert_eq!(report.history.last().map(|e| e.timestamp), Some(DEFAULT_START_MS + 900));
    }

    #[tokio::test]
    async fn test_network_failure_is_reported_and_passed_through() {
        let script = wms_script(json!([
            {"at": 0, "do": "type", "target": 1, "value": "SKU9"},
            {"at": 300, "do": "type", "target": 2, "value": "DAMAGED"},
            {"at": 600, "do": "fetch", "url": "https://wms.example.com/api/scan", "error": "offline"}
        ]));

        let report = run(script).await.unwrap();

        assert_eq!(report.fetch_results.len(), 1);
        assert!(report.fetch_results[0].as_ref().unwrap_err().contains("offline"));
        assert_eq!(report.signals.last().map(|s| s.signal.kind()), Some(OverlayKind::Error));
        assert_eq!(report.history.last().map(|e| e.result), Some(ScanResult::Error));
    }

    #[tokio::test]
    async fn test_unmatched_page_does_nothing() {
        let mut script = wms_script(json!([
            {"at": 0, "do": "type", "target": 1, "value": "SKU123"},
            {"at": 10, "do": "type", "target": 2, "value": "OK"}
        ]));
        script.url = "https://shop.example.com/".into();

        let report = run(script).await.unwrap();
        assert_eq!(report.site, None);
        assert!(report.signals.is_empty());
        assert!(report.logged.is_empty());
    }

    #[tokio::test]
    async fn test_steps_must_not_go_back_in_time() {
        let script = wms_script(json!([
            {"at": 100, "do": "wait"},
            {"at": 50, "do": "wait"}
        ]));
        let err = run(script).await.unwrap_err();
        assert!(matches!(err, ReplayError::OutOfOrder { index: 1, at: 50 }));
    }
}
