//! Wire types shared by the page, the background service and the popup.
use serde::{Deserialize, Serialize};

use crate::config::Settings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanResult {
    Scanned,
    Success,
    Error,
    #[default]
    Unknown,
}

impl std::fmt::Display for ScanResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanResult::Scanned => "scanned",
            ScanResult::Success => "success",
            ScanResult::Error => "error",
            ScanResult::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryEntry {
    pub item_id: String,
    pub status_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub result: ScanResult,
}

/// Messages sent to the background service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum RuntimeMessage {
    LogScan {
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        status_id: String,
        #[serde(default)]
        result: ScanResult,
    },
    GetScanHistory,
    ClearScanHistory,
}

impl RuntimeMessage {
    pub fn log_scan(item_id: &str, status_id: &str, result: ScanResult) -> Self {
        RuntimeMessage::LogScan {
            item_id: item_id.to_string(),
            status_id: status_id.to_string(),
            result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuntimeResponse {
    History { history: Vec<ScanHistoryEntry> },
    Ack { ok: bool },
}

impl RuntimeResponse {
    pub fn ok() -> Self {
        RuntimeResponse::Ack { ok: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Scan,
    Presubmit,
    Success,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<usize>,
}

/// In-page broadcast that drives the overlay presenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageSignal {
    ShowScanOverlay(OverlayPayload),
    ShowPresubmitOverlay(OverlayPayload),
    ShowSuccessOverlay(OverlayPayload),
    ShowErrorOverlay(OverlayPayload),
}

impl PageSignal {
    pub fn kind(&self) -> OverlayKind {
        match self {
            PageSignal::ShowScanOverlay(_) => OverlayKind::Scan,
            PageSignal::ShowPresubmitOverlay(_) => OverlayKind::Presubmit,
            PageSignal::ShowSuccessOverlay(_) => OverlayKind::Success,
            PageSignal::ShowErrorOverlay(_) => OverlayKind::Error,
        }
    }

    pub fn payload(&self) -> &OverlayPayload {
        match self {
            PageSignal::ShowScanOverlay(p)
            | PageSignal::ShowPresubmitOverlay(p)
            | PageSignal::ShowSuccessOverlay(p)
            | PageSignal::ShowErrorOverlay(p) => p,
        }
    }
}

/// Pushed to every open surface when the settings store accepts a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingsBroadcast {
    SettingsUpdated { settings: Settings },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_scan_wire_shape() {
        let msg = RuntimeMessage::log_scan("SKU123", "OK", ScanResult::Scanned);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "LOG_SCAN", "itemId": "SKU123", "statusId": "OK", "result": "scanned"})
        );
    }

    #[test]
    fn test_log_scan_without_result_is_unknown() {
        let msg: RuntimeMessage =
            serde_json::from_value(json!({"type": "LOG_SCAN", "itemId": "A", "statusId": "B"}))
                .unwrap();
        assert_eq!(msg, RuntimeMessage::log_scan("A", "B", ScanResult::Unknown));
    }

    #[test]
    fn test_unit_messages_parse() {
        let get: RuntimeMessage =
            serde_json::from_value(json!({"type": "GET_SCAN_HISTORY"})).unwrap();
        let clear: RuntimeMessage =
            serde_json::from_value(json!({"type": "CLEAR_SCAN_HISTORY"})).unwrap();
        assert_eq!(get, RuntimeMessage::GetScanHistory);
        assert_eq!(clear, RuntimeMessage::ClearScanHistory);
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        let parsed = serde_json::from_value::<RuntimeMessage>(json!({"type": "PING"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_responses_serialize_flat() {
        assert_eq!(serde_json::to_value(RuntimeResponse::ok()).unwrap(), json!({"ok": true}));
        let empty = RuntimeResponse::History { history: vec![] };
        assert_eq!(serde_json::to_value(empty).unwrap(), json!({"history": []}));
    }

    #[test]
    fn test_page_signal_omits_missing_fields() {
        let signal = PageSignal::ShowErrorOverlay(OverlayPayload {
            error: Some("API Error".into()),
            status: Some(500),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_value(&signal).unwrap(),
            json!({"type": "SHOW_ERROR_OVERLAY", "error": "API Error", "status": 500})
        );
        assert_eq!(signal.kind(), OverlayKind::Error);
    }
}
