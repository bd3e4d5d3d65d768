//! Session-lifetime scan log kept by the background service.
use std::collections::VecDeque;

use tracing::debug;

use crate::messages::{RuntimeMessage, RuntimeResponse, ScanHistoryEntry, ScanResult};

#[derive(Debug)]
pub struct SessionHistory {
    entries: VecDeque<ScanHistoryEntry>,
    max_entries: usize,
}

impl SessionHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        self.trim();
    }

    pub fn log(&mut self, item_id: String, status_id: String, result: ScanResult, now_ms: i64) {
        self.entries.push_back(ScanHistoryEntry {
            item_id,
            status_id,
            timestamp: now_ms,
            result,
        });
        self.trim();
    }

    fn trim(&mut self) {
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> Vec<ScanHistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn handle(&mut self, message: RuntimeMessage, now_ms: i64) -> RuntimeResponse {
        match message {
            RuntimeMessage::LogScan {
                item_id,
                status_id,
                result,
            } => {
                debug!(%item_id, %status_id, %result, "scan logged");
                self.log(item_id, status_id, result, now_ms);
                RuntimeResponse::ok()
            }
            RuntimeMessage::GetScanHistory => RuntimeResponse::History {
                history: self.entries(),
            },
            RuntimeMessage::ClearScanHistory => {
                debug!(dropped = self.len(), "scan history cleared");
                self.clear();
                RuntimeResponse::ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(response: RuntimeResponse) -> Vec<ScanHistoryEntry> {
        match response {
            RuntimeResponse::History { history } => history,
            other => panic!("expected history, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_history_before_any_scan() {
        let mut history = SessionHistory::new(100);
        let response = history.handle(RuntimeMessage::GetScanHistory, 0);
        assert_eq!(response, RuntimeResponse::History { history: vec![] });
    }

    #[test]
    fn test_log_then_get_keeps_order_and_timestamps() {
        let mut history = SessionHistory::new(100);
        let ack = history.handle(RuntimeMessage::log_scan("A", "1", ScanResult::Scanned), 10);
        assert_eq!(ack, RuntimeResponse::ok());
        history.handle(RuntimeMessage::log_scan("A", "1", ScanResult::Success), 20);

        let entries = history_of(history.handle(RuntimeMessage::GetScanHistory, 30));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].result, ScanResult::Scanned);
        assert_eq!(entries[1].timestamp, 20);
    }

    #[test]
    fn test_clear_then_get_is_empty() {
        let mut history = SessionHistory::new(100);
        history.handle(RuntimeMessage::log_scan("A", "1", ScanResult::Error), 10);
        assert_eq!(
            history.handle(RuntimeMessage::ClearScanHistory, 11),
            RuntimeResponse::ok()
        );
        assert!(history_of(history.handle(RuntimeMessage::GetScanHistory, 12)).is_empty());
    }

    #[test]
    fn test_cap_drops_oldest() {
        let mut history = SessionHistory::new(2);
        for (i, item) in ["A", "B", "C"].into_iter().enumerate() {
            history.log(item.into(), "OK".into(), ScanResult::Success, i as i64);
        }
        let items: Vec<_> = history.entries().into_iter().map(|e| e.item_id).collect();
        assert_eq!(items, vec!["B", "C"]);

        history.set_max_entries(1);
        assert_eq!(history.len(), 1);
    }
}
