use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanField {
    ItemId,
    StatusId,
}

/// The item/status pair being assembled for one submission on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanState {
    pub item_id: String,
    pub status_id: String,
    pub last_scan: String,
    pub scan_history: Vec<String>,
    pub overlay_active: bool,
}

impl ScanState {
    pub fn get(&self, field: ScanField) -> &str {
        match field {
            ScanField::ItemId => &self.item_id,
            ScanField::StatusId => &self.status_id,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.item_id.is_empty() && !self.status_id.is_empty()
    }

    /// Sets `field` and records the value as the latest scan.
    pub fn commit(&mut self, field: ScanField, value: &str) {
        match field {
            ScanField::ItemId => self.item_id = value.to_string(),
            ScanField::StatusId => self.status_id = value.to_string(),
        }
        self.last_scan = value.to_string();
        if !value.is_empty() && self.scan_history.last().map(String::as_str) != Some(value) {
            self.scan_history.push(value.to_string());
        }
    }

    /// Empties the current pair after a submission outcome. History is kept for the progress
    /// counter.
    pub fn clear_fields(&mut self) {
        self.item_id.clear();
        self.status_id.clear();
        self.last_scan.clear();
        self.overlay_active = false;
    }

    pub fn reset(&mut self) {
        *self = ScanState::default();
    }

    pub fn progress(&self) -> usize {
        self.scan_history.len()
    }
}
