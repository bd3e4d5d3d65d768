//! Folds the burst of native events one user action produces (`input`, `change`, `blur`,
//! Enter) into a single scan-state update.
use super::scan::{ScanField, ScanState};

pub const DEBOUNCE_WINDOW_MS: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastProcessedInput {
    pub item_id: String,
    pub status_id: String,
    pub timestamp_ms: i64,
    pub submit_intent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Debounced,
    Updated,
    /// Submit intent with both fields filled.
    SubmitReady,
    /// Submit intent while one of the fields is still empty.
    SubmitIncomplete,
}

#[derive(Debug)]
pub struct InputDebouncer {
    window_ms: i64,
    last: Option<LastProcessedInput>,
}

impl Default for InputDebouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW_MS)
    }
}

impl InputDebouncer {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            last: None,
        }
    }

    pub fn last(&self) -> Option<&LastProcessedInput> {
        self.last.as_ref()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn handle(
        &mut self,
        state: &mut ScanState,
        field: ScanField,
        value: &str,
        submit_intent: bool,
        now_ms: i64,
    ) -> InputOutcome {
        let (item_id, status_id) = match field {
            ScanField::ItemId => (value, state.status_id.as_str()),
            ScanField::StatusId => (state.item_id.as_str(), value),
        };

        if let Some(last) = &self.last {
            let same_state = last.item_id == item_id && last.status_id == status_id;
            let within_window = now_ms - last.timestamp_ms < self.window_ms;
            // A plain edit never swallows the submit that follows it.
            let covered = !submit_intent || last.submit_intent;
            if same_state && within_window && covered {
                return InputOutcome::Debounced;
            }
        }

        self.last = Some(LastProcessedInput {
            item_id: item_id.to_string(),
            status_id: status_id.to_string(),
            timestamp_ms: now_ms,
            submit_intent,
        });
        state.commit(field, value);

        match (submit_intent, state.is_complete()) {
            (false, _) => InputOutcome::Updated,
            (true, true) => InputOutcome::SubmitReady,
            (true, false) => InputOutcome::SubmitIncomplete,
        }
    }
}
